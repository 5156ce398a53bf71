use based_chat::ledger::DiffLineKind;
use based_chat::selection::DiffPane;
use leptos::prelude::*;

use crate::state::ChatState;

/// Version history of the selected file and the diff of the chosen version.
#[component]
pub fn DiffView(pane: DiffPane) -> impl IntoView {
    let state = expect_context::<ChatState>();

    if pane.versions.is_empty() {
        return view! {
            <div class="empty-state">{format!("{} has no version history", pane.file_name)}</div>
        }
        .into_any();
    }

    let versions = pane
        .versions
        .into_iter()
        .map(|version| {
            let id = version.version_id.clone();
            view! {
                <div
                    class="version-item"
                    class:active=version.selected
                    on:click=move |_| state.select_version(id.clone())
                >
                    <span class="version-label">{version.label}</span>
                    <span class="version-time">{version.timestamp.format("%Y-%m-%d %H:%M").to_string()}</span>
                </div>
            }
        })
        .collect::<Vec<_>>();

    let lines = pane
        .lines
        .into_iter()
        .map(|line| {
            let class = match line.kind {
                DiffLineKind::Addition => "diff-line added",
                DiffLineKind::Deletion => "diff-line removed",
                DiffLineKind::Normal => "diff-line",
            };
            view! { <div class=class>{format!("{} {}", line.kind.marker(), line.text)}</div> }
        })
        .collect::<Vec<_>>();

    view! {
        <div class="diff-view">
            <div class="diff-header">{pane.file_name}</div>
            <div class="version-list">{versions}</div>
            <pre class="diff-lines">{lines}</pre>
        </div>
    }
    .into_any()
}
