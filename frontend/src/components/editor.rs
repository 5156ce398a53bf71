use based_chat::selection::MainPane;
use leptos::prelude::*;

use crate::state::ChatState;

/// Content of the selected based file, plus the chat/diff toggle.
#[component]
pub fn EditorPane() -> impl IntoView {
    let state = expect_context::<ChatState>();

    let showing_diff = move || state.view.with(|v| matches!(v.main, MainPane::Diff(_)));

    view! {
        <section class="editor-pane">
            {move || {
                let file_name = state.view.with(|v| v.editor.file_name.clone());
                if file_name.is_empty() {
                    view! { <div class="empty-state">"No file selected"</div> }.into_any()
                } else {
                    view! {
                        <div class="editor-header">
                            <span>{file_name}</span>
                            <button class="mode-btn" on:click=move |_| state.toggle_view()>
                                {move || if showing_diff() { "Show chat" } else { "Show diff" }}
                            </button>
                        </div>
                        <textarea
                            class="editor"
                            prop:value=move || state.view.with(|v| v.editor.content.clone())
                            on:input=move |ev| state.edit(event_target_value(&ev))
                        />
                    }
                    .into_any()
                }
            }}
        </section>
    }
}
