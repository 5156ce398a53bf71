use leptos::ev;
use leptos::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::HtmlInputElement;

use crate::state::ChatState;

/// Sidebar with the chat title, model picker and file explorer.
#[component]
pub fn Sidebar() -> impl IntoView {
    let state = expect_context::<ChatState>();

    view! {
        <aside class="sidebar">
            <div class="sidebar-header">
                <h2>{move || state.view.with(|v| v.title.clone())}</h2>
                <button class="new-chat-btn" on:click=move |_| state.log_out()>
                    "Log out"
                </button>
            </div>
            <ModelPicker />
            <FileExplorer />
        </aside>
    }
}

#[component]
fn ModelPicker() -> impl IntoView {
    let state = expect_context::<ChatState>();

    view! {
        <div class="model-picker">
            <select on:change=move |ev| state.select_model(event_target_value(&ev))>
                {move || {
                    let (models, selected) = state.view.with(|v| (v.models.clone(), v.selected_model.clone()));
                    models
                        .into_iter()
                        .map(|model| {
                            let is_selected = model == selected;
                            view! { <option value=model.clone() selected=is_selected>{model.clone()}</option> }
                        })
                        .collect::<Vec<_>>()
                }}
            </select>
            <button class="mode-btn" on:click=move |_| state.toggle_mode()>
                {move || state.view.with(|v| v.compose_mode.label())}
            </button>
        </div>
    }
}

/// Based files (selectable) and uploaded context files.
#[component]
fn FileExplorer() -> impl IntoView {
    let state = expect_context::<ChatState>();

    let on_upload = move |ev: ev::Event| {
        let Some(input) = ev.target().and_then(|t| t.dyn_into::<HtmlInputElement>().ok()) else {
            return;
        };
        if let Some(file) = input.files().and_then(|files| files.get(0)) {
            state.upload(file);
        }
        // allow picking the same file again
        input.set_value("");
    };

    view! {
        <div class="file-explorer">
            <div class="section-label">"Based files"</div>
            <For
                each=move || state.view.with(|v| v.based_files.clone())
                key=|(id, _)| id.clone()
                let:file
            >
                {
                    let (id, name) = file;
                    let name_click = name.clone();
                    let name_active = name.clone();
                    view! {
                        <div
                            class="file-item"
                            class:active=move || state.view.with(|v| v.editor.file_name == name_active)
                            on:click=move |_| state.select_file(name_click.clone())
                        >
                            <span>{name}</span>
                            <button class="delete-btn" on:click=move |ev| {
                                ev.stop_propagation();
                                state.delete(id.clone());
                            }>"×"</button>
                        </div>
                    }
                }
            </For>

            <div class="section-label">"Context files"</div>
            <For
                each=move || state.view.with(|v| v.context_files.clone())
                key=|(id, _)| id.clone()
                let:file
            >
                {
                    let (id, name) = file;
                    view! {
                        <div class="file-item context">
                            <span>{name}</span>
                            <button class="delete-btn" on:click=move |_| state.delete(id.clone())>"×"</button>
                        </div>
                    }
                }
            </For>

            <label class="upload-btn">
                "+ Upload file"
                <input type="file" style="display:none" on:change=on_upload />
            </label>
        </div>
    }
}
