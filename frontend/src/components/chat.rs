use based_chat::models::{Message, MessageKind, MessageRole};
use based_chat::selection::MainPane;
use leptos::ev;
use leptos::prelude::*;

use crate::components::diff::DiffView;
use crate::components::editor::EditorPane;
use crate::state::ChatState;

/// Main area: conversation or diff, the editor and the composer.
#[component]
pub fn ChatArea() -> impl IntoView {
    let state = expect_context::<ChatState>();

    // Memos so the conversation list is only rebuilt when the pane kind flips
    let diff_pane = Memo::new(move |_| {
        state.view.with(|v| match &v.main {
            MainPane::Diff(pane) => Some(pane.clone()),
            MainPane::Conversation(_) => None,
        })
    });
    let is_empty = Memo::new(move |_| {
        state.view.with(|v| matches!(&v.main, MainPane::Conversation(messages) if messages.is_empty()))
    });

    view! {
        <main class="chat-area">
            // Error banner
            {move || {
                state.error.get().map(|err| {
                    view! {
                        <div class="error-banner">{err}</div>
                    }
                })
            }}

            <div class="chat-header">
                {move || state.view.with(|v| format!("{} · {}", v.title, v.compose_mode.label()))}
            </div>

            <div class="messages-container">
                {move || {
                    match diff_pane.get() {
                        Some(pane) => view! { <DiffView pane=pane /> }.into_any(),
                        None if is_empty.get() => view! {
                            <div class="empty-state">
                                "Describe what to build to start the chat"
                            </div>
                        }.into_any(),
                        None => view! { <Conversation /> }.into_any(),
                    }
                }}
            </div>

            <EditorPane />
            <ChatInput />
        </main>
    }
}

#[component]
fn Conversation() -> impl IntoView {
    let state = expect_context::<ChatState>();

    let entries = move || {
        state.view.with(|v| match &v.main {
            MainPane::Conversation(messages) => messages.iter().cloned().enumerate().collect::<Vec<_>>(),
            MainPane::Diff(_) => Vec::new(),
        })
    };

    view! {
        <For
            each=entries
            key=|(index, message)| (*index, message.display_text())
            let:entry
        >
            <MessageBubble message=entry.1 />
        </For>
    }
}

/// A single chat message bubble.
#[component]
fn MessageBubble(message: Message) -> impl IntoView {
    let css_class = match message.role {
        MessageRole::User => "message user",
        MessageRole::Assistant => "message assistant",
    };
    let label = match message.kind {
        MessageKind::File => "file",
        MessageKind::Text => message.role.as_str(),
    };

    view! {
        <div class=css_class>
            <div class="role-label">{label}</div>
            <div>{message.display_text()}</div>
        </div>
    }
}

/// Composer with textarea and send button.
#[component]
fn ChatInput() -> impl IntoView {
    let state = expect_context::<ChatState>();
    let (input, set_input) = signal(String::new());

    let is_sending = move || state.is_sending.get();

    let send = move || {
        let text = input.get().trim().to_string();
        if text.is_empty() || is_sending() {
            return;
        }
        set_input.set(String::new());
        state.send_message(text);
    };

    let on_keydown = move |ev: ev::KeyboardEvent| {
        if ev.key() == "Enter" && !ev.shift_key() {
            ev.prevent_default();
            send();
        }
    };

    view! {
        <div class="input-area">
            <div class="input-row">
                <textarea
                    rows="1"
                    placeholder="Describe a change… (Enter to send, Shift+Enter for newline)"
                    prop:value=input
                    on:input=move |ev| {
                        set_input.set(event_target_value(&ev));
                    }
                    on:keydown=on_keydown
                    disabled=is_sending
                />
                <button
                    class="send-btn"
                    on:click=move |_| send()
                    disabled=move || is_sending() || input.get().trim().is_empty()
                >
                    {move || if is_sending() { "Sending…" } else { "Send" }}
                </button>
            </div>
        </div>
    }
}
