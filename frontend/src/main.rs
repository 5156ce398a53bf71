mod api;
mod components;
mod state;
mod ws;

use leptos::mount::mount_to_body;
use leptos::prelude::*;

use components::chat::ChatArea;
use components::login::LoginForm;
use components::sidebar::Sidebar;
use state::ChatState;

/// Root application component.
#[component]
fn App() -> impl IntoView {
    let state = ChatState::provide();

    // Open the chat once a login is available
    Effect::new(move |_| {
        if state.login.with(|login| login.is_some()) && !state.has_chat() {
            state.open_initial_chat();
        }
    });

    view! {
        <Show
            when=move || state.login.with(|login| login.is_some())
            fallback=|| view! { <LoginForm /> }
        >
            <div class="app-container">
                <Sidebar />
                <ChatArea />
            </div>
        </Show>
    }
}

fn main() {
    console_log::init_with_level(log::Level::Debug).expect("Failed to init logger");
    mount_to_body(App);
}
