use leptos::prelude::*;

use crate::state::ChatState;

/// Email-only login shown until a login snapshot exists.
#[component]
pub fn LoginForm() -> impl IntoView {
    let state = expect_context::<ChatState>();
    let (email, set_email) = signal(String::new());

    let submit = move || {
        let value = email.get().trim().to_string();
        if !value.is_empty() {
            state.log_in(value);
        }
    };

    view! {
        <div class="login-container">
            <h2>"Sign in"</h2>
            {move || state.error.get().map(|err| view! { <div class="error-banner">{err}</div> })}
            <input
                type="email"
                placeholder="you@example.com"
                prop:value=email
                on:input=move |ev| set_email.set(event_target_value(&ev))
                on:keydown=move |ev| {
                    if ev.key() == "Enter" {
                        submit();
                    }
                }
            />
            <button
                class="send-btn"
                on:click=move |_| submit()
                disabled=move || email.get().trim().is_empty()
            >
                "Continue"
            </button>
        </div>
    }
}
