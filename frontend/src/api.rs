use based_chat::models::{LoginRequest, LoginResponse};
use gloo_net::http::Request;

/// Base URL of the backend API server.
pub const API_BASE: &str = "http://localhost:8000";

/// Base URL of the chat socket endpoint; `/ws/{chat_id}` is appended.
pub const WS_BASE: &str = "ws://localhost:8000";

/// localStorage key of the cached login response.
const SNAPSHOT_KEY: &str = "auth_snapshot";

/// Logs in with the user's email.
pub async fn login(email: &str) -> Result<LoginResponse, String> {
    let body = LoginRequest { email: email.to_string() };

    let resp = Request::post(&format!("{API_BASE}/auth/login"))
        .json(&body)
        .map_err(|e| format!("Serialize error: {e}"))?
        .send()
        .await
        .map_err(|e| format!("Network error: {e}"))?;

    if !resp.ok() {
        return Err(format!("Login rejected: {}", resp.status()));
    }

    resp.json::<LoginResponse>()
        .await
        .map_err(|e| format!("Parse error: {e}"))
}

fn storage() -> Option<web_sys::Storage> {
    web_sys::window()?.local_storage().ok().flatten()
}

/// The cached login, if any. A corrupt entry is removed.
pub fn cached_login() -> Option<LoginResponse> {
    let storage = storage()?;
    let raw = storage.get_item(SNAPSHOT_KEY).ok()??;
    match serde_json::from_str(&raw) {
        Ok(login) => Some(login),
        Err(e) => {
            log::warn!("Discarding unreadable login snapshot: {e}");
            let _ = storage.remove_item(SNAPSHOT_KEY);
            None
        }
    }
}

pub fn store_login(login: &LoginResponse) {
    let Some(storage) = storage() else { return };
    match serde_json::to_string(login) {
        Ok(raw) => {
            if storage.set_item(SNAPSHOT_KEY, &raw).is_err() {
                log::warn!("Could not persist login snapshot");
            }
        }
        Err(e) => log::warn!("Could not serialize login snapshot: {e}"),
    }
}

pub fn clear_login() {
    if let Some(storage) = storage() {
        let _ = storage.remove_item(SNAPSHOT_KEY);
    }
}

/// Chat id from a `/chat/{id}` page path.
pub fn chat_id_from_location() -> Option<String> {
    let path = web_sys::window()?.location().pathname().ok()?;
    let id = path.strip_prefix("/chat/")?.trim_end_matches('/');
    (!id.is_empty()).then(|| id.to_string())
}
