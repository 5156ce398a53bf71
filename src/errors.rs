use thiserror::Error;

/// Client-side error taxonomy for a chat session.
/// None of these is fatal to the session: callers log and degrade.
#[derive(Debug, Error)]
pub enum ClientError {
    // ── Transport errors ─────────────────────────────────────────────────────
    #[error("Transport to '{endpoint}' is not connected")]
    NotConnected { endpoint: String },

    #[error("Chat endpoint '{endpoint}' unreachable after {attempts} polls")]
    Unreachable { endpoint: String, attempts: u32 },

    #[error("Failed to open connection to '{endpoint}': {message}")]
    ConnectFailed { endpoint: String, message: String },

    #[cfg(feature = "native")]
    #[error("WebSocket error: {0}")]
    Socket(#[source] tokio_tungstenite::tungstenite::Error),

    // ── Codec errors ─────────────────────────────────────────────────────────
    #[error("Failed to decode '{kind}' frame: {message}")]
    DecodeFailure { kind: String, message: String },

    #[error("Failed to encode command: {0}")]
    Encode(#[source] serde_json::Error),

    // ── File command errors ──────────────────────────────────────────────────
    #[error("Upload of '{filename}' failed: {message}")]
    UploadFailure { filename: String, message: String },

    #[error("Delete of file '{file_id}' failed: {message}")]
    DeleteFailure { file_id: String, message: String },

    // ── Validation errors ────────────────────────────────────────────────────
    #[error("Prompt cannot be empty")]
    EmptyPrompt,

    #[error("No based file named '{name}' in this chat")]
    UnknownFile { name: String },

    #[error("Version '{version_id}' does not belong to '{file_name}'")]
    UnknownVersion { file_name: String, version_id: String },

    #[error("Model '{model}' is not offered for this chat")]
    UnknownModel { model: String },

    // ── Login / local snapshot errors ────────────────────────────────────────
    #[cfg(feature = "native")]
    #[error("HTTP request failed: {0}")]
    Http(#[source] reqwest::Error),

    #[error("Login rejected with status {status}")]
    LoginRejected { status: u16 },

    #[error("Login snapshot cache error at {path}: {message}")]
    Cache { path: String, message: String },
}

impl ClientError {
    pub fn decode(kind: impl Into<String>, message: impl ToString) -> Self {
        ClientError::DecodeFailure { kind: kind.into(), message: message.to_string() }
    }

    pub fn cache(path: impl Into<String>, message: impl ToString) -> Self {
        ClientError::Cache { path: path.into(), message: message.to_string() }
    }

    pub fn is_transport(&self) -> bool {
        match self {
            ClientError::NotConnected { .. }
            | ClientError::Unreachable { .. }
            | ClientError::ConnectFailed { .. } => true,
            #[cfg(feature = "native")]
            ClientError::Socket(_) => true,
            _ => false,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ClientError::EmptyPrompt
                | ClientError::UnknownFile { .. }
                | ClientError::UnknownVersion { .. }
                | ClientError::UnknownModel { .. }
        )
    }
}
