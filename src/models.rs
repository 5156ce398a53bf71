use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    File,
}

/// Envelope stored as the content of a `file` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEnvelope {
    pub filename: String,
    pub content: String,
}

/// One conversation entry. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    pub content: String,
}

impl Message {
    pub fn text(role: MessageRole, content: impl Into<String>) -> Self {
        Self { role, kind: MessageKind::Text, content: content.into() }
    }

    pub fn file(role: MessageRole, filename: &str, content: &str) -> Self {
        let envelope = FileEnvelope { filename: filename.to_string(), content: content.to_string() };
        // Two plain strings always serialize.
        let content = serde_json::to_string(&envelope).unwrap_or_default();
        Self { role, kind: MessageKind::File, content }
    }

    /// Parsed envelope for `file` messages; `None` for text or malformed content.
    pub fn file_envelope(&self) -> Option<FileEnvelope> {
        match self.kind {
            MessageKind::File => serde_json::from_str(&self.content).ok(),
            MessageKind::Text => None,
        }
    }

    /// Text shown in the conversation pane.
    pub fn display_text(&self) -> String {
        match self.file_envelope() {
            Some(envelope) => format!("[file] {}", envelope.filename),
            None => self.content.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileVersion {
    pub version_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub diff: String,
}

/// A generated, version-tracked file. `name` is the merge key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasedFile {
    pub id: String,
    pub name: String,
    pub latest_content: String,
    #[serde(default)]
    pub versions: Vec<FileVersion>,
}

/// An uploaded reference document. Content is never held client-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextFile {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Whether a prompt targets plain chat or the file composer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComposeMode {
    Chat,
    #[default]
    Composer,
}

impl ComposeMode {
    pub fn toggled(self) -> Self {
        match self {
            ComposeMode::Chat => ComposeMode::Composer,
            ComposeMode::Composer => ComposeMode::Chat,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ComposeMode::Chat => "CHAT",
            ComposeMode::Composer => "COMPOSER",
        }
    }
}

/// Root aggregate for one open chat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub chat_id: String,
    pub chat_title: String,
    pub conversation: Vec<Message>,
    pub based_files: Vec<BasedFile>,
    pub context_files: Vec<ContextFile>,
    pub available_models: Vec<String>,
    pub selected_model: String,
    pub compose_mode: ComposeMode,
}

impl Session {
    pub fn new(chat_id: impl Into<String>) -> Self {
        Self { chat_id: chat_id.into(), ..Self::default() }
    }

    pub fn based_file(&self, name: &str) -> Option<&BasedFile> {
        self.based_files.iter().find(|f| f.name == name)
    }

    pub fn based_file_mut(&mut self, name: &str) -> Option<&mut BasedFile> {
        self.based_files.iter_mut().find(|f| f.name == name)
    }
}

// ── Login / workspace payloads ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceFile {
    pub id: String,
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub last_updated: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub files: Vec<WorkspaceFile>,
    #[serde(default)]
    pub chats: Vec<ChatSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
}

/// Response of `POST /auth/login`; also the persisted login snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: String,
    pub email: String,
    #[serde(default)]
    pub workspaces: Vec<Workspace>,
    #[serde(default)]
    pub models: Vec<String>,
}

impl LoginResponse {
    /// Finds the workspace that owns `chat_id`.
    pub fn workspace_of(&self, chat_id: &str) -> Option<&Workspace> {
        self.workspaces.iter().find(|w| w.chats.iter().any(|c| c.id == chat_id))
    }
}

/// Accepts RFC 3339 as well as naive timestamps (read as UTC), with either
/// a `T` or a space between date and time.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}
