use chrono::DateTime;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{ACTION_AGENT_RESPONSE, ACTION_FILE_DELETED, ACTION_FILE_UPLOADED, ACTION_REVERT_COMPLETE};
use crate::errors::ClientError;
use crate::models::{
    parse_timestamp, BasedFile, ContextFile, FileEnvelope, FileVersion, Message, MessageKind,
    MessageRole,
};

/// Generated file content carried by `agent_response` / `revert_complete`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FilePayload {
    pub based_filename: String,
    pub based_content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Text(String),
    File(FilePayload),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentMessage {
    pub role: MessageRole,
    pub body: MessageBody,
}

impl AgentMessage {
    pub fn file_payload(&self) -> Option<&FilePayload> {
        match &self.body {
            MessageBody::File(payload) => Some(payload),
            MessageBody::Text(_) => None,
        }
    }

    /// Conversation entry for this message.
    pub fn to_message(&self) -> Message {
        match &self.body {
            MessageBody::Text(text) => Message::text(self.role, text.clone()),
            MessageBody::File(payload) => {
                Message::file(self.role, &payload.based_filename, &payload.based_content)
            }
        }
    }
}

/// Any subset of the authoritative session fields. `None` means "not sent".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub chat_name: Option<String>,
    pub conversation: Option<Vec<Message>>,
    pub models: Option<Vec<String>>,
    pub based_files: Option<Vec<BasedFile>>,
    pub context_files: Option<Vec<ContextFile>>,
}

impl SessionSnapshot {
    pub fn is_empty(&self) -> bool {
        self.chat_name.is_none()
            && self.conversation.is_none()
            && self.models.is_none()
            && self.based_files.is_none()
            && self.context_files.is_none()
    }
}

/// Closed set of inbound event kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    BareText(String),
    AgentResponse { message: AgentMessage, chat_name: Option<String> },
    RevertComplete { message: AgentMessage },
    FileDeleted { file_id: String },
    FileUploaded { file_id: String, filename: String, path: Option<String> },
    Snapshot(SessionSnapshot),
}

impl InboundEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::BareText(_) => "bare_text",
            InboundEvent::AgentResponse { .. } => ACTION_AGENT_RESPONSE,
            InboundEvent::RevertComplete { .. } => ACTION_REVERT_COMPLETE,
            InboundEvent::FileDeleted { .. } => ACTION_FILE_DELETED,
            InboundEvent::FileUploaded { .. } => ACTION_FILE_UPLOADED,
            InboundEvent::Snapshot(_) => "snapshot",
        }
    }

    /// Generated file content delivered by this event, if any.
    pub fn file_payload(&self) -> Option<&FilePayload> {
        match self {
            InboundEvent::AgentResponse { message, .. } | InboundEvent::RevertComplete { message } => {
                message.file_payload()
            }
            _ => None,
        }
    }
}

/// Classifies one raw frame. Never fails: anything that cannot be decoded
/// as a known shape degrades to a bare assistant text event.
pub fn decode_frame(frame: &str) -> InboundEvent {
    let map = match serde_json::from_str::<Value>(frame) {
        Ok(Value::Object(map)) => map,
        Ok(_) => return InboundEvent::BareText(frame.to_string()),
        Err(e) => {
            if frame.trim_start().starts_with('{') {
                warn!("Malformed structured frame, showing as text: {e}");
            }
            return InboundEvent::BareText(frame.to_string());
        }
    };

    match classify(map) {
        Ok(event) => {
            debug!(kind = event.kind(), "Decoded inbound frame");
            event
        }
        Err(e) => {
            warn!("{e}; showing frame as text");
            InboundEvent::BareText(frame.to_string())
        }
    }
}

fn classify(mut map: Map<String, Value>) -> Result<InboundEvent, ClientError> {
    let action = map.get("action").and_then(Value::as_str).map(str::to_owned);

    match action.as_deref() {
        Some(ACTION_AGENT_RESPONSE) => {
            let message = agent_message(ACTION_AGENT_RESPONSE, map.remove("message"))?;
            let chat_name = map.get("chat_name").and_then(Value::as_str).map(str::to_owned);
            Ok(InboundEvent::AgentResponse { message, chat_name })
        }
        Some(ACTION_REVERT_COMPLETE) => {
            let message = agent_message(ACTION_REVERT_COMPLETE, map.remove("message"))?;
            Ok(InboundEvent::RevertComplete { message })
        }
        Some(ACTION_FILE_DELETED) => {
            let wire: WireDeleted = field(ACTION_FILE_DELETED, map.remove("message"))?;
            Ok(InboundEvent::FileDeleted { file_id: wire.deleted_file_id })
        }
        Some(ACTION_FILE_UPLOADED) => {
            let wire: WireUploaded = field(ACTION_FILE_UPLOADED, map.remove("message"))?;
            Ok(InboundEvent::FileUploaded {
                file_id: wire.content.file_id,
                filename: wire.content.filename,
                path: wire.content.path,
            })
        }
        other => {
            if let Some(action) = other {
                debug!(action, "Unrecognised action, reading frame as snapshot");
            }
            let wire: WireSnapshot = serde_json::from_value(Value::Object(map))
                .map_err(|e| ClientError::decode("snapshot", e))?;
            Ok(InboundEvent::Snapshot(wire.into_snapshot()))
        }
    }
}

fn field<T: for<'de> Deserialize<'de>>(kind: &str, value: Option<Value>) -> Result<T, ClientError> {
    let value = value.ok_or_else(|| ClientError::decode(kind, "missing 'message'"))?;
    serde_json::from_value(value).map_err(|e| ClientError::decode(kind, e))
}

fn agent_message(kind: &str, value: Option<Value>) -> Result<AgentMessage, ClientError> {
    let wire: WireAgentMessage = field(kind, value)?;
    let body = match wire.kind {
        MessageKind::Text => MessageBody::Text(value_to_text(wire.content)),
        MessageKind::File => MessageBody::File(file_payload(kind, wire.content)?),
    };
    Ok(AgentMessage { role: wire.role, body })
}

/// File content may arrive inline or as a JSON-encoded string.
fn file_payload(kind: &str, content: Value) -> Result<FilePayload, ClientError> {
    match content {
        Value::String(encoded) => {
            serde_json::from_str(&encoded).map_err(|e| ClientError::decode(kind, e))
        }
        other => serde_json::from_value(other).map_err(|e| ClientError::decode(kind, e)),
    }
}

fn value_to_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// `latest_content` is either plain text or a `{"text": ...}` envelope.
fn unwrap_text_envelope(value: Value) -> String {
    match value {
        Value::String(raw) => match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(obj)) => match obj.get("text") {
                Some(Value::String(text)) => text.clone(),
                _ => raw,
            },
            _ => raw,
        },
        Value::Object(obj) => match obj.get("text") {
            Some(Value::String(text)) => text.clone(),
            _ => Value::Object(obj).to_string(),
        },
        other => value_to_text(other),
    }
}

fn flexible_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(id) => Ok(id),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("invalid id {other}"))),
    }
}

fn flexible_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(id)) => Ok(Some(id)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!("invalid id {other}"))),
    }
}

// ── Wire shapes ──────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct WireAgentMessage {
    role: MessageRole,
    #[serde(rename = "type", default)]
    kind: MessageKind,
    #[serde(default)]
    content: Value,
}

#[derive(Deserialize)]
struct WireDeleted {
    #[serde(deserialize_with = "flexible_id")]
    deleted_file_id: String,
}

#[derive(Deserialize)]
struct WireUploaded {
    content: WireUploadedContent,
}

#[derive(Deserialize)]
struct WireUploadedContent {
    #[serde(deserialize_with = "flexible_id")]
    file_id: String,
    filename: String,
    #[serde(default)]
    path: Option<String>,
}

#[derive(Deserialize)]
struct WireSnapshot {
    #[serde(default)]
    chat_name: Option<String>,
    #[serde(default)]
    conversation: Option<Vec<WireAgentMessage>>,
    #[serde(default)]
    models: Option<Vec<String>>,
    #[serde(default)]
    chat_files_based: Option<Vec<WireBasedFile>>,
    #[serde(default)]
    chat_files_text: Option<Vec<WireContextFile>>,
}

#[derive(Deserialize)]
struct WireBasedFile {
    #[serde(default, alias = "id", deserialize_with = "flexible_opt_id")]
    file_id: Option<String>,
    name: String,
    #[serde(default)]
    latest_content: Value,
    #[serde(default)]
    versions: Vec<WireVersion>,
}

#[derive(Deserialize)]
struct WireVersion {
    #[serde(deserialize_with = "flexible_id")]
    version_id: String,
    timestamp: String,
    #[serde(default)]
    diff: String,
}

#[derive(Deserialize)]
struct WireContextFile {
    #[serde(alias = "id", deserialize_with = "flexible_id")]
    file_id: String,
    #[serde(alias = "filename")]
    name: String,
    #[serde(default)]
    path: Option<String>,
}

impl WireSnapshot {
    fn into_snapshot(self) -> SessionSnapshot {
        let conversation = self
            .conversation
            .map(|entries| entries.into_iter().map(conversation_entry).collect());

        let based_files = self.chat_files_based.map(|files| files.into_iter().map(based_file).collect());

        let context_files = self.chat_files_text.map(|files| {
            files
                .into_iter()
                .map(|f| ContextFile { id: f.file_id, name: f.name, path: f.path })
                .collect()
        });

        SessionSnapshot {
            chat_name: self.chat_name,
            conversation,
            models: self.models,
            based_files,
            context_files,
        }
    }
}

/// Normalises history entries so `file` messages always hold a
/// `{filename, content}` envelope.
fn conversation_entry(entry: WireAgentMessage) -> Message {
    match entry.kind {
        MessageKind::Text => Message::text(entry.role, value_to_text(entry.content)),
        MessageKind::File => {
            if let Ok(payload) = file_payload("conversation", entry.content.clone()) {
                return Message::file(entry.role, &payload.based_filename, &payload.based_content);
            }
            let raw = value_to_text(entry.content);
            match serde_json::from_str::<FileEnvelope>(&raw) {
                Ok(envelope) => Message::file(entry.role, &envelope.filename, &envelope.content),
                Err(_) => Message::text(entry.role, raw),
            }
        }
    }
}

/// A version with an unreadable timestamp is kept, dated at the epoch.
fn based_file(wire: WireBasedFile) -> BasedFile {
    let versions = wire
        .versions
        .into_iter()
        .map(|v| {
            let timestamp = parse_timestamp(&v.timestamp).unwrap_or_else(|| {
                warn!(file = %wire.name, version = %v.version_id, "Invalid version timestamp '{}'", v.timestamp);
                DateTime::UNIX_EPOCH
            });
            FileVersion { version_id: v.version_id, timestamp, diff: v.diff }
        })
        .collect();

    BasedFile {
        id: wire.file_id.unwrap_or_else(|| wire.name.clone()),
        name: wire.name,
        latest_content: unwrap_text_envelope(wire.latest_content),
        versions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_string_is_bare_text() {
        assert_eq!(decode_frame("hello"), InboundEvent::BareText("hello".to_string()));
    }

    #[test]
    fn malformed_object_degrades_to_text() {
        let frame = r#"{"action": "agent_response", "message": "#;
        assert_eq!(decode_frame(frame), InboundEvent::BareText(frame.to_string()));
    }

    #[test]
    fn non_object_json_is_text() {
        assert_eq!(decode_frame("42"), InboundEvent::BareText("42".to_string()));
    }

    #[test]
    fn agent_response_with_encoded_file_content() {
        let frame = r#"{"action":"agent_response","message":{"role":"assistant","type":"file","content":"{\"based_filename\":\"a.py\",\"based_content\":\"y\"}"},"chat_name":"Refactor"}"#;
        match decode_frame(frame) {
            InboundEvent::AgentResponse { message, chat_name } => {
                assert_eq!(chat_name.as_deref(), Some("Refactor"));
                let payload = message.file_payload().unwrap();
                assert_eq!(payload.based_filename, "a.py");
                assert_eq!(payload.based_content, "y");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn agent_response_with_inline_file_object() {
        let frame = r#"{"action":"revert_complete","message":{"role":"assistant","type":"file","content":{"based_filename":"b.rs","based_content":"fn main() {}"}}}"#;
        let event = decode_frame(frame);
        assert_eq!(event.kind(), ACTION_REVERT_COMPLETE);
        assert_eq!(event.file_payload().unwrap().based_filename, "b.rs");
    }

    #[test]
    fn agent_response_missing_message_degrades_to_text() {
        let frame = r#"{"action":"agent_response"}"#;
        assert_eq!(decode_frame(frame), InboundEvent::BareText(frame.to_string()));
    }

    #[test]
    fn file_deleted_and_uploaded() {
        assert_eq!(
            decode_frame(r#"{"action":"file_deleted","message":{"deleted_file_id":17}}"#),
            InboundEvent::FileDeleted { file_id: "17".to_string() }
        );
        assert_eq!(
            decode_frame(
                r#"{"action":"file_uploaded","message":{"content":{"file_id":"f1","filename":"notes.txt","path":"/u/notes.txt","content":"ignored"}}}"#
            ),
            InboundEvent::FileUploaded {
                file_id: "f1".to_string(),
                filename: "notes.txt".to_string(),
                path: Some("/u/notes.txt".to_string()),
            }
        );
    }

    #[test]
    fn snapshot_with_subset_of_fields() {
        let frame = r#"{"chat_files_based":[{"name":"a.py","latest_content":"x"}],"unrelated":true}"#;
        let InboundEvent::Snapshot(snapshot) = decode_frame(frame) else {
            panic!("expected snapshot");
        };
        let files = snapshot.based_files.unwrap();
        assert_eq!(files[0].id, "a.py");
        assert_eq!(files[0].latest_content, "x");
        assert!(snapshot.conversation.is_none());
        assert!(snapshot.models.is_none());
    }

    #[test]
    fn snapshot_unwraps_text_envelope_and_versions() {
        let frame = r#"{"chat_files_based":[{"file_id":"f9","name":"m.py","latest_content":"{\"text\":\"print(2)\"}",
            "versions":[{"version_id":1,"timestamp":"2025-03-20T11:00:00","diff":"+print(2)"}]}],
            "chat_files_text":[{"file_id":"c1","name":"brief.pdf"}],
            "conversation":[{"role":"user","type":"text","content":"go"}],
            "models":["m-large"]}"#;
        let InboundEvent::Snapshot(snapshot) = decode_frame(frame) else {
            panic!("expected snapshot");
        };
        let file = &snapshot.based_files.unwrap()[0];
        assert_eq!(file.id, "f9");
        assert_eq!(file.latest_content, "print(2)");
        assert_eq!(file.versions[0].version_id, "1");
        assert_eq!(snapshot.context_files.unwrap()[0].name, "brief.pdf");
        assert_eq!(snapshot.conversation.unwrap()[0].content, "go");
        assert_eq!(snapshot.models.unwrap(), vec!["m-large".to_string()]);
    }

    #[test]
    fn unknown_action_reads_as_snapshot() {
        let InboundEvent::Snapshot(snapshot) = decode_frame(r#"{"action":"typing","chat_name":"T"}"#) else {
            panic!("expected snapshot");
        };
        assert_eq!(snapshot.chat_name.as_deref(), Some("T"));
        assert!(decode_frame("{}") == InboundEvent::Snapshot(SessionSnapshot::default()));
    }

    #[test]
    fn conversation_file_entries_are_normalised() {
        let frame = r#"{"conversation":[{"role":"assistant","type":"file","content":"{\"based_filename\":\"a.py\",\"based_content\":\"x\"}"}]}"#;
        let InboundEvent::Snapshot(snapshot) = decode_frame(frame) else {
            panic!("expected snapshot");
        };
        let entry = &snapshot.conversation.unwrap()[0];
        assert_eq!(entry.file_envelope().unwrap().filename, "a.py");
    }

    #[test]
    fn bad_version_timestamp_keeps_rest_of_snapshot() {
        let frame = r#"{"models":["m1"],"conversation":[{"role":"user","type":"text","content":"go"}],
            "chat_files_based":[{"file_id":"f1","name":"a.py","latest_content":"x",
                "versions":[{"version_id":"v1","timestamp":"2025-03-20 11:00:00.123456","diff":"+x"},
                            {"version_id":"v2","timestamp":"last tuesday","diff":"+y"}]}]}"#;
        let InboundEvent::Snapshot(snapshot) = decode_frame(frame) else {
            panic!("expected snapshot");
        };
        assert_eq!(snapshot.models.unwrap(), vec!["m1".to_string()]);
        assert_eq!(snapshot.conversation.unwrap().len(), 1);
        let file = &snapshot.based_files.unwrap()[0];
        assert_eq!(file.versions.len(), 2);
        assert_eq!(file.versions[0].timestamp, parse_timestamp("2025-03-20T11:00:00.123456Z").unwrap());
        assert_eq!(file.versions[1].timestamp, DateTime::UNIX_EPOCH);
        assert_eq!(file.versions[1].diff, "+y");
    }
}
