use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;

use crate::errors::ClientError;

/// Commands the client sends over the chat socket, one frame each.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OutboundCommand {
    NewMessage {
        prompt: String,
        model: String,
        is_first_prompt: bool,
        is_chat_or_composer: bool,
        selected_filename: String,
        chat_files_based: Vec<String>,
        chat_files_text: Vec<String>,
    },
    UploadFile {
        filename: String,
        file_data: String,
    },
    DeleteFile {
        file_id: String,
    },
}

impl OutboundCommand {
    pub fn upload(filename: impl Into<String>, source: UploadSource) -> Self {
        OutboundCommand::UploadFile { filename: filename.into(), file_data: source.into_base64() }
    }

    pub fn delete(file_id: impl Into<String>) -> Self {
        OutboundCommand::DeleteFile { file_id: file_id.into() }
    }

    pub fn action(&self) -> &'static str {
        match self {
            OutboundCommand::NewMessage { .. } => "new_message",
            OutboundCommand::UploadFile { .. } => "upload_file",
            OutboundCommand::DeleteFile { .. } => "delete_file",
        }
    }
}

/// Raw upload payload as handed over by the picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadSource {
    Bytes(Vec<u8>),
    /// `data:<mime>[;base64],<payload>` as produced by browser readers.
    DataUrl(String),
}

impl UploadSource {
    /// Base64 body with any data-URL prefix stripped.
    pub fn into_base64(self) -> String {
        match self {
            UploadSource::Bytes(bytes) => STANDARD.encode(bytes),
            UploadSource::DataUrl(url) => match url.strip_prefix("data:").and_then(|rest| rest.split_once(',')) {
                Some((header, payload)) if header.ends_with(";base64") => payload.to_string(),
                Some((_, payload)) => STANDARD.encode(payload.as_bytes()),
                None => url,
            },
        }
    }
}

pub fn encode_command(command: &OutboundCommand) -> Result<String, ClientError> {
    serde_json::to_string(command).map_err(ClientError::Encode)
}
