//! Wire codec for the per-chat socket.
//!
//! Inbound frames are classified once, here, into the closed
//! [`InboundEvent`] set; everything downstream matches on the variant.
//! Outbound commands are small JSON objects tagged by `action`.

pub mod inbound;
pub mod outbound;

pub use inbound::{decode_frame, AgentMessage, FilePayload, InboundEvent, MessageBody, SessionSnapshot};
pub use outbound::{encode_command, OutboundCommand, UploadSource};

pub const ACTION_AGENT_RESPONSE: &str = "agent_response";
pub const ACTION_REVERT_COMPLETE: &str = "revert_complete";
pub const ACTION_FILE_DELETED: &str = "file_deleted";
pub const ACTION_FILE_UPLOADED: &str = "file_uploaded";
