use std::rc::Rc;

use tracing::{debug, error, info, warn};

use crate::codec::{decode_frame, encode_command, OutboundCommand, UploadSource};
use crate::errors::ClientError;
use crate::store::{Applied, SessionStore};
use crate::transport::{Connector, Listener, TransportConfig, TransportEvent, TransportEventKind, TransportManager};

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Recycle the socket after a frame that delivered generated file content.
    pub reconnect_after_file: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self { reconnect_after_file: true }
    }
}

/// One open chat: its socket and its reconciled state.
pub struct ChatSession<C: Connector> {
    transport: Rc<TransportManager<C>>,
    store: SessionStore,
    options: SessionOptions,
}

impl<C: Connector> ChatSession<C> {
    /// Opens the chat socket. Inbound lifecycle events go to `listener`
    /// and must be fed back through [`ChatSession::handle_event`].
    pub fn open(
        connector: C,
        config: TransportConfig,
        chat_id: &str,
        listener: Listener,
        store: SessionStore,
        options: SessionOptions,
    ) -> Result<Self, ClientError> {
        let transport = Rc::new(TransportManager::new(connector, config, chat_id, listener));
        transport.open()?;
        info!(chat_id, "Chat session opened");
        Ok(Self { transport, store, options })
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut SessionStore {
        &mut self.store
    }

    /// Shared handle for dispatching without borrowing the session.
    pub fn transport(&self) -> Rc<TransportManager<C>> {
        Rc::clone(&self.transport)
    }

    /// Applies one transport event. Frames from a superseded handle are still
    /// merged; lifecycle events from it are ignored.
    pub fn handle_event(&mut self, event: TransportEvent) -> Applied {
        match event.kind {
            TransportEventKind::Opened => {
                debug!(generation = event.generation, "Chat socket open");
                Applied::default()
            }
            TransportEventKind::Closed => {
                if self.transport.is_current(event.generation) {
                    info!(generation = event.generation, "Chat socket closed by peer");
                }
                Applied::default()
            }
            TransportEventKind::Frame(frame) => {
                let applied = self.store.apply(decode_frame(&frame));
                if applied.delivered_file
                    && self.options.reconnect_after_file
                    && self.transport.is_current(event.generation)
                {
                    if let Err(e) = self.transport.force_reconnect() {
                        error!("Forced reconnect failed: {e}");
                    }
                }
                applied
            }
        }
    }

    /// Validates the prompt, records it optimistically and returns the
    /// command to dispatch.
    pub fn prepare_message(&mut self, prompt: &str) -> Result<OutboundCommand, ClientError> {
        self.store.submit_prompt(prompt)
    }

    /// Removes the file locally before the backend confirms; never rolled back.
    pub fn prepare_delete(&mut self, file_id: &str) -> OutboundCommand {
        self.store.remove_file(file_id);
        OutboundCommand::delete(file_id)
    }

    pub async fn send_message(&mut self, prompt: &str) -> Result<(), ClientError> {
        let command = self.prepare_message(prompt)?;
        dispatch(&self.transport, &command).await
    }

    pub async fn upload_file(&mut self, filename: &str, source: UploadSource) -> Result<(), ClientError> {
        let command = OutboundCommand::upload(filename, source);
        dispatch(&self.transport, &command).await.map_err(|e| ClientError::UploadFailure {
            filename: filename.to_string(),
            message: e.to_string(),
        })
    }

    pub async fn delete_file(&mut self, file_id: &str) -> Result<(), ClientError> {
        let command = self.prepare_delete(file_id);
        dispatch(&self.transport, &command).await.map_err(|e| ClientError::DeleteFailure {
            file_id: file_id.to_string(),
            message: e.to_string(),
        })
    }

    /// Tears the socket down; queued commands are not delivered.
    pub fn close(&self) {
        self.transport.close();
    }
}

/// Waits for an open socket, then sends `command` as one frame.
pub async fn dispatch<C: Connector>(
    transport: &TransportManager<C>,
    command: &OutboundCommand,
) -> Result<(), ClientError> {
    let frame = encode_command(command)?;
    transport.ensure_open().await?;
    transport.send(&frame).inspect_err(|e| warn!(action = command.action(), "Command dropped: {e}"))?;
    debug!(action = command.action(), "Command sent");
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::models::MessageRole;
    use crate::transport::testing::{recording_listener, MockConnector};
    use crate::transport::ConnectionState;

    fn session(connector: &MockConnector) -> ChatSession<MockConnector> {
        let (listener, _) = recording_listener();
        ChatSession::open(
            connector.clone(),
            TransportConfig::new("ws://backend"),
            "chat-1",
            listener,
            SessionStore::with_models("chat-1", vec!["m1".to_string()]),
            SessionOptions::default(),
        )
        .unwrap()
    }

    fn frame(generation: u64, text: &str) -> TransportEvent {
        TransportEvent { generation, kind: TransportEventKind::Frame(text.to_string()) }
    }

    const FILE_FRAME: &str = r#"{"action":"agent_response","message":{"role":"assistant","type":"file","content":"{\"based_filename\":\"a.py\",\"based_content\":\"y\"}"}}"#;

    #[tokio::test]
    async fn send_message_waits_for_open_then_sends() {
        let connector = MockConnector::opening_after(2);
        let mut chat = session(&connector);

        chat.send_message("build it").await.unwrap();

        let sent = connector.sent();
        assert_eq!(sent.len(), 1);
        let value: Value = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(value["action"], "new_message");
        assert_eq!(value["prompt"], "build it");
        assert_eq!(value["model"], "m1");
        assert_eq!(value["is_first_prompt"], true);
        assert_eq!(chat.store().session().conversation[0].role, MessageRole::User);
    }

    #[test]
    fn file_delivery_forces_reconnect() {
        let connector = MockConnector::default();
        let mut chat = session(&connector);
        connector.open_latest();

        let applied = chat.handle_event(frame(1, FILE_FRAME));

        assert!(applied.delivered_file);
        assert_eq!(connector.opened(), 2);
        assert_eq!(connector.connection_state(0), ConnectionState::Closed);
        assert!(chat.transport().is_current(2));
        assert_eq!(chat.store().session().based_file("a.py").unwrap().latest_content, "y");
    }

    #[test]
    fn stale_generation_frames_merge_without_reconnect() {
        let connector = MockConnector::default();
        let mut chat = session(&connector);
        chat.transport().force_reconnect().unwrap();

        chat.handle_event(frame(1, FILE_FRAME));

        assert_eq!(connector.opened(), 2);
        assert_eq!(chat.store().session().based_files.len(), 1);
    }

    #[test]
    fn text_frames_do_not_reconnect() {
        let connector = MockConnector::default();
        let mut chat = session(&connector);
        chat.handle_event(frame(1, "plain words"));
        chat.handle_event(TransportEvent { generation: 1, kind: TransportEventKind::Closed });
        assert_eq!(connector.opened(), 1);
        assert_eq!(chat.store().session().conversation.len(), 1);
    }

    #[tokio::test]
    async fn delete_is_optimistic_even_when_send_fails() {
        let connector = MockConnector::default();
        let (listener, _) = recording_listener();
        let mut config = TransportConfig::new("ws://backend");
        config.max_open_polls = Some(1);
        let mut store = SessionStore::new("chat-1");
        store.apply(decode_frame(r#"{"chat_files_text":[{"file_id":"c1","name":"n.txt"}]}"#));
        let mut chat =
            ChatSession::open(connector.clone(), config, "chat-1", listener, store, SessionOptions::default())
                .unwrap();

        let err = chat.delete_file("c1").await.unwrap_err();

        assert!(matches!(err, ClientError::DeleteFailure { .. }));
        assert!(chat.store().session().context_files.is_empty());
        assert!(connector.sent().is_empty());
    }

    #[tokio::test]
    async fn upload_sends_base64_payload() {
        let connector = MockConnector::opening_after(1);
        let mut chat = session(&connector);

        chat.upload_file("notes.txt", UploadSource::Bytes(b"hello".to_vec())).await.unwrap();

        let value: Value = serde_json::from_str(&connector.sent()[0]).unwrap();
        assert_eq!(value["action"], "upload_file");
        assert_eq!(value["file_data"], "aGVsbG8=");
    }

    #[test]
    fn close_tears_down_socket() {
        let connector = MockConnector::default();
        let chat = session(&connector);
        chat.close();
        assert_eq!(chat.transport().state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn events_apply_while_a_send_waits_for_the_socket() {
        let connector = MockConnector::default();
        let mut chat = session(&connector);
        let command = chat.prepare_message("build it").unwrap();
        let transport = chat.transport();
        let mut pending = Box::pin(dispatch(&transport, &command));

        assert!(futures_util::poll!(pending.as_mut()).is_pending());
        chat.handle_event(frame(1, "thinking"));
        assert!(futures_util::poll!(pending.as_mut()).is_pending());
        assert_eq!(chat.store().session().conversation.len(), 2);
        assert!(connector.sent().is_empty());

        connector.open_latest();
        pending.await.unwrap();
        assert_eq!(connector.sent().len(), 1);
    }

    #[tokio::test]
    async fn dispatch_after_close_is_refused() {
        let connector = MockConnector::opening_after(1);
        let chat = session(&connector);
        let transport = chat.transport();
        chat.close();

        let err = dispatch(&transport, &OutboundCommand::delete("f1")).await.unwrap_err();

        assert!(err.is_transport());
        assert_eq!(connector.opened(), 1);
        assert!(connector.sent().is_empty());
        assert_eq!(transport.state(), ConnectionState::Closed);
    }
}
