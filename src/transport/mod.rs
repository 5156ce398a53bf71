//! Ownership of the single streaming connection of a chat.
//!
//! Callers only see `send`, `ensure_open`, `force_reconnect` and `close`;
//! the raw handle never leaves the manager. Handles are replaced, never
//! reused: every `open` bumps the generation carried by its events.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::errors::ClientError;

#[cfg(feature = "native")]
pub mod tungstenite;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    Opened,
    Frame(String),
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    pub generation: u64,
    pub kind: TransportEventKind,
}

pub type Listener = Arc<dyn Fn(TransportEvent) + Send + Sync>;

/// Lifecycle callback handed to one connection, stamped with its generation.
#[derive(Clone)]
pub struct EventSink {
    generation: u64,
    listener: Listener,
}

impl EventSink {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn emit(&self, kind: TransportEventKind) {
        (self.listener)(TransportEvent { generation: self.generation, kind });
    }
}

/// One live handle. Mirrors a browser `WebSocket`: created in `Connecting`,
/// reports lifecycle through its [`EventSink`].
pub trait Connection {
    fn state(&self) -> ConnectionState;
    fn send_text(&self, frame: &str) -> Result<(), ClientError>;
    fn close(&self);
}

/// Platform glue: how to open a handle and how to wait between polls.
pub trait Connector {
    type Connection: Connection;

    fn connect(&self, endpoint: &str, sink: EventSink) -> Result<Self::Connection, ClientError>;

    fn pause(&self, period: Duration) -> impl Future<Output = ()>;
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub ws_base: String,
    pub poll_interval: Duration,
    /// `None` polls until the socket opens.
    pub max_open_polls: Option<u32>,
}

impl TransportConfig {
    pub fn new(ws_base: impl Into<String>) -> Self {
        Self { ws_base: ws_base.into(), poll_interval: DEFAULT_POLL_INTERVAL, max_open_polls: None }
    }

    pub fn endpoint(&self, chat_id: &str) -> String {
        format!("{}/ws/{}", self.ws_base.trim_end_matches('/'), chat_id)
    }
}

struct Handle<T> {
    generation: u64,
    connection: T,
}

pub struct TransportManager<C: Connector> {
    connector: C,
    config: TransportConfig,
    chat_id: String,
    listener: Listener,
    active: RefCell<Option<Handle<C::Connection>>>,
    generation: Cell<u64>,
    /// Set by `close`; no handle is opened afterwards.
    closed: Cell<bool>,
}

impl<C: Connector> TransportManager<C> {
    pub fn new(connector: C, config: TransportConfig, chat_id: impl Into<String>, listener: Listener) -> Self {
        Self {
            connector,
            config,
            chat_id: chat_id.into(),
            listener,
            active: RefCell::new(None),
            generation: Cell::new(0),
            closed: Cell::new(false),
        }
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn endpoint(&self) -> String {
        self.config.endpoint(&self.chat_id)
    }

    pub fn state(&self) -> ConnectionState {
        self.active
            .borrow()
            .as_ref()
            .map(|h| h.connection.state())
            .unwrap_or(ConnectionState::Closed)
    }

    /// Whether `generation` belongs to the live handle.
    pub fn is_current(&self, generation: u64) -> bool {
        self.active.borrow().as_ref().is_some_and(|h| h.generation == generation)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    fn ensure_not_closed(&self) -> Result<(), ClientError> {
        if self.closed.get() {
            debug!(chat_id = %self.chat_id, "Transport closed, not reopening");
            return Err(ClientError::NotConnected { endpoint: self.endpoint() });
        }
        Ok(())
    }

    /// Opens a fresh handle, replacing (and closing) any previous one.
    /// Fails once the manager has been closed.
    pub fn open(&self) -> Result<u64, ClientError> {
        self.ensure_not_closed()?;
        let generation = self.generation.get() + 1;
        self.generation.set(generation);

        let endpoint = self.endpoint();
        let sink = EventSink { generation, listener: self.listener.clone() };
        let connection = self.connector.connect(&endpoint, sink)?;
        info!(%endpoint, generation, "Opening chat socket");

        if let Some(previous) = self.active.replace(Some(Handle { generation, connection })) {
            previous.connection.close();
        }
        Ok(generation)
    }

    /// Sends one frame. Rejected unless the live handle is open.
    pub fn send(&self, frame: &str) -> Result<(), ClientError> {
        let active = self.active.borrow();
        match active.as_ref() {
            Some(handle) if handle.connection.state() == ConnectionState::Open => {
                handle.connection.send_text(frame)
            }
            _ => {
                warn!(chat_id = %self.chat_id, "Socket not open, dropping frame");
                Err(ClientError::NotConnected { endpoint: self.endpoint() })
            }
        }
    }

    /// Resolves once the live handle is open, reopening closed handles and
    /// yielding between polls. Gives up as soon as the manager is closed.
    pub async fn ensure_open(&self) -> Result<(), ClientError> {
        let mut polls: u32 = 0;
        loop {
            self.ensure_not_closed()?;
            match self.state() {
                ConnectionState::Open => return Ok(()),
                ConnectionState::Connecting => {}
                ConnectionState::Closing | ConnectionState::Closed => {
                    self.open()?;
                }
            }

            if let Some(max) = self.config.max_open_polls {
                if polls >= max {
                    warn!(chat_id = %self.chat_id, polls, "Giving up waiting for socket");
                    return Err(ClientError::Unreachable { endpoint: self.endpoint(), attempts: polls });
                }
            }
            polls += 1;
            debug!(polls, "Waiting for socket to open");
            self.connector.pause(self.config.poll_interval).await;
        }
    }

    /// `open --content-delivered--> closing --> connecting`: drops the live
    /// handle and immediately opens a new one to the same chat.
    pub fn force_reconnect(&self) -> Result<u64, ClientError> {
        self.ensure_not_closed()?;
        if let Some(handle) = self.active.borrow().as_ref() {
            info!(generation = handle.generation, "Content delivered, recycling chat socket");
            handle.connection.close();
        }
        self.open()
    }

    /// Terminal: tears down the live handle and refuses to open new ones.
    pub fn close(&self) {
        self.closed.set(true);
        if let Some(handle) = self.active.borrow_mut().take() {
            info!(chat_id = %self.chat_id, generation = handle.generation, "Closing chat socket");
            handle.connection.close();
        }
    }
}

impl<C: Connector> Drop for TransportManager<C> {
    fn drop(&mut self) {
        self.close();
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn manager(connector: MockConnector) -> TransportManager<MockConnector> {
        let (listener, _) = recording_listener();
        TransportManager::new(connector, TransportConfig::new("ws://host:8000/"), "chat-7", listener)
    }

    #[test]
    fn endpoint_is_per_chat() {
        assert_eq!(TransportConfig::new("ws://host:8000/").endpoint("c1"), "ws://host:8000/ws/c1");
    }

    #[test]
    fn send_before_open_is_rejected() {
        let connector = MockConnector::default();
        let transport = manager(connector.clone());
        assert!(matches!(transport.send("x"), Err(ClientError::NotConnected { .. })));

        transport.open().unwrap();
        assert_eq!(transport.state(), ConnectionState::Connecting);
        assert!(transport.send("x").unwrap_err().is_transport());

        connector.open_latest();
        transport.send("x").unwrap();
        assert_eq!(connector.sent(), vec!["x".to_string()]);
    }

    #[tokio::test]
    async fn ensure_open_polls_until_open() {
        let connector = MockConnector::opening_after(3);
        let transport = manager(connector.clone());

        transport.ensure_open().await.unwrap();

        assert_eq!(transport.state(), ConnectionState::Open);
        assert_eq!(connector.opened(), 1);
        assert_eq!(connector.state.borrow().pauses, 3);
    }

    #[tokio::test]
    async fn ensure_open_is_immediate_when_open() {
        let connector = MockConnector::default();
        let transport = manager(connector.clone());
        transport.open().unwrap();
        connector.open_latest();

        transport.ensure_open().await.unwrap();
        assert_eq!(connector.state.borrow().pauses, 0);
        assert_eq!(connector.opened(), 1);
    }

    #[tokio::test]
    async fn bounded_polling_reports_unreachable() {
        let connector = MockConnector::default();
        let (listener, _) = recording_listener();
        let mut config = TransportConfig::new("ws://host");
        config.max_open_polls = Some(2);
        let transport = TransportManager::new(connector, config, "chat-7", listener);

        let err = transport.ensure_open().await.unwrap_err();
        assert!(matches!(err, ClientError::Unreachable { attempts: 2, .. }));
    }

    #[test]
    fn forced_reconnect_replaces_handle() {
        let connector = MockConnector::default();
        let transport = manager(connector.clone());
        let first = transport.open().unwrap();
        connector.open_latest();

        let second = transport.force_reconnect().unwrap();

        assert!(second > first);
        assert!(!transport.is_current(first));
        assert!(transport.is_current(second));
        assert_eq!(connector.connection_state(0), ConnectionState::Closed);
        assert_eq!(transport.state(), ConnectionState::Connecting);
        assert_eq!(connector.state.borrow().endpoints[1], "ws://host:8000/ws/chat-7");
    }

    #[test]
    fn events_carry_generation() {
        let connector = MockConnector::default();
        let (listener, events) = recording_listener();
        let transport = TransportManager::new(connector.clone(), TransportConfig::new("ws://h"), "c", listener);
        let generation = transport.open().unwrap();
        connector.open_latest();

        let recorded = events.lock().unwrap().clone();
        assert_eq!(recorded, vec![TransportEvent { generation, kind: TransportEventKind::Opened }]);
    }

    #[test]
    fn drop_closes_live_handle() {
        let connector = MockConnector::default();
        {
            let transport = manager(connector.clone());
            transport.open().unwrap();
        }
        assert_eq!(connector.connection_state(0), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn handle_closed_while_polling_is_replaced() {
        let connector = MockConnector::opening_after(3);
        connector.state.borrow_mut().close_at_pause = Some(1);
        let transport = manager(connector.clone());

        transport.ensure_open().await.unwrap();
        transport.send("frame").unwrap();

        assert_eq!(connector.opened(), 2);
        assert!(transport.is_current(2));
        assert_eq!(connector.connection_state(0), ConnectionState::Closed);
        assert_eq!(connector.connection_state(1), ConnectionState::Open);
        assert_eq!(connector.state.borrow().sent_on, vec![1]);
    }

    #[tokio::test]
    async fn closed_manager_never_reopens() {
        let connector = MockConnector::opening_after(1);
        let transport = manager(connector.clone());
        transport.open().unwrap();
        transport.close();

        assert!(transport.is_closed());
        assert!(matches!(transport.ensure_open().await, Err(ClientError::NotConnected { .. })));
        assert!(matches!(transport.force_reconnect(), Err(ClientError::NotConnected { .. })));
        assert!(transport.open().is_err());
        assert_eq!(connector.opened(), 1);
        assert_eq!(transport.state(), ConnectionState::Closed);
    }
}
