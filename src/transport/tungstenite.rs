use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::{Connection, ConnectionState, Connector, EventSink, TransportEventKind};
use crate::errors::ClientError;

const CONNECTING: u8 = 0;
const OPEN: u8 = 1;
const CLOSING: u8 = 2;
const CLOSED: u8 = 3;

fn decode_state(raw: u8) -> ConnectionState {
    match raw {
        CONNECTING => ConnectionState::Connecting,
        OPEN => ConnectionState::Open,
        CLOSING => ConnectionState::Closing,
        _ => ConnectionState::Closed,
    }
}

enum Outgoing {
    Frame(String),
    Close,
}

/// Native transport over tokio-tungstenite. Must be used inside a tokio
/// runtime; each handle runs its socket on a spawned task.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

pub struct TungsteniteConnection {
    state: Arc<AtomicU8>,
    outgoing: mpsc::UnboundedSender<Outgoing>,
    endpoint: String,
}

impl Connector for TungsteniteConnector {
    type Connection = TungsteniteConnection;

    fn connect(&self, endpoint: &str, sink: EventSink) -> Result<TungsteniteConnection, ClientError> {
        let request = endpoint.into_client_request().map_err(ClientError::Socket)?;
        let state = Arc::new(AtomicU8::new(CONNECTING));
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(run_socket(request, state.clone(), rx, sink));

        Ok(TungsteniteConnection { state, outgoing: tx, endpoint: endpoint.to_string() })
    }

    fn pause(&self, period: Duration) -> impl Future<Output = ()> {
        tokio::time::sleep(period)
    }
}

impl Connection for TungsteniteConnection {
    fn state(&self) -> ConnectionState {
        decode_state(self.state.load(Ordering::Acquire))
    }

    fn send_text(&self, frame: &str) -> Result<(), ClientError> {
        self.outgoing
            .send(Outgoing::Frame(frame.to_string()))
            .map_err(|_| ClientError::NotConnected { endpoint: self.endpoint.clone() })
    }

    fn close(&self) {
        begin_close(&self.state);
        let _ = self.outgoing.send(Outgoing::Close);
    }
}

/// `CONNECTING | OPEN -> CLOSING` in one step, so a `CLOSED` written by the
/// socket task is never overwritten.
fn begin_close(state: &AtomicU8) -> bool {
    state
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
            matches!(current, CONNECTING | OPEN).then_some(CLOSING)
        })
        .is_ok()
}

async fn run_socket(
    request: Request,
    state: Arc<AtomicU8>,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    sink: EventSink,
) {
    let generation = sink.generation();
    let stream = match connect_async(request).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            warn!(generation, "WebSocket connect failed: {e}");
            state.store(CLOSED, Ordering::Release);
            sink.emit(TransportEventKind::Closed);
            return;
        }
    };

    // A close requested while connecting leaves the state at CLOSING.
    if state.compare_exchange(CONNECTING, OPEN, Ordering::AcqRel, Ordering::Acquire).is_ok() {
        info!(generation, "WebSocket connected");
        sink.emit(TransportEventKind::Opened);
    }

    let (mut write, mut read) = stream.split();
    loop {
        tokio::select! {
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    sink.emit(TransportEventKind::Frame(text.as_str().to_owned()));
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(generation, "WebSocket receive error: {e}");
                    break;
                }
            },
            command = outgoing.recv() => match command {
                Some(Outgoing::Frame(frame)) => {
                    if let Err(e) = write.send(Message::Text(frame.into())).await {
                        warn!(generation, "WebSocket send error: {e}");
                        break;
                    }
                }
                Some(Outgoing::Close) | None => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            },
        }
    }

    state.store(CLOSED, Ordering::Release);
    debug!(generation, "WebSocket connection closed");
    sink.emit(TransportEventKind::Closed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::recording_listener;
    use crate::transport::{TransportConfig, TransportManager};

    #[tokio::test]
    async fn unreachable_endpoint_reports_closed() {
        let (listener, events) = recording_listener();
        // Port 9 (discard) is not expected to accept WebSocket upgrades.
        let transport =
            TransportManager::new(TungsteniteConnector, TransportConfig::new("ws://127.0.0.1:9"), "c1", listener);
        let generation = transport.open().unwrap();

        for _ in 0..50 {
            if transport.state() == ConnectionState::Closed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert_eq!(transport.state(), ConnectionState::Closed);
        assert!(transport.send("x").is_err());
        let recorded = events.lock().unwrap().clone();
        assert_eq!(recorded.last().map(|e| (e.generation, e.kind.clone())), Some((generation, TransportEventKind::Closed)));
    }

    #[test]
    fn invalid_endpoint_is_rejected_synchronously() {
        let (listener, _) = recording_listener();
        let transport = TransportManager::new(TungsteniteConnector, TransportConfig::new("not a url"), "c1", listener);
        assert!(matches!(transport.open(), Err(ClientError::Socket(_))));
    }

    #[test]
    fn close_never_reverts_a_closed_socket() {
        let state = AtomicU8::new(OPEN);
        assert!(begin_close(&state));
        assert_eq!(decode_state(state.load(Ordering::Acquire)), ConnectionState::Closing);

        state.store(CLOSED, Ordering::Release);
        assert!(!begin_close(&state));
        assert_eq!(decode_state(state.load(Ordering::Acquire)), ConnectionState::Closed);
    }
}
