use std::future::Future;
use std::time::Duration;

use based_chat::errors::ClientError;
use based_chat::transport::{Connection, ConnectionState, Connector, EventSink, TransportEventKind};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{CloseEvent, MessageEvent, WebSocket};

/// Opens browser `WebSocket`s for the chat transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserConnector;

/// A browser socket plus the callbacks wired into it. Dropping the handle
/// detaches the callbacks before they are freed.
pub struct BrowserConnection {
    ws: WebSocket,
    endpoint: String,
    _onopen: Closure<dyn Fn()>,
    _onmessage: Closure<dyn Fn(MessageEvent)>,
    _onclose: Closure<dyn Fn(CloseEvent)>,
    _onerror: Closure<dyn Fn()>,
}

impl Connector for BrowserConnector {
    type Connection = BrowserConnection;

    fn connect(&self, endpoint: &str, sink: EventSink) -> Result<BrowserConnection, ClientError> {
        let ws = WebSocket::new(endpoint).map_err(|e| ClientError::ConnectFailed {
            endpoint: endpoint.to_string(),
            message: format!("{e:?}"),
        })?;
        ws.set_binary_type(web_sys::BinaryType::Arraybuffer);

        // --- onopen ---
        let open_sink = sink.clone();
        let onopen = Closure::<dyn Fn()>::new(move || open_sink.emit(TransportEventKind::Opened));
        ws.set_onopen(Some(onopen.as_ref().unchecked_ref()));

        // --- onmessage: text frames only ---
        let frame_sink = sink.clone();
        let onmessage = Closure::<dyn Fn(MessageEvent)>::new(move |ev: MessageEvent| {
            match ev.data().as_string() {
                Some(text) => frame_sink.emit(TransportEventKind::Frame(text)),
                None => log::debug!("Ignoring non-text frame"),
            }
        });
        ws.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));

        // --- onclose ---
        let onclose = Closure::<dyn Fn(CloseEvent)>::new(move |ev: CloseEvent| {
            log::info!("Chat socket closed (code {})", ev.code());
            sink.emit(TransportEventKind::Closed);
        });
        ws.set_onclose(Some(onclose.as_ref().unchecked_ref()));

        // --- onerror: the close event that follows does the reporting ---
        let onerror = Closure::<dyn Fn()>::new(move || {
            log::error!("WebSocket connection error");
        });
        ws.set_onerror(Some(onerror.as_ref().unchecked_ref()));

        Ok(BrowserConnection {
            ws,
            endpoint: endpoint.to_string(),
            _onopen: onopen,
            _onmessage: onmessage,
            _onclose: onclose,
            _onerror: onerror,
        })
    }

    fn pause(&self, period: Duration) -> impl Future<Output = ()> {
        gloo_timers::future::sleep(period)
    }
}

impl Connection for BrowserConnection {
    fn state(&self) -> ConnectionState {
        match self.ws.ready_state() {
            WebSocket::CONNECTING => ConnectionState::Connecting,
            WebSocket::OPEN => ConnectionState::Open,
            WebSocket::CLOSING => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }

    fn send_text(&self, frame: &str) -> Result<(), ClientError> {
        self.ws.send_with_str(frame).map_err(|e| ClientError::ConnectFailed {
            endpoint: self.endpoint.clone(),
            message: format!("send failed: {e:?}"),
        })
    }

    fn close(&self) {
        let _ = self.ws.close();
    }
}

impl Drop for BrowserConnection {
    fn drop(&mut self) {
        self.ws.set_onopen(None);
        self.ws.set_onmessage(None);
        self.ws.set_onclose(None);
        self.ws.set_onerror(None);
        let _ = self.ws.close();
    }
}
