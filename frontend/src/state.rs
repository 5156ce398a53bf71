use std::rc::Rc;
use std::sync::Arc;

use based_chat::codec::{OutboundCommand, UploadSource};
use based_chat::errors::ClientError;
use based_chat::models::LoginResponse;
use based_chat::selection::ViewModel;
use based_chat::service::{ChatSession, SessionOptions, dispatch};
use based_chat::store::SessionStore;
use based_chat::transport::{Listener, TransportConfig, TransportEvent, TransportManager};
use futures::StreamExt;
use futures::channel::mpsc;
use leptos::prelude::*;
use leptos::task::spawn_local;
use wasm_bindgen_futures::JsFuture;

use crate::api;
use crate::ws::BrowserConnector;

type Chat = ChatSession<BrowserConnector>;

/// Fallback chat when neither the URL nor the login names one.
const DEFAULT_CHAT_ID: &str = "general";

/// Shared application state, provided via Leptos context.
///
/// The chat session itself lives in a local stored value; components only
/// ever see the derived [`ViewModel`], republished after every change.
#[derive(Clone, Copy)]
pub struct ChatState {
    chat: StoredValue<Option<Chat>, LocalStorage>,
    pub login: RwSignal<Option<LoginResponse>>,
    pub view: RwSignal<ViewModel>,
    pub error: RwSignal<Option<String>>,
    pub is_sending: RwSignal<bool>,
}

impl ChatState {
    /// Create a new `ChatState` and provide it in the current Leptos context.
    pub fn provide() -> Self {
        let state = Self {
            chat: StoredValue::new_local(None),
            login: RwSignal::new(api::cached_login()),
            view: RwSignal::new(ViewModel::default()),
            error: RwSignal::new(None),
            is_sending: RwSignal::new(false),
        };
        provide_context(state);
        state
    }

    pub fn has_chat(self) -> bool {
        self.chat.with_value(|slot| slot.is_some())
    }

    pub fn log_in(self, email: String) {
        spawn_local(async move {
            match api::login(&email).await {
                Ok(login) => {
                    log::info!("Logged in as {}", login.email);
                    api::store_login(&login);
                    self.error.set(None);
                    self.login.set(Some(login));
                }
                Err(e) => {
                    log::error!("Login failed: {e}");
                    self.error.set(Some(e));
                }
            }
        });
    }

    pub fn log_out(self) {
        api::clear_login();
        self.chat.update_value(|slot| {
            if let Some(chat) = slot.take() {
                chat.close();
            }
        });
        self.login.set(None);
        self.view.set(ViewModel::default());
    }

    /// Chat named by the page URL, else the first chat of the login.
    pub fn open_initial_chat(self) {
        let chat_id = api::chat_id_from_location()
            .or_else(|| {
                self.login.with_untracked(|login| {
                    login.as_ref().and_then(|l| l.workspaces.iter().flat_map(|w| w.chats.first()).next().map(|c| c.id.clone()))
                })
            })
            .unwrap_or_else(|| DEFAULT_CHAT_ID.to_string());
        self.open_chat(chat_id);
    }

    /// Opens `chat_id`, replacing any open chat, and pumps its socket events
    /// into the store.
    pub fn open_chat(self, chat_id: String) {
        let models = self
            .login
            .with_untracked(|login| login.as_ref().map(|l| l.models.clone()).unwrap_or_default());
        let (tx, mut rx) = mpsc::unbounded::<TransportEvent>();
        let listener: Listener = Arc::new(move |event| {
            let _ = tx.unbounded_send(event);
        });

        let chat = match Chat::open(
            BrowserConnector,
            TransportConfig::new(api::WS_BASE),
            &chat_id,
            listener,
            SessionStore::with_models(chat_id.as_str(), models),
            SessionOptions::default(),
        ) {
            Ok(chat) => chat,
            Err(e) => return self.fail(e),
        };
        self.view.set(chat.store().view());
        self.chat.update_value(|slot| {
            if let Some(previous) = slot.replace(chat) {
                previous.close();
            }
        });

        spawn_local(async move {
            while let Some(event) = rx.next().await {
                self.handle_event(&chat_id, event);
            }
            log::debug!("Event pump for chat {chat_id} finished");
        });
    }

    fn handle_event(self, chat_id: &str, event: TransportEvent) {
        let mut refreshed = None;
        self.chat.update_value(|slot| {
            // events of a chat that has since been replaced
            let Some(chat) = slot.as_mut().filter(|c| c.store().session().chat_id == chat_id) else {
                return;
            };
            if chat.handle_event(event).changed() {
                refreshed = Some(chat.store().view());
            }
        });
        if let Some(view) = refreshed {
            self.view.set(view);
        }
    }

    /// Runs a local action on the open chat, then republishes the view.
    fn act<T>(self, action: impl FnOnce(&mut Chat) -> Result<T, ClientError>) -> Option<T> {
        let mut outcome = None;
        self.chat.update_value(|slot| {
            if let Some(chat) = slot.as_mut() {
                outcome = Some(action(chat).map(|value| (value, chat.store().view())));
            }
        });
        match outcome? {
            Ok((value, view)) => {
                self.view.set(view);
                self.error.set(None);
                Some(value)
            }
            Err(e) => {
                self.fail(e);
                None
            }
        }
    }

    fn transport(self) -> Option<Rc<TransportManager<BrowserConnector>>> {
        self.chat.with_value(|slot| slot.as_ref().map(Chat::transport))
    }

    /// Dispatches in the background; `wrap` turns a transport failure into
    /// the operation's own error.
    fn send_command(self, command: OutboundCommand, wrap: impl FnOnce(ClientError) -> ClientError + 'static) {
        let Some(transport) = self.transport() else {
            return self.fail(ClientError::NotConnected { endpoint: api::WS_BASE.to_string() });
        };
        self.is_sending.set(true);
        spawn_local(async move {
            let result = dispatch(&transport, &command).await;
            self.is_sending.set(false);
            match result {
                // the chat was closed or replaced while this send waited
                Err(_) if transport.is_closed() => log::debug!("Dropped {} for a closed chat", command.action()),
                Err(e) => self.fail(wrap(e)),
                Ok(()) => {}
            }
        });
    }

    fn fail(self, error: ClientError) {
        log::error!("{error}");
        self.error.set(Some(error.to_string()));
    }

    // ── User actions ─────────────────────────────────────────────────────────

    pub fn send_message(self, prompt: String) {
        if let Some(command) = self.act(|chat| chat.prepare_message(&prompt)) {
            self.send_command(command, |e| e);
        }
    }

    pub fn upload(self, file: web_sys::File) {
        spawn_local(async move {
            let filename = file.name();
            let bytes = match JsFuture::from(file.array_buffer()).await {
                Ok(buffer) => js_sys::Uint8Array::new(&buffer).to_vec(),
                Err(e) => {
                    return self.fail(ClientError::UploadFailure { filename, message: format!("{e:?}") });
                }
            };
            let command = OutboundCommand::upload(&filename, UploadSource::Bytes(bytes));
            self.send_command(command, move |e| ClientError::UploadFailure { filename, message: e.to_string() });
        });
    }

    /// The file disappears locally right away.
    pub fn delete(self, file_id: String) {
        if let Some(command) = self.act(|chat| Ok(chat.prepare_delete(&file_id))) {
            self.send_command(command, move |e| ClientError::DeleteFailure { file_id, message: e.to_string() });
        }
    }

    pub fn select_file(self, name: String) {
        self.act(|chat| chat.store_mut().select_file(&name));
    }

    pub fn select_version(self, version_id: String) {
        self.act(|chat| chat.store_mut().select_version(&version_id));
    }

    pub fn toggle_view(self) {
        self.act(|chat| {
            chat.store_mut().toggle_view();
            Ok(())
        });
    }

    pub fn edit(self, content: String) {
        self.act(|chat| {
            chat.store_mut().edit_selected_content(content);
            Ok(())
        });
    }

    pub fn select_model(self, model: String) {
        self.act(|chat| chat.store_mut().select_model(&model));
    }

    pub fn toggle_mode(self) {
        self.act(|chat| Ok(chat.store_mut().toggle_compose_mode()));
    }
}
