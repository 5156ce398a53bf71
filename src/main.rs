use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use clap::Parser;
use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use based_chat::api::{ApiClient, LoginCache};
use based_chat::cli::{self, CliCommand};
use based_chat::codec::{OutboundCommand, UploadSource};
use based_chat::config::ClientConfig;
use based_chat::errors::ClientError;
use based_chat::selection::{MainPane, ViewModel};
use based_chat::service::{dispatch, ChatSession};
use based_chat::store::SessionStore;
use based_chat::transport::tungstenite::TungsteniteConnector;
use based_chat::transport::{Listener, TransportEvent};

type Chat = ChatSession<TungsteniteConnector>;

/// A command waiting for the socket; polled alongside events and stdin.
type Pending = Pin<Box<dyn Future<Output = Result<(), ClientError>>>>;

#[derive(Parser, Debug)]
#[command(name = "based_chat", about = "Drive one workspace chat from the terminal")]
struct Args {
    /// Id of the chat to open.
    chat_id: String,

    /// Login email. Without it the cached login, if any, is reused.
    #[arg(long, env = "BASED_EMAIL")]
    email: Option<String>,

    /// Drop the cached login before starting.
    #[arg(long)]
    fresh_login: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (development convenience)
    dotenvy::dotenv().ok();

    // Logs go to stderr so they don't interleave with the rendered chat
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "based_chat=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = ClientConfig::from_env();

    // ── Login ─────────────────────────────────────────────────────────────────
    let cache = match &config.cache_dir {
        Some(dir) => LoginCache::in_dir(dir),
        None => LoginCache::default_location(),
    };
    if args.fresh_login {
        cache.clear()?;
    }
    let login = match &args.email {
        Some(email) => Some(ApiClient::new(&config.api_url).login_cached(&cache, email).await?),
        None => cache.load()?,
    };
    match login.as_ref() {
        Some(login) => match login.workspace_of(&args.chat_id) {
            Some(workspace) => info!(workspace = %workspace.name, "Chat found in workspace"),
            None => warn!(chat_id = %args.chat_id, "Chat is not listed in any workspace of this login"),
        },
        None => warn!("Not logged in; the model list stays empty until the backend sends one"),
    }
    let models = login.map(|l| l.models).unwrap_or_default();

    // ── Session ───────────────────────────────────────────────────────────────
    let (tx, mut events) = mpsc::unbounded_channel::<TransportEvent>();
    let listener: Listener = Arc::new(move |event| {
        let _ = tx.send(event);
    });
    let mut chat = Chat::open(
        TungsteniteConnector,
        config.transport(),
        &args.chat_id,
        listener,
        SessionStore::with_models(&args.chat_id, models),
        config.session_options(),
    )?;

    println!("{}", cli::HELP);
    let mut screen = Screen::default();
    screen.redraw(&chat.store().view());

    // ── Event loop ────────────────────────────────────────────────────────────
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut in_flight: FuturesUnordered<Pending> = FuturesUnordered::new();
    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                let applied = chat.handle_event(event);
                if applied.changed() {
                    screen.refresh(&chat.store().view(), applied.metadata_changed || applied.files_changed);
                }
            }
            Some(result) = in_flight.next(), if !in_flight.is_empty() => {
                if let Err(e) = result {
                    eprintln!("error: {e}");
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match cli::parse_line(&line) {
                    Some(CliCommand::Quit) => break,
                    Some(command) => match run_command(&mut chat, &mut screen, command).await {
                        Ok(Some(pending)) => in_flight.push(pending),
                        Ok(None) => {}
                        Err(e) => eprintln!("error: {e}"),
                    },
                    None if !line.trim().is_empty() => println!("{}", cli::HELP),
                    None => {}
                }
            }
        }
    }

    if !in_flight.is_empty() {
        warn!(pending = in_flight.len(), "Quitting with unsent commands");
    }
    chat.close();
    info!("Session closed");
    Ok(())
}

/// Applies a command locally. Commands for the backend come back as a
/// [`Pending`] send so the loop keeps reading events while the socket opens.
async fn run_command(chat: &mut Chat, screen: &mut Screen, command: CliCommand) -> Result<Option<Pending>, ClientError> {
    match command {
        CliCommand::Prompt(prompt) => {
            let command = chat.prepare_message(&prompt)?;
            screen.refresh(&chat.store().view(), false);
            return Ok(Some(send_later(chat, command, |e| e)));
        }
        CliCommand::Files => println!("{}", cli::render_files(&chat.store().view())),
        CliCommand::Select(name) => {
            chat.store_mut().select_file(&name)?;
            screen.redraw(&chat.store().view());
        }
        CliCommand::ToggleView => {
            chat.store_mut().toggle_view();
            screen.redraw(&chat.store().view());
        }
        CliCommand::Version(arg) => {
            let version_id = cli::resolve_version(&chat.store().view(), &arg).unwrap_or(arg);
            chat.store_mut().select_version(&version_id)?;
            screen.redraw(&chat.store().view());
        }
        CliCommand::Delete(file_id) => {
            let command = chat.prepare_delete(&file_id);
            println!("{}", cli::render_files(&chat.store().view()));
            return Ok(Some(send_later(chat, command, move |e| ClientError::DeleteFailure {
                file_id,
                message: e.to_string(),
            })));
        }
        CliCommand::Upload(path) => {
            let (filename, source) = read_upload(&path).await?;
            info!(file = %filename, "Upload queued");
            let command = OutboundCommand::upload(&filename, source);
            return Ok(Some(send_later(chat, command, move |e| ClientError::UploadFailure {
                filename,
                message: e.to_string(),
            })));
        }
        CliCommand::Model(model) => {
            chat.store_mut().select_model(&model)?;
            println!("{}", cli::render_header(&chat.store().view()));
        }
        CliCommand::Mode => {
            chat.store_mut().toggle_compose_mode();
            println!("{}", cli::render_header(&chat.store().view()));
        }
        CliCommand::Show => screen.redraw(&chat.store().view()),
        CliCommand::Quit => {}
    }
    Ok(None)
}

/// `wrap` turns a transport failure into the operation's own error.
fn send_later(chat: &Chat, command: OutboundCommand, wrap: impl FnOnce(ClientError) -> ClientError + 'static) -> Pending {
    let transport = chat.transport();
    Box::pin(async move { dispatch(&transport, &command).await.map_err(wrap) })
}

async fn read_upload(path: &Path) -> Result<(String, UploadSource), ClientError> {
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let bytes = tokio::fs::read(path).await.map_err(|e| ClientError::UploadFailure {
        filename: filename.clone(),
        message: e.to_string(),
    })?;
    Ok((filename, UploadSource::Bytes(bytes)))
}

/// Prints conversation entries incrementally; anything else is reprinted whole.
#[derive(Default)]
struct Screen {
    transcript: cli::Transcript,
}

impl Screen {
    fn refresh(&mut self, view: &ViewModel, with_header: bool) {
        if with_header {
            println!("{}", cli::render_header(view));
        }
        match &view.main {
            MainPane::Conversation(messages) => {
                let update = self.transcript.update(messages);
                if update.replaced && !with_header {
                    println!("{}", cli::render_header(view));
                }
                for line in update.lines {
                    println!("{line}");
                }
            }
            MainPane::Diff(_) => println!("{}", cli::render_main(view)),
        }
    }

    fn redraw(&mut self, view: &ViewModel) {
        self.transcript.reset();
        self.refresh(view, true);
    }
}
