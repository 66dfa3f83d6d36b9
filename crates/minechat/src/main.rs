mod app;
mod config;
mod credentials;
mod history;
mod logging;
mod send;
mod theme;
mod ui;

use anyhow::Result;
use app::{Action, App};
use clap::{Parser, Subcommand};
use config::{load_config, ConnectionArgs, RuntimeConfig};
use credentials::{resolve_credential, CredentialStore, StoredCredential};
use crossterm::{
    event::{Event, EventStream},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use history::{load_recent, HistoryWriter};
use minechat_core::{ClientHandles, SessionError, StatusEvent, Supervisor, TcpConnector};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const HISTORY_PRELOAD: usize = 200;

#[derive(Parser, Debug)]
#[command(name = "minechat")]
#[command(about = "Chat client for the minechat line protocol", long_about = None)]
struct Cli {
    #[command(flatten)]
    args: ConnectionArgs,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open the chat window (default)
    Chat,
    /// Send a single message and exit
    Send { message: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = match load_config(cli.args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("minechat: {err}");
            std::process::exit(2);
        }
    };
    let command = cli.command.unwrap_or(Command::Chat);
    let settings = match command {
        Command::Chat => logging::LogSettings::for_run(&config, "chat", true),
        Command::Send { .. } => logging::LogSettings::for_run(&config, "send", false),
    };
    if let Some(path) = logging::init_logging(&settings) {
        info!(event = "logging_started", path = %path.display());
    }

    let result = match command {
        Command::Chat => run_chat(config).await,
        Command::Send { message } => {
            send::run_send(&config, &TcpConnector::default(), &message).await
        }
    };
    let code = match result {
        Ok(code) => code,
        Err(err) => {
            error!(event = "minechat_failed", error = %format!("{err:#}"));
            eprintln!("minechat: {err:#}");
            1
        }
    };
    std::process::exit(code);
}

async fn run_chat(config: RuntimeConfig) -> Result<i32> {
    let store = CredentialStore::new(&config.credentials_path);
    let credential =
        resolve_credential(config.key.as_deref(), config.user_name.as_deref(), &store).await?;
    let history = load_recent(&config.history_path, HISTORY_PRELOAD)
        .await
        .unwrap_or_else(|err| {
            warn!(event = "history_preload_failed", error = %err);
            Vec::new()
        });

    let (supervisor, handles) =
        Supervisor::new(config.supervisor_config(credential), TcpConnector::default());
    let ClientHandles {
        messages,
        status,
        audit,
        send,
    } = handles;
    let history_task = tokio::spawn(HistoryWriter::new(config.history_path.clone()).run(audit));
    let (stop_tx, stop_rx) = watch::channel(false);
    let supervisor_task = tokio::spawn(supervisor.run(stop_rx));
    info!(event = "chat_started", read = %config.read_endpoint(), write = %config.write_endpoint());

    let mut app = App::new(history);
    let mut terminal = setup_terminal()?;
    let channels = Channels {
        messages,
        status,
        send,
        supervisor: supervisor_task,
        stop: stop_tx,
        store,
    };
    let result = run_app(&mut terminal, &mut app, channels).await;
    restore_terminal(&mut terminal)?;

    let written = history_task.await.unwrap_or_default();
    info!(
        event = "chat_closed",
        history_lines = written,
        connections = %app.connection_label()
    );
    result?;

    Ok(match app.outcome() {
        Some(Err(err)) => {
            eprintln!("minechat: {err}");
            1
        }
        _ => 0,
    })
}

struct Channels {
    messages: mpsc::Receiver<String>,
    status: mpsc::Receiver<StatusEvent>,
    send: mpsc::Sender<String>,
    supervisor: JoinHandle<Result<(), SessionError>>,
    stop: watch::Sender<bool>,
    store: CredentialStore,
}

type Backend = CrosstermBackend<io::Stdout>;

async fn run_app(terminal: &mut Terminal<Backend>, app: &mut App, channels: Channels) -> Result<()> {
    let Channels {
        mut messages,
        mut status,
        send,
        mut supervisor,
        stop,
        store,
    } = channels;
    let mut events = EventStream::new();

    loop {
        terminal.draw(|frame| ui::render(frame, app))?;
        if app.should_quit() {
            break;
        }
        tokio::select! {
            Some(message) = messages.recv() => app.push_message(message),
            Some(event) = status.recv() => {
                if let StatusEvent::Registered { nickname, token } = &event {
                    save_registration(&store, nickname, token).await;
                }
                app.apply_status(event);
            }
            joined = &mut supervisor, if !app.supervisor_finished() => {
                let outcome = joined.unwrap_or_else(|err| {
                    Err(SessionError::Protocol(format!("supervisor task failed: {err}")))
                });
                app.finish(outcome);
            }
            maybe_event = events.next() => {
                if let Some(Ok(Event::Key(key))) = maybe_event {
                    match app.handle_key(key) {
                        Action::Send(message) => app.submit(&send, message),
                        Action::Quit => break,
                        Action::None => {}
                    }
                }
            }
        }
    }

    let _ = stop.send(true);
    drop(send);
    if !app.supervisor_finished() {
        drop(messages);
        drop(status);
        if let Ok(Err(err)) = supervisor.await {
            app.finish(Err(err));
        }
    }
    Ok(())
}

async fn save_registration(store: &CredentialStore, nickname: &str, token: &str) {
    let stored = StoredCredential {
        nickname: nickname.to_string(),
        account_hash: token.to_string(),
    };
    if let Err(err) = store.save(&stored).await {
        warn!(event = "credential_save_failed", error = %err);
    }
}

fn setup_terminal() -> Result<Terminal<Backend>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<Backend>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}
