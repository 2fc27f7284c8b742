//! `librarian`
//!
//! This crate contains the interactive terminal front end of Librarian
use crate::app::{App, RecommendationReply};
use crate::config::{APP_CONFIG_PATH, LibrarianConfig};
use crate::errors::Error;
use core::time::Duration;
use crossterm::event::{Event, EventStream, KeyEventKind};
use futures::StreamExt as _;
use librarian_core::assistant::client::{ChatCompletion, OllamaChatClient};
use librarian_core::assistant::recommender::Recommender;
use librarian_core::database::queries::Db;
use ratatui::DefaultTerminal;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::{EnvFilter, fmt};
/// View state and the actions user input triggers
pub mod app;
/// Loading of `librarian-config.json`
pub mod config;
/// Error types
pub mod errors;
/// Drawing of the views
mod ui;

/// Redraw interval, keeps the progress spinner moving
const TICK_RATE: Duration = Duration::from_millis(200);

#[allow(
    clippy::missing_inline_in_public_items,
    reason = "Executed once per run, never across crate boundaries"
)]
#[allow(
    clippy::print_stderr,
    reason = "Tracing might not be available here if run_safe() failed before its initialization"
)]
pub fn run() {
    if let Err(error) = run_safe() {
        eprintln!("Failed to start Librarian! Error: {error}");
    }
}

/// Encapsulated run function that allows returning errors instead of panicking, so the terminal
/// is always handed back in a usable state before the error is printed.
fn run_safe() -> anyhow::Result<()> {
    let config = LibrarianConfig::load(Path::new(APP_CONFIG_PATH))?;
    init_tracing(&config.log_path)?;
    tracing::info!(
        library = %config.library_path.display(),
        model = %config.ollama.model,
        "starting librarian"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run_app(config))?;
    Ok(())
}

/// Logs go to a file, the terminal itself belongs to the UI
fn init_tracing(log_path: &Path) -> Result<(), Error> {
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(|err| {
            Error::Other(format!(
                "Failed to open log file {}: {err}",
                log_path.display()
            ))
        })?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(log_file))
        .finish()
        .try_init()
        .map_err(|err| Error::Other(format!("Unable to set global tracing subscriber: {err}")))
}

async fn run_app(config: LibrarianConfig) -> Result<(), Error> {
    let db = Db::init(&config.library_path).await?;
    let chat = OllamaChatClient::new(config.ollama.clone())?;
    let recommender = Arc::new(Recommender::new(chat, config.recommendation_ttl()));
    let (mut app, replies) = App::new(db.clone(), recommender);
    app.reload().await;

    let mut terminal = ratatui::try_init()?;
    let result = event_loop(&mut terminal, &mut app, replies).await;
    ratatui::restore();

    db.close().await;
    tracing::info!("librarian stopped");
    result
}

enum Step {
    Input(Option<std::io::Result<Event>>),
    Reply(Option<RecommendationReply>),
    Tick,
}

async fn event_loop<C: ChatCompletion + 'static>(
    terminal: &mut DefaultTerminal,
    app: &mut App<C>,
    mut replies: UnboundedReceiver<RecommendationReply>,
) -> Result<(), Error> {
    let mut events = EventStream::new();
    let mut ticker = tokio::time::interval(TICK_RATE);

    while !app.should_quit {
        terminal.draw(|frame| ui::render(frame, app))?;

        let step = tokio::select! {
            event = events.next() => Step::Input(event),
            reply = replies.recv() => Step::Reply(reply),
            _ = ticker.tick() => Step::Tick,
        };

        match step {
            Step::Input(Some(Ok(Event::Key(key)))) if key.kind == KeyEventKind::Press => {
                if let Some(action) = app.handle_key(key) {
                    app.dispatch(action).await;
                }
            }
            Step::Input(Some(Ok(_))) => {}
            Step::Input(Some(Err(err))) => return Err(err.into()),
            Step::Input(None) => break,
            Step::Reply(Some(reply)) => app.receive_recommendation(reply),
            Step::Reply(None) => {
                tracing::warn!("recommendation channel closed");
                break;
            }
            Step::Tick => app.tick().await,
        }
    }
    Ok(())
}
