use anyhow::{Context, Result};
use clap::Parser;
use crossterm::event::{self, Event, KeyEventKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod actions;
mod app;
mod clock;
mod config;
mod sessions;

use actions::Action;
use app::App;
use clock::{Clock, FixedClock, SystemClock, Ticker};
use config::{Cli, Config, SessionSource, Settings};
use sessions::{evaluate, load_sessions_file, Session, SessionClient};

const TICK_PERIOD: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match cli.config.clone().or_else(config::default_config_path) {
        Some(path) => Config::load(&path),
        None => Config::default(),
    };
    let settings = config.merge(&cli).into_settings()?;

    let clock: Arc<dyn Clock> = match cli.at {
        Some(at) => Arc::new(FixedClock(at)),
        None => Arc::new(SystemClock),
    };

    if cli.once {
        init_stderr_logging();
        return run_once(&settings, clock.as_ref()).await;
    }

    let _log_guard = init_file_logging(&settings)?;
    run_tui(settings, clock).await
}

/// `RUST_LOG` when set, `info` otherwise
fn env_filter() -> EnvFilter {
    filter_from(std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref())
}

fn filter_from(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
}

/// The terminal belongs to the UI, so logs go to a file
fn init_file_logging(settings: &Settings) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let dir = settings
        .log_file
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(std::env::temp_dir);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    let file_name = settings
        .log_file
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "session-beacon.log".into());

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(guard)
}

async fn fetch_sessions(source: &SessionSource, course_id: &str) -> Result<Vec<Session>> {
    let sessions = match source {
        SessionSource::Api { base_url, token } => SessionClient::new(base_url, token.clone())
            .course_sessions(course_id)
            .await
            .with_context(|| format!("Failed to fetch sessions from {}", base_url))?,
        SessionSource::File(path) => load_sessions_file(path)
            .await
            .with_context(|| format!("Failed to load sessions from {}", path.display()))?,
    };
    Ok(sessions)
}

/// Spawn a fetch that reports back through the action channel
fn spawn_fetch(settings: &Settings, tx: mpsc::UnboundedSender<Action>) {
    let source = settings.source.clone();
    let course_id = settings.course_id.clone();
    tokio::spawn(async move {
        let action = match fetch_sessions(&source, &course_id).await {
            Ok(sessions) => Action::SessionsLoaded(sessions),
            Err(e) => {
                let message = format!("{:#}", e);
                error!(error = %message, "session fetch failed");
                Action::Error(message)
            }
        };
        let _ = tx.send(action);
    });
}

async fn run_once(settings: &Settings, clock: &dyn Clock) -> Result<()> {
    let sessions = fetch_sessions(&settings.source, &settings.course_id).await?;
    let now = clock.now();
    info!(count = sessions.len(), %now, "evaluating sessions");

    let evaluation = evaluate(&sessions, &settings.course_id, now);
    println!("{}", serde_json::to_string_pretty(&evaluation)?);
    Ok(())
}

async fn run_tui(settings: Settings, clock: Arc<dyn Clock>) -> Result<()> {
    info!(course = %settings.course_id, "starting");

    // Create event channel
    let (tx, mut rx) = mpsc::unbounded_channel::<Action>();

    // Initialize terminal
    let mut terminal = ratatui::init();

    // Spawn input handler
    let input_tx = tx.clone();
    tokio::spawn(async move {
        loop {
            if event::poll(Duration::from_millis(100)).unwrap_or(false) {
                if let Ok(Event::Key(key)) = event::read() {
                    if key.kind == KeyEventKind::Press && input_tx.send(Action::KeyPress(key)).is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Sessions are fetched once per view; ticks only recompute
    spawn_fetch(&settings, tx.clone());
    let ticker = Ticker::new(clock.clone(), TICK_PERIOD).spawn(tx.clone());

    // Create app state
    let mut app = App::new(settings.course_id.clone(), clock.now());

    // Main event loop
    let result = loop {
        // Render
        if let Err(e) = terminal.draw(|f| app.render(f)) {
            break Err(e.into());
        }

        // Process any pending actions from the app
        for pending_action in app.take_pending_actions() {
            match pending_action {
                Action::Refresh => {
                    info!("refreshing sessions");
                    spawn_fetch(&settings, tx.clone());
                }
                Action::CopyCalendarLink(ref url) => match arboard::Clipboard::new() {
                    Ok(mut clipboard) => {
                        if let Err(e) = clipboard.set_text(url.clone()) {
                            app.status_message = Some(format!("Clipboard error: {}", e));
                        } else {
                            app.status_message = Some("Calendar link copied to clipboard!".to_string());
                        }
                    }
                    Err(e) => {
                        app.status_message = Some(format!("Clipboard error: {}", e));
                    }
                },
                _ => {}
            }
        }

        // Handle events from channel
        match rx.recv().await {
            Some(action) => match app.handle_action(action) {
                Ok(true) => break Ok(()),
                Ok(false) => {}
                Err(e) => break Err(e),
            },
            None => break Ok(()),
        }
    };

    ticker.abort();

    // Restore terminal
    ratatui::restore();
    info!("stopped");
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter_defaults_to_info() {
        assert_eq!(filter_from(None).to_string(), "info");
        assert_eq!(filter_from(Some("beacon=loudest")).to_string(), "info");
    }

    #[test]
    fn test_log_filter_honors_override() {
        assert_eq!(filter_from(Some("debug")).to_string(), "debug");
        assert_eq!(
            filter_from(Some("session_beacon=trace")).to_string(),
            "session_beacon=trace"
        );
    }
}
