use std::time::{Duration, Instant};

use crossterm::event::{Event, KeyEventKind};
use parley_client::Update;
use tokio::sync::mpsc;

mod app;
pub mod command;
mod error;
pub mod keymap;
mod ui;

pub use app::App;
pub use error::TuiError;

/// Drives the status viewer's progress, toast expiry and key sequence timeouts.
const TICK: Duration = Duration::from_millis(40);

pub async fn run(app: App, updates: mpsc::UnboundedReceiver<Update>) -> Result<(), TuiError> {
    let terminal = ratatui::init();
    let res = run_inner(terminal, app, updates).await;
    ratatui::restore();
    res
}

async fn run_inner(
    mut term: ratatui::DefaultTerminal,
    mut app: App,
    mut updates: mpsc::UnboundedReceiver<Update>,
) -> Result<(), TuiError> {
    use futures::stream::StreamExt;

    let mut term_events = crossterm::event::EventStream::new();
    let mut tick = tokio::time::interval(TICK);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    while !app.should_quit() {
        term.draw(|frame| ui::draw(frame, &app))?;
        tokio::select! {
            event = term_events.next() => match event {
                Some(Ok(Event::Key(key))) if key.kind != KeyEventKind::Release => {
                    app.handle_key(key.into(), Instant::now());
                }
                Some(Ok(event)) => tracing::trace!("{event:?}"),
                Some(Err(err)) => tracing::warn!("{err}"),
                None => {
                    tracing::info!("term events stream stopped, shutting down");
                    break;
                }
            },
            update = updates.recv() => match update {
                Some(update) => app.apply(update),
                None => {
                    tracing::info!("update stream stopped, shutting down");
                    break;
                }
            },
            _ = tick.tick() => app.tick(Instant::now()),
        }
    }
    Ok(())
}
