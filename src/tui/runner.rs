//! TUI run loop.
//!
//! Drives the draw/input cycle until the loop controller marks the session
//! finished. Each pass captures a snapshot, renders it, then waits for the
//! next key or tick.

use eyre::Result;
use log::debug;

use super::app::App;
use super::events::{Event, EventHandler};
use super::{Tui, views};

/// Owns the terminal, the app state, and the event source for one run.
pub struct TuiRunner {
    terminal: Tui,
    app: App,
    events: EventHandler,
}

impl TuiRunner {
    pub fn new(terminal: Tui, app: App, events: EventHandler) -> Self {
        Self { terminal, app, events }
    }

    /// Run until the session reaches a terminal state.
    ///
    /// The final frame is drawn before returning, so the last status line is
    /// visible in scrollback once the terminal is restored.
    pub async fn run(mut self) -> Result<()> {
        loop {
            let snapshot = self.app.snapshot();
            self.terminal.draw(|frame| views::render(frame, &snapshot))?;

            if snapshot.finished {
                debug!("Session finished; leaving TUI loop");
                return Ok(());
            }

            match self.events.next().await? {
                Event::Key(key) => self.app.handle_key(key),
                Event::Tick => {}
                // The next draw picks up the new size.
                Event::Resize(_, _) => {}
            }
        }
    }
}
