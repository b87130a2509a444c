//! Event handling for the TUI.
//!
//! Wraps crossterm polling in an async stream of key presses, resize
//! notifications, and periodic ticks. Polling happens on a blocking task so
//! the controller's runtime threads are never held up by terminal input.

use crossterm::event::{self, Event as CrosstermEvent, KeyEvent, KeyEventKind};
use eyre::Result;
use std::time::Duration;

/// Unified event type for the TUI.
#[derive(Debug, Clone)]
pub enum Event {
    /// Keyboard input event
    Key(KeyEvent),
    /// Periodic tick for state refresh
    Tick,
    /// Terminal resize
    Resize(u16, u16),
}

/// Handles keyboard and tick events.
pub struct EventHandler {
    tick_rate: Duration,
}

impl EventHandler {
    /// Create a new event handler with the given tick rate.
    pub fn new(tick_rate_ms: u64) -> Self {
        Self {
            tick_rate: Duration::from_millis(tick_rate_ms),
        }
    }

    /// Get the next event. A poll timeout becomes a tick, so the caller's
    /// loop re-renders at the tick rate even when the operator is idle.
    pub async fn next(&self) -> Result<Event> {
        let tick_rate = self.tick_rate;

        let event = tokio::task::spawn_blocking(move || -> Result<Event> {
            if event::poll(tick_rate)? {
                match event::read()? {
                    CrosstermEvent::Key(key) => {
                        // Key press only; release events are noise.
                        if key.kind == KeyEventKind::Press {
                            Ok(Event::Key(key))
                        } else {
                            Ok(Event::Tick)
                        }
                    }
                    CrosstermEvent::Resize(w, h) => Ok(Event::Resize(w, h)),
                    _ => Ok(Event::Tick),
                }
            } else {
                Ok(Event::Tick)
            }
        })
        .await??;

        Ok(event)
    }
}

impl Default for EventHandler {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_handler_creation() {
        let handler = EventHandler::new(250);
        assert_eq!(handler.tick_rate, Duration::from_millis(250));
    }

    #[test]
    fn test_event_handler_default() {
        let handler = EventHandler::default();
        assert_eq!(handler.tick_rate, Duration::from_millis(100));
    }

    #[test]
    fn test_event_debug() {
        let tick = Event::Tick;
        assert!(format!("{:?}", tick).contains("Tick"));
    }
}
