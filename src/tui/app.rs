//! TUI application state and key handling.
//!
//! `App` is the operator's side of the run: it turns key presses into control
//! intents (queue-stop, resume, kill) and owns the navigation cursor over
//! iteration records. It never blocks the controller; all communication goes
//! through [`ControlState`] flags and short-lived reads of the shared session.

use std::sync::Arc;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::controller::{ControlState, IterationStatus, SharedSession, read_session};

/// Scroll step for PageUp/PageDown.
const PAGE_SCROLL: usize = 10;

/// An immutable view of everything the render path needs, captured under one
/// short session read.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub prd_name: String,
    pub remaining_tasks: usize,
    pub completed_tasks: usize,
    pub current_iteration: u64,
    pub status_line: String,
    pub finished: bool,
    pub record_count: usize,
    /// The record currently being viewed, if any exist yet
    pub viewed: Option<ViewedRecord>,
    pub stop_queued: bool,
    pub kill_requested: bool,
    /// Whether the view is following the newest record
    pub following: bool,
    pub scroll: usize,
}

/// One iteration record as displayed.
#[derive(Debug, Clone)]
pub struct ViewedRecord {
    /// 0-based position among records
    pub position: usize,
    /// 1-based iteration index
    pub index: u64,
    pub status: IterationStatus,
    pub saw_marker: bool,
    pub output: String,
}

pub struct App {
    control: Arc<ControlState>,
    session: SharedSession,
    /// `None` follows the newest record; `Some(pos)` pins a historical one
    cursor: Option<usize>,
    scroll: usize,
}

impl App {
    pub fn new(control: Arc<ControlState>, session: SharedSession) -> Self {
        Self {
            control,
            session,
            cursor: None,
            scroll: 0,
        }
    }

    /// Capture the current session + view state for rendering.
    pub fn snapshot(&self) -> Snapshot {
        let session = read_session(&self.session);
        let record_count = session.records.len();
        let viewed = if record_count == 0 {
            None
        } else {
            let position = self.viewed_position(record_count);
            session.records.get(position).map(|record| ViewedRecord {
                position,
                index: record.index,
                status: record.status,
                saw_marker: record.saw_marker,
                output: record.output.snapshot(),
            })
        };

        Snapshot {
            prd_name: session.prd_name.clone(),
            remaining_tasks: session.remaining_tasks,
            completed_tasks: session.completed_tasks,
            current_iteration: session.current_iteration,
            status_line: session.status_line.clone(),
            finished: session.finished,
            record_count,
            viewed,
            stop_queued: self.control.stop_requested(),
            kill_requested: self.control.kill_requested(),
            following: self.cursor.is_none(),
            scroll: self.scroll,
        }
    }

    /// True once the run has reached a terminal state; the runner exits then.
    pub fn run_finished(&self) -> bool {
        read_session(&self.session).finished
    }

    /// Handle one key press.
    pub fn handle_key(&mut self, key: KeyEvent) {
        match (key.code, key.modifiers) {
            // Ctrl+C: kill the running iteration now
            (KeyCode::Char('c'), m) if m.contains(KeyModifiers::CONTROL) => {
                self.control.request_kill();
            }
            // q/Q: stop after the current iteration
            (KeyCode::Char('q') | KeyCode::Char('Q'), _) => {
                self.control.request_stop();
            }
            // r/R: cancel a queued stop
            (KeyCode::Char('r') | KeyCode::Char('R'), _) => {
                self.control.cancel_stop();
            }
            (KeyCode::Left, _) => self.prev_record(),
            (KeyCode::Right, _) => self.next_record(),
            (KeyCode::Up, _) => self.scroll_up(1),
            (KeyCode::Down, _) => self.scroll_down(1),
            (KeyCode::PageUp, _) => self.scroll_up(PAGE_SCROLL),
            (KeyCode::PageDown, _) => self.scroll_down(PAGE_SCROLL),
            _ => {}
        }
    }

    fn viewed_position(&self, record_count: usize) -> usize {
        match self.cursor {
            Some(pos) => pos.min(record_count - 1),
            None => record_count - 1,
        }
    }

    fn prev_record(&mut self) {
        let record_count = read_session(&self.session).records.len();
        if record_count == 0 {
            return;
        }
        let position = self.viewed_position(record_count);
        if position > 0 {
            self.cursor = Some(position - 1);
            self.scroll = 0;
        }
    }

    fn next_record(&mut self) {
        let record_count = read_session(&self.session).records.len();
        if record_count == 0 {
            return;
        }
        match self.cursor {
            None => {}
            Some(pos) if pos + 1 >= record_count - 1 => {
                // Back on the newest record: resume following live output.
                self.cursor = None;
                self.scroll = 0;
            }
            Some(pos) => {
                self.cursor = Some(pos + 1);
                self.scroll = 0;
            }
        }
    }

    fn scroll_up(&mut self, amount: usize) {
        self.scroll = self.scroll.saturating_sub(amount);
    }

    fn scroll_down(&mut self, amount: usize) {
        let content_height = {
            let session = read_session(&self.session);
            let record_count = session.records.len();
            if record_count == 0 {
                0
            } else {
                let position = self.viewed_position(record_count);
                session
                    .records
                    .get(position)
                    .map(|record| record.output.snapshot().lines().count())
                    .unwrap_or(0)
            }
        };
        self.scroll = self.scroll.saturating_add(amount).min(content_height);
    }
}
