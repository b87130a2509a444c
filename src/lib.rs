//! prdloop - an iteration loop controller for agent-driven backlogs
//!
//! prdloop repeatedly invokes an external coding agent against a PRD task
//! backlog, one fresh-context iteration at a time, until the agent signals
//! completion, the backlog empties, or the operator intervenes.

pub mod agent;
pub mod config;
pub mod controller;
pub mod detect;
pub mod error;
pub mod prompt;
pub mod store;
pub mod tui;

pub use error::{PrdloopError, Result};
