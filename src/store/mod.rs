//! Task Store: the backlog data model and its on-disk persistence.

mod backlog_store;
mod records;

pub use backlog_store::{BacklogStore, MigrationReport};
pub use records::{Backlog, CompletedTask, Task};
