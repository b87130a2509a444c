//! Completion detection over agent output.
//!
//! The agent signals a fully finished backlog by emitting a sentinel string.
//! Scanning always covers the whole accumulated buffer, never just the newest
//! chunk, so a marker split across two output chunks is still found.

/// The sentinel the agent emits when it judges the backlog complete.
///
/// This exact text is part of the agent contract; the instructional payload
/// quotes it verbatim.
pub const COMPLETION_MARKER: &str = "<promise>COMPLETE</promise>";

/// True iff the buffer contains the completion marker.
///
/// ASCII case-insensitive; safe to re-invoke on a growing buffer.
pub fn contains_marker(buffer: &str) -> bool {
    buffer.to_ascii_lowercase().contains(&COMPLETION_MARKER.to_ascii_lowercase())
}
