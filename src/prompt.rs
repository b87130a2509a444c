//! Instructional payload for one agent iteration.
//!
//! The payload is the same every iteration: it points the agent at the
//! backlog and progress files and spells out the numbered operating
//! instructions. The completion marker quoted at the end is load-bearing;
//! [`crate::detect`] recognizes exactly that text.

use std::path::Path;

use crate::detect::COMPLETION_MARKER;

/// Build the payload handed to the agent process as its prompt argument.
pub fn build_payload(prd_path: &Path, progress_path: &Path) -> String {
    format!(
        r#"You are working through the task backlog in {prd}.
Your working notes live in {progress}.

1. Read the backlog and pick the single highest-priority open task. Priority
   is your judgement, not list order. Work only on that task.
2. Run the repo's quality gates (the `quality_gates` commands in the backlog,
   or the project-native format/lint/build/test commands). Note any gate that
   is missing.
3. Update the backlog file with the work that was done, setting `passes` to
   true on the task once its acceptance steps and the quality gates pass.
4. Move completed tasks: for every task in {prd} with `passes` set to true,
   move it to the sibling completed.json. Add a `completed_at` field with
   today's date (YYYY-MM-DD) and remove the `passes` field, keeping only
   category, description, steps, and completed_at. Skip tasks already present
   in completed.json.
5. Append a short note about this iteration to {progress} for the next person
   working in the code base.
6. Make a git commit of that single piece of work.

Work on one task only. If and only if the backlog is fully complete, output
{marker}"#,
        prd = prd_path.display(),
        progress = progress_path.display(),
        marker = COMPLETION_MARKER,
    )
}
