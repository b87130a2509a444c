//! End-to-end tests of the loop controller against scripted agents.
//!
//! Each test stands up a PRD backlog in a temp directory and drives the
//! controller with a small shell script standing in for the real agent.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use prdloop::agent::{AgentCommand, ProcessInvoker};
use prdloop::controller::{
    ControlState, IterationStatus, LoopController, RunStatus, Session, SharedSession, read_session,
};
use prdloop::error::PrdloopError;
use prdloop::store::BacklogStore;

const OPEN_BACKLOG: &str = r#"{
    "name": "Demo PRD",
    "quality_gates": ["cargo test"],
    "tasks": [
        {
            "category": "feature",
            "description": "Add widget",
            "steps": ["Write code"],
            "passes": false
        }
    ]
}"#;

fn write_prd(dir: &Path, contents: &str) -> BacklogStore {
    let prd_path = dir.join("prd.json");
    fs::write(&prd_path, contents).unwrap();
    BacklogStore::new(prd_path)
}

fn script_invoker(script: &str) -> Arc<ProcessInvoker> {
    Arc::new(ProcessInvoker::new(AgentCommand {
        program: "sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
    }))
}

fn controller(
    dir: &TempDir,
    store: BacklogStore,
    script: &str,
    control: Arc<ControlState>,
    session: SharedSession,
) -> LoopController {
    LoopController::new(store, script_invoker(script), control, session, dir.path())
        .with_poll_interval(Duration::from_millis(10))
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    let mut waited = Duration::ZERO;
    while !condition() && waited < Duration::from_secs(5) {
        tokio::time::sleep(Duration::from_millis(20)).await;
        waited += Duration::from_millis(20);
    }
    assert!(condition(), "condition not reached within 5s");
}

#[tokio::test]
async fn empty_backlog_completes_without_iterating() {
    let dir = TempDir::new().unwrap();
    let store = write_prd(dir.path(), r#"{"name": "Empty", "quality_gates": [], "tasks": []}"#);
    let session = Session::new_shared("Empty", 0, 0);

    let status = controller(&dir, store, "echo unused", Arc::new(ControlState::new()), session.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(status, RunStatus::Completed);
    let guard = read_session(&session);
    assert!(guard.records.is_empty());
    assert!(guard.finished);
}

#[tokio::test]
async fn completion_marker_ends_run_after_one_iteration() {
    let dir = TempDir::new().unwrap();
    let store = write_prd(dir.path(), OPEN_BACKLOG);
    let session = Session::new_shared("Demo PRD", 1, 0);

    let status = controller(
        &dir,
        store,
        "echo done; echo '<promise>COMPLETE</promise>'",
        Arc::new(ControlState::new()),
        session.clone(),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(status, RunStatus::Completed);
    let guard = read_session(&session);
    assert_eq!(guard.records.len(), 1);
    assert!(guard.records[0].saw_marker);
    assert_eq!(guard.records[0].status, IterationStatus::Succeeded);
}

#[tokio::test]
async fn marker_is_case_insensitive() {
    let dir = TempDir::new().unwrap();
    let store = write_prd(dir.path(), OPEN_BACKLOG);
    let session = Session::new_shared("Demo PRD", 1, 0);

    let status = controller(
        &dir,
        store,
        "echo '<Promise>complete</Promise>'",
        Arc::new(ControlState::new()),
        session.clone(),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(status, RunStatus::Completed);
}

#[tokio::test]
async fn iteration_cap_stops_run_with_work_remaining() {
    let dir = TempDir::new().unwrap();
    let store = write_prd(dir.path(), OPEN_BACKLOG);
    let session = Session::new_shared("Demo PRD", 1, 0);

    let status = controller(&dir, store, "echo still working", Arc::new(ControlState::new()), session.clone())
        .with_max_iterations(Some(3))
        .run()
        .await
        .unwrap();

    assert_eq!(status, RunStatus::CapReached);
    let guard = read_session(&session);
    assert_eq!(guard.records.len(), 3);
    assert_eq!(guard.records[2].index, 3);
    for record in &guard.records {
        assert_eq!(record.status, IterationStatus::Succeeded);
        assert!(!record.saw_marker);
    }
}

#[tokio::test]
async fn failed_iteration_is_recoverable() {
    let dir = TempDir::new().unwrap();
    let store = write_prd(dir.path(), OPEN_BACKLOG);
    let session = Session::new_shared("Demo PRD", 1, 0);

    let status = controller(&dir, store, "echo broken; exit 1", Arc::new(ControlState::new()), session.clone())
        .with_max_iterations(Some(2))
        .run()
        .await
        .unwrap();

    // Non-zero agent exits do not abort the run.
    assert_eq!(status, RunStatus::CapReached);
    let guard = read_session(&session);
    assert_eq!(guard.records.len(), 2);
    assert_eq!(guard.records[0].status, IterationStatus::Failed);
}

#[tokio::test]
async fn passing_tasks_migrate_and_exhaust_the_backlog() {
    let dir = TempDir::new().unwrap();
    let store = write_prd(dir.path(), OPEN_BACKLOG);
    let completed_path = store.completed_path();
    let session = Session::new_shared("Demo PRD", 1, 0);

    // The agent marks its task as passing; the controller's migration pass
    // then empties the backlog.
    let done = OPEN_BACKLOG.replace("\"passes\": false", "\"passes\": true");
    fs::write(dir.path().join("prd_done.json"), done).unwrap();

    let status = controller(
        &dir,
        store,
        "cat prd_done.json > prd.json; echo updated",
        Arc::new(ControlState::new()),
        session.clone(),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(status, RunStatus::Completed);
    let guard = read_session(&session);
    assert_eq!(guard.records.len(), 1);
    assert_eq!(guard.remaining_tasks, 0);
    assert_eq!(guard.completed_tasks, 1);
    drop(guard);

    let completed: serde_json::Value = serde_json::from_str(&fs::read_to_string(completed_path).unwrap()).unwrap();
    let entry = &completed.as_array().unwrap()[0];
    assert_eq!(entry["description"], "Add widget");
    let today = chrono::Local::now().date_naive().format("%Y-%m-%d").to_string();
    assert_eq!(entry["completed_at"], today.as_str());
    assert!(entry.get("passes").is_none());
}

#[tokio::test]
async fn stop_before_first_iteration() {
    let dir = TempDir::new().unwrap();
    let store = write_prd(dir.path(), OPEN_BACKLOG);
    let session = Session::new_shared("Demo PRD", 1, 0);
    let control = Arc::new(ControlState::new());
    control.request_stop();

    let status = controller(&dir, store, "echo unused", control, session.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(status, RunStatus::OperatorStopped);
    assert!(read_session(&session).records.is_empty());
}

#[tokio::test]
async fn stop_applies_at_the_next_boundary() {
    let dir = TempDir::new().unwrap();
    let store = write_prd(dir.path(), OPEN_BACKLOG);
    let session = Session::new_shared("Demo PRD", 1, 0);
    let control = Arc::new(ControlState::new());

    let handle = tokio::spawn(
        controller(&dir, store, "sleep 1; echo finished cleanly", control.clone(), session.clone()).run(),
    );

    // Queue the stop while iteration 1 is still running.
    let session_probe = session.clone();
    wait_for(move || !read_session(&session_probe).records.is_empty()).await;
    control.request_stop();

    let status = handle.await.unwrap().unwrap();
    assert_eq!(status, RunStatus::OperatorStopped);

    // The in-flight iteration ran to completion first.
    let guard = read_session(&session);
    assert_eq!(guard.records.len(), 1);
    assert_eq!(guard.records[0].status, IterationStatus::Succeeded);
    assert!(guard.records[0].output.snapshot().contains("finished cleanly"));
}

#[tokio::test]
async fn stop_can_be_cancelled() {
    let dir = TempDir::new().unwrap();
    let store = write_prd(dir.path(), OPEN_BACKLOG);
    let session = Session::new_shared("Demo PRD", 1, 0);
    let control = Arc::new(ControlState::new());
    control.request_stop();
    control.cancel_stop();

    let status = controller(&dir, store, "echo '<promise>COMPLETE</promise>'", control, session.clone())
        .run()
        .await
        .unwrap();

    // The cancelled stop never took effect; the run ended on its own terms.
    assert_eq!(status, RunStatus::Completed);
    assert_eq!(read_session(&session).records.len(), 1);
}

#[tokio::test]
async fn kill_at_a_boundary_ends_run_without_a_new_record() {
    let dir = TempDir::new().unwrap();
    let store = write_prd(dir.path(), OPEN_BACKLOG);
    let session = Session::new_shared("Demo PRD", 1, 0);
    let control = Arc::new(ControlState::new());
    // The kill lands before any iteration is launched.
    control.request_kill();

    let status = controller(&dir, store, "echo unused", control, session.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(status, RunStatus::Killed);
    let guard = read_session(&session);
    assert!(guard.records.is_empty());
    assert_eq!(guard.current_iteration, 0);
    assert!(guard.finished);
}

#[tokio::test]
async fn kill_terminates_the_running_iteration() {
    let dir = TempDir::new().unwrap();
    let store = write_prd(dir.path(), OPEN_BACKLOG);
    let session = Session::new_shared("Demo PRD", 1, 0);
    let control = Arc::new(ControlState::new());

    let handle = tokio::spawn(controller(&dir, store, "echo started; sleep 30", control.clone(), session.clone()).run());

    // Kill once the agent has produced output.
    let session_probe = session.clone();
    wait_for(move || {
        read_session(&session_probe)
            .records
            .first()
            .map(|r| !r.output.is_empty())
            .unwrap_or(false)
    })
    .await;
    control.request_kill();

    let status = handle.await.unwrap().unwrap();
    assert_eq!(status, RunStatus::Killed);

    // Partial output survives on the killed record.
    let guard = read_session(&session);
    assert_eq!(guard.records.len(), 1);
    assert_eq!(guard.records[0].status, IterationStatus::Killed);
    assert!(guard.records[0].output.snapshot().contains("started"));
    assert!(guard.finished);
}

#[tokio::test]
async fn missing_prd_is_fatal() {
    let dir = TempDir::new().unwrap();
    let store = BacklogStore::new(dir.path().join("missing.json"));
    let session = Session::new_shared("none", 0, 0);

    let err = controller(&dir, store, "echo unused", Arc::new(ControlState::new()), session.clone())
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, PrdloopError::PrdNotFound(_)));
    let guard = read_session(&session);
    assert!(guard.finished);
    assert!(guard.status_line.starts_with("Fatal:"));
}

#[tokio::test]
async fn missing_agent_binary_is_fatal() {
    let dir = TempDir::new().unwrap();
    let store = write_prd(dir.path(), OPEN_BACKLOG);
    let session = Session::new_shared("Demo PRD", 1, 0);

    let invoker = Arc::new(ProcessInvoker::new(AgentCommand {
        program: "no-such-agent-binary-4c1d".to_string(),
        args: vec![],
    }));
    let controller = LoopController::new(
        store,
        invoker,
        Arc::new(ControlState::new()),
        session.clone(),
        dir.path(),
    );

    let err = controller.run().await.unwrap_err();
    assert!(matches!(err, PrdloopError::Launch { .. }));
    assert!(read_session(&session).finished);
}

#[tokio::test]
async fn malformed_backlog_mid_run_is_fatal() {
    let dir = TempDir::new().unwrap();
    let store = write_prd(dir.path(), OPEN_BACKLOG);
    let session = Session::new_shared("Demo PRD", 1, 0);

    // The agent corrupts the backlog; the next boundary reload must fail.
    let err = controller(
        &dir,
        store,
        "echo 'not json' > prd.json",
        Arc::new(ControlState::new()),
        session.clone(),
    )
    .run()
    .await
    .unwrap_err();

    assert!(matches!(err, PrdloopError::Parse { .. }));
}
