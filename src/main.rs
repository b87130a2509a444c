use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

mod cli;

use cli::{Cli, Commands};
use prdloop::agent::ProcessInvoker;
use prdloop::config::Config;
use prdloop::controller::{ControlState, LoopController, RunStatus, Session, SharedSession, read_session};
use prdloop::store::BacklogStore;
use prdloop::tui::{App, EventHandler, TuiRunner, init_terminal, restore_terminal};

fn setup_logging(verbose: bool, configured_level: Option<&str>) -> Result<()> {
    // The TUI owns the terminal, so logs go to a file
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("prdloop")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("prdloop.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let mut builder = env_logger::Builder::from_default_env();
    builder.target(env_logger::Target::Pipe(target));
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    } else if let Some(level) = configured_level {
        builder.parse_filters(level);
    }
    builder.init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

async fn run_loop(config: &Config, prd: PathBuf, max_iterations: Option<u64>, agent: Option<String>) -> Result<()> {
    let store = BacklogStore::new(&prd);

    // Validate the backlog before taking over the terminal.
    let backlog = store
        .load()
        .with_context(|| format!("Failed to load PRD backlog: {}", prd.display()))?;
    let completed = store.load_completed()?.len();

    info!(
        "Loaded backlog '{}' ({} open, {} completed)",
        backlog.name,
        backlog.tasks.len(),
        completed
    );

    let session = Session::new_shared(backlog.name.clone(), backlog.tasks.len(), completed);
    let control = Arc::new(ControlState::new());

    let mut command = config.agent.to_command();
    if let Some(program) = agent {
        command.program = program;
    }
    let invoker = Arc::new(ProcessInvoker::new(command));

    let cwd = std::env::current_dir().context("Failed to resolve working directory")?;

    let controller = LoopController::new(store, invoker, control.clone(), session.clone(), cwd)
        .with_max_iterations(max_iterations)
        .with_poll_interval(Duration::from_millis(config.controller.poll_interval_ms));

    let controller_handle = tokio::spawn(controller.run());

    let terminal = init_terminal()?;
    let app = App::new(control, session.clone());
    let events = EventHandler::new(config.tui.tick_rate_ms);
    let tui_result = TuiRunner::new(terminal, app, events).run().await;
    restore_terminal()?;
    tui_result?;

    let status = controller_handle
        .await
        .context("Loop controller task panicked")??;

    print_summary(&session, status);
    Ok(())
}

/// Post-run summary printed after the terminal is restored.
fn print_summary(session: &SharedSession, status: RunStatus) {
    let session = read_session(session);
    let total = session.completed_tasks + session.remaining_tasks;

    println!();
    println!("{}", "prdloop run summary".cyan().bold());
    println!("  PRD:        {}", session.prd_name);
    println!("  Iterations: {}", session.records.len());
    println!("  Tasks:      {}/{} complete", session.completed_tasks, total);

    let outcome = match status {
        RunStatus::Completed => status.describe().green(),
        RunStatus::CapReached | RunStatus::OperatorStopped => status.describe().yellow(),
        RunStatus::Killed => status.describe().red(),
    };
    println!("  Outcome:    {}", outcome);

    if let Some(record) = session.records.last() {
        let output = record.output.snapshot();
        let tail: Vec<&str> = output.lines().rev().take(10).collect();
        if !tail.is_empty() {
            println!("{}", "  last output:".dimmed());
            for line in tail.iter().rev() {
                println!("    {}", line);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(cli.verbose, config.log_level.as_deref()).context("Failed to setup logging")?;

    match cli.command {
        Commands::Run {
            prd,
            max_iterations,
            agent,
        } => run_loop(&config, prd, max_iterations, agent).await,
    }
}
