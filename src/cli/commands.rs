//! CLI argument definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Drive a coding agent through a PRD backlog, one task per iteration.
#[derive(Parser, Debug)]
#[command(name = "prdloop", version, about)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the iteration loop against a PRD backlog
    Run {
        /// Path to the PRD backlog file
        #[arg(default_value = "plans/prd.json")]
        prd: PathBuf,

        /// Stop after this many iterations
        #[arg(short = 'n', long)]
        max_iterations: Option<u64>,

        /// Agent program to invoke (overrides config)
        #[arg(long)]
        agent: Option<String>,
    },
}
