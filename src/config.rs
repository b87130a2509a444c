//! Configuration for prdloop.
//!
//! YAML config with serde defaults, resolved from (in order): an explicit
//! path, `.prdloop.yml` in the current directory, then
//! `~/.config/prdloop/prdloop.yml`. Missing files fall back to defaults.

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::agent::AgentCommand;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub agent: AgentConfig,
    pub controller: ControllerConfig,
    pub tui: TuiConfig,
}

/// How to invoke the external agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub command: String,
    pub args: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        let AgentCommand { program, args } = AgentCommand::default();
        Self { command: program, args }
    }
}

impl AgentConfig {
    pub fn to_command(&self) -> AgentCommand {
        AgentCommand {
            program: self.command.clone(),
            args: self.args.clone(),
        }
    }
}

/// Loop controller timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// How often a running iteration is polled, in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self { poll_interval_ms: 50 }
    }
}

/// TUI timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TuiConfig {
    /// Render/refresh tick rate, in milliseconds
    pub tick_rate_ms: u64,
}

impl Default for TuiConfig {
    fn default() -> Self {
        Self { tick_rate_ms: 100 }
    }
}

impl Config {
    /// Load configuration from the standard search paths.
    pub fn load(explicit_path: Option<&PathBuf>) -> Result<Config> {
        if let Some(path) = explicit_path {
            return Self::from_file(path);
        }

        let project = PathBuf::from(".prdloop.yml");
        if project.exists() {
            return Self::from_file(&project);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user = config_dir.join("prdloop").join("prdloop.yml");
            if user.exists() {
                return Self::from_file(&user);
            }
        }

        Ok(Config::default())
    }

    fn from_file(path: &Path) -> Result<Config> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_yaml::from_str(&contents).with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}
