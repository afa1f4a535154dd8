// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `taskyard`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "taskyard",
    version,
    about = "Run a task inside a graph of dependent containers, then clean up after it.",
    long_about = None
)]
pub struct CliArgs {
    /// Name of the task to run.
    #[arg(value_name = "TASK")]
    pub task: String,

    /// Path to the config file (TOML).
    #[arg(long, value_name = "PATH", default_value = "taskyard.toml")]
    pub config: String,

    /// Maximum number of steps to run at the same time.
    ///
    /// Defaults to the number of CPUs available on this machine.
    #[arg(long, value_name = "N")]
    pub max_parallelism: Option<usize>,

    /// Leave created containers in place if the task fails.
    #[arg(long)]
    pub no_cleanup_after_failure: bool,

    /// Leave created containers in place if the task succeeds.
    #[arg(long)]
    pub no_cleanup_after_success: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TASKYARD_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the container graph and planned steps, but
    /// don't talk to the container runtime.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
