// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `devflow`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "devflow",
    version,
    about = "Build front-end assets, serve them locally and rebuild on change.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Devflow.toml` in the current working directory. When that
    /// file does not exist the built-in project layout is used.
    #[arg(long, global = true, value_name = "PATH", default_value = "Devflow.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DEVFLOW_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl CliArgs {
    /// The chosen command; `dev` when none was given.
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Dev)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Build everything, serve the output and rebuild on change.
    Dev,
    /// Run the initial build once and exit.
    Build,
    /// Run one pipeline or composed task once and exit.
    Run {
        /// Pipeline or task name.
        name: String,
    },
    /// Print pipelines, tasks and watch rules without running anything.
    List,
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
