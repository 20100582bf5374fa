// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod graph;
pub mod logging;
pub mod orchestrate;
pub mod pipeline;
pub mod server;
pub mod types;
pub mod watch;

use std::path::PathBuf;

use anyhow::Result;
use tracing::debug;

use crate::cli::{CliArgs, Command};
use crate::orchestrate::Project;

/// High-level entry point used by `main.rs`.
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let project = Project::load(&config_path)?;
    debug!(tasks = project.tasks.len(), "project loaded");

    match args.command() {
        Command::Dev => project.dev().await?,
        Command::Build => {
            project.initial_build().await?;
        }
        Command::Run { name } => {
            project.run_once(&name).await?;
        }
        Command::List => print!("{}", project.describe()),
    }
    Ok(())
}
