//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};

use super::commands::check_config::CheckConfigArgs;
use super::commands::run::RunArgs;

#[derive(Parser, Debug)]
#[command(name = "tribunal")]
#[command(
    about = "Tribunal - fan a task out to several models, execute, judge and synthesize",
    long_about = None
)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full pipeline for one task
    Run(RunArgs),

    /// Load and validate configuration without running anything
    CheckConfig(CheckConfigArgs),
}
