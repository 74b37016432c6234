//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for ERP Sync using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// ERP Sync - ERP to downstream store sync worker
#[derive(Parser, Debug)]
#[command(name = "erp-sync")]
#[command(version, about, long_about = None)]
#[command(author = "ERP Sync Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "erp-sync.toml", env = "ERPSYNC_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "ERPSYNC_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the sync worker until interrupted
    Run(commands::run::RunArgs),

    /// Run one fetch-and-store pass now
    Trigger(commands::trigger::TriggerArgs),

    /// Show queue depth and failed jobs
    Status(commands::status::StatusArgs),

    /// Return failed jobs to the queue
    RequeueFailed(commands::requeue::RequeueArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}
