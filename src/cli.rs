//! CLI argument parsing using clap v4
//!
//! Defines the command-line interface for the offload engine.

use clap::{Parser, Subcommand};

/// Offload Engine - Serverless function execution runtime
///
/// Receives offloaded PY and C functions from device runtimes, executes
/// them locally, and returns armored results over a line-oriented
/// stdin/stdout protocol.
#[derive(Parser, Debug)]
#[command(name = "offload-engine")]
#[command(author, version, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for the engine
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the engine (serves requests on stdin/stdout)
    Run {
        /// Path to configuration file
        #[arg(short, long, env = "OFFLOAD_CONFIG")]
        config: Option<String>,

        /// Override the C interpreter command for this run
        #[arg(long, env = "OFFLOAD_INTERPRETER")]
        interpreter: Option<String>,
    },

    /// Display version and build information
    Version,

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the current configuration
    Show {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        config: Option<String>,
    },
}
