//! Offload Engine - Serverless function execution runtime
//!
//! This is the main entry point for the offload engine binary.
//! The engine reads request envelopes from device runtimes on stdin,
//! executes the offloaded PY and C functions locally, and writes reply
//! lines to stdout.

mod cli;
mod codec;
mod config;
mod engine;
mod error;
mod executor;
mod ingress;
mod logging;
mod manager;
mod metrics;
mod types;
mod version;

use std::sync::Arc;

use clap::Parser;
use tracing::info;

use crate::cli::{Cli, Commands};
use crate::config::Config;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::logging::LogGuards;

fn main() -> Result<()> {
    // Parse CLI arguments first (before logging, so we know verbosity)
    let cli = Cli::parse();

    // For commands that don't need full logging, use simple setup
    match &cli.command {
        Commands::Version => {
            version::print_version();
            return Ok(());
        }
        Commands::Config { subcommand } => {
            // Config commands use minimal logging
            logging::init_simple(tracing::Level::WARN)?;
            return handle_config_command(subcommand.clone());
        }
        _ => {}
    }

    let (config_path, interpreter_override) = match &cli.command {
        Commands::Run {
            config,
            interpreter,
        } => (config.clone(), interpreter.clone()),
        _ => (None, None),
    };

    // Load config (or use defaults)
    let mut config = match Config::load(config_path.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            // Use formatted error for terminal
            eprint!("{}", e.format_for_terminal());
            std::process::exit(e.exit_code());
        }
    };
    if let Some(command) = interpreter_override {
        config.interpreter.command = command;
    }

    // Initialize logging with config settings
    // The guards must be kept alive for the lifetime of the program
    let _log_guards = init_logging_from_config(&config, cli.verbose, cli.quiet)?;

    // Log version info at startup
    let build = version::build_info();
    info!(
        version = %build.full_version(),
        target = %build.target,
        profile = %build.profile,
        "Starting offload engine"
    );

    match cli.command {
        Commands::Run { .. } => {
            run_engine(config)?;
        }
        Commands::Version | Commands::Config { .. } => {
            // Already handled above
            unreachable!();
        }
    }

    Ok(())
}

/// Initialize logging from configuration
fn init_logging_from_config(config: &Config, verbose: u8, quiet: bool) -> Result<LogGuards> {
    logging::init_logging(&config.logging, verbose, quiet)
}

/// Run the engine in normal operation mode
fn run_engine(config: Config) -> Result<()> {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    info!(
        host = %host,
        interpreter = %config.interpreter.command,
        max_concurrent_tasks = config.engine.effective_concurrency(),
        max_finished_tasks = config.engine.max_finished_tasks,
        "Configuration loaded"
    );

    // Build and run the tokio runtime
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(num_cpus::get().min(8))
        .thread_name("offload-engine")
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create async runtime: {}", e)))?;

    runtime.block_on(async_engine_main(config))
}

/// Async engine main loop
///
/// Serves the stdin/stdout protocol until EOF or Ctrl+C.
async fn async_engine_main(config: Config) -> Result<()> {
    let engine = Arc::new(Engine::new(&config));

    info!("Engine serving on stdin/stdout");

    tokio::select! {
        result = ingress::run(engine.clone()) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    // Graceful shutdown
    let snapshot = engine.metrics();
    info!(
        executed = snapshot.counters.executed,
        succeeded = snapshot.counters.succeeded,
        failed = snapshot.counters.failed,
        "Engine shutting down"
    );

    Ok(())
}

/// Handle configuration subcommands
fn handle_config_command(subcommand: cli::ConfigSubcommand) -> Result<()> {
    use cli::ConfigSubcommand;

    match subcommand {
        ConfigSubcommand::Show { config } => {
            let cfg = Config::load(config.as_deref())?;
            println!("{}", toml::to_string_pretty(&cfg)?);
        }
        ConfigSubcommand::Init { path, force } => {
            config::init_config(path.as_deref(), force)?;
        }
        ConfigSubcommand::Validate { config } => {
            let path = config.as_deref();
            match Config::load(path) {
                Ok(_) => {
                    println!("Configuration is valid.");
                }
                Err(e) => {
                    eprint!("{}", e.format_for_terminal());
                    std::process::exit(e.exit_code());
                }
            }
        }
    }

    Ok(())
}
