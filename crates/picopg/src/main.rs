//! picopg - a small local PostgreSQL client for the terminal.

mod cli;
mod commands;
mod render;
mod shell;

use std::process::ExitCode;

use clap::Parser;
use picopg_core::logging::{init_logging, LogConfig};
use picopg_core::{AppConfig, PicoError, PicoState};

use cli::Cli;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e.user_message());
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging before PicoState so storage setup is logged.
    let _logging_guard = init_logging(LogConfig::from_app_config(&config));
    tracing::debug!(data_dir = %config.data_dir.display(), "Starting picopg");

    let result = PicoState::with_config(config).and_then(|state| commands::run(&state, cli.command));
    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(category = e.category(), error = %e, "Command failed");
            eprintln!("error: {}", e.user_message());
            ExitCode::FAILURE
        }
    }
}

/// Environment first, then command-line flags on top.
fn load_config(cli: &Cli) -> Result<AppConfig, PicoError> {
    let mut config = AppConfig::from_env()?;
    if let Some(dir) = &cli.data_dir {
        config = config.with_data_dir(dir.clone());
    }
    if let Some(filter) = &cli.log_filter {
        config = config.with_log_filter(filter.clone());
    }
    Ok(config)
}
