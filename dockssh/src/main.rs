//! dockssh - Entry Point
//!
//! Deploys experiment container stacks to a single remote host over ssh.

use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use tracing::{debug, error};

use dockssh::app::options::Cli;
use dockssh::app::run::run;
use dockssh::app::state::AppState;
use dockssh::logs::{init_logging, LogOptions};
use dockssh::storage::layout::StorageLayout;

// Commands run one at a time, so a single thread is all the runtime needs
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let state = match AppState::load(StorageLayout::default()).await {
        Ok(state) => state,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    let log_options = LogOptions {
        log_level: cli
            .log_level
            .clone()
            .unwrap_or_else(|| state.settings.log_level.clone()),
        json_format: cli.json_logs,
        log_dir: state
            .settings
            .log_to_file
            .then(|| state.layout.logs_dir().path().to_path_buf()),
        ..Default::default()
    };
    let _guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };
    debug!("Using storage at {:?}", state.layout.base_dir);

    match run(cli.command, &state).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
