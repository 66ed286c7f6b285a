//! Odyn server binary.

use std::process::ExitCode;

use clap::Parser;
use odyn_server::{Args, Outcome, log_settings, run};
use tracing::{error, info};

/// Exit status for a check that ran and denied.
const EXIT_DENIED: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match args.resolve_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("odyn-server: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let telemetry = match odyn_telemetry::init(log_settings(&config)) {
        Ok(telemetry) => telemetry,
        Err(e) => {
            eprintln!("odyn-server: {e}");
            return ExitCode::FAILURE;
        }
    };

    let engine = config.storage.build_engine();
    info!(
        engine = engine.name(),
        root = %config.storage.root.display(),
        command = ?args.command,
        "starting"
    );

    let code = match run(&args.command, engine, &mut std::io::stdout()).await {
        Ok(Outcome::Success) => ExitCode::SUCCESS,
        Ok(Outcome::Denied) => ExitCode::from(EXIT_DENIED),
        Err(e) => {
            error!(error = %format!("{e:#}"), "command failed");
            eprintln!("odyn-server: {e:#}");
            ExitCode::FAILURE
        }
    };

    telemetry.shutdown();
    code
}
