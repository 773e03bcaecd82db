//! Entry point for the `grantryctl` binary.

#![forbid(unsafe_code)]

use std::process::ExitCode;

use clap::Parser;
use grantry_core::AppError;
use grantryctl::{Cli, Commands, CreateCommands};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    let result = match &cli.command {
        Commands::Create(CreateCommands::ExecAccessRequest(args)) => {
            grantryctl::commands::create_exec::execute(args).await
        }
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(error) => {
            report(&error);
            ExitCode::FAILURE
        }
    }
}

fn report(error: &AppError) {
    eprintln!("error: {error}");
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
