//! Entry point for the command-line interface.
#![forbid(unsafe_code)]

use std::process::ExitCode;

use nodestore_cli::CliError;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    setup_logging();
    match nodestore_cli::run() {
        Ok(_) => ExitCode::SUCCESS,
        Err(CliError::ArgumentParsing(err)) => err.exit(),
        Err(CliError::MissingArgument { .. }) => {
            println!("{}", nodestore_cli::usage());
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("{}", nodestore_cli::error_report(&err));
            ExitCode::FAILURE
        }
    }
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
