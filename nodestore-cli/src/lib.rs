//! Command-line interface for loading OSM nodes into SQLite.
#![forbid(unsafe_code)]

use std::{error::Error, io, iter};

use clap::Parser;
use nodestore_core::IngestReport;

mod error;
mod ingest;
mod progress;

pub use error::CliError;
pub use ingest::{IngestArgs, IngestConfig, run_ingest};
pub use progress::ConsoleProgress;

/// Executable name shown in usage and help output.
pub const BIN_NAME: &str = "nodestore";
/// Tag projected into the `label` column unless overridden.
pub const DEFAULT_LABEL_KEY: &str = "name";

const ARG_SOURCE: &str = "source";
const ARG_DESTINATION: &str = "destination";
const ARG_BATCH_SIZE: &str = "batch-size";
const ARG_LABEL_KEY: &str = "label-key";
const ARG_THREADS: &str = "threads";
const ENV_SOURCE: &str = "NODESTORE_CMDS_INGEST_SOURCE";
const ENV_DESTINATION: &str = "NODESTORE_CMDS_INGEST_DESTINATION";

/// One-line usage shown when a required argument is missing.
#[must_use]
pub fn usage() -> String {
    format!("Usage: {BIN_NAME} <{ARG_SOURCE}> <{ARG_DESTINATION}>")
}

/// Render `err` and its source chain, one cause per line.
#[must_use]
pub fn error_report(err: &dyn Error) -> String {
    let mut report = format!("{BIN_NAME}: {err}");
    for cause in iter::successors(err.source(), |cause| Error::source(*cause)) {
        report.push_str("\n  caused by: ");
        report.push_str(&cause.to_string());
    }
    report
}

/// Run the CLI with the current process arguments and environment, writing
/// progress lines to standard output.
pub fn run() -> Result<IngestReport, CliError> {
    let args = IngestArgs::try_parse().map_err(CliError::ArgumentParsing)?;
    let mut stdout = io::stdout().lock();
    run_ingest(args, &mut stdout)
}

#[cfg(test)]
mod tests;
