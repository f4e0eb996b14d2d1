//! Error types emitted by the nodestore CLI.
//!
//! Keep this error type reasonably small, as many CLI helpers return
//! `Result<_, CliError>`.

use std::sync::Arc;

use camino::Utf8PathBuf;
use nodestore_data::PbfIngestError;
use thiserror::Error;

/// Errors emitted by the nodestore CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required positional argument is missing after configuration merging.
    #[error("missing <{field}> (pass it on the command line or set {env})")]
    MissingArgument {
        /// Name of the missing argument.
        field: &'static str,
        /// Environment variable that can supply it.
        env: &'static str,
    },
    /// A referenced input path does not exist on disk or is not a file.
    #[error("{field} path {path} does not exist or is not a file")]
    MissingSourceFile {
        /// Name of the offending argument.
        field: &'static str,
        /// Path that was checked.
        path: Utf8PathBuf,
    },
    /// A referenced input path could not be inspected due to an IO error.
    #[error("failed to inspect {field} path {path}: {source}")]
    InspectSourcePath {
        /// Name of the offending argument.
        field: &'static str,
        /// Path that was checked.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The ingestion run failed.
    #[error("failed to ingest OSM data")]
    Ingest(#[from] Box<PbfIngestError>),
}

impl From<PbfIngestError> for CliError {
    fn from(err: PbfIngestError) -> Self {
        Self::Ingest(Box::new(err))
    }
}
