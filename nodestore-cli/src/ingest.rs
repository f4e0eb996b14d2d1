//! Argument layering and execution for an ingestion run.

use std::{
    io::Write,
    num::{NonZeroU64, NonZeroUsize},
};

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use nodestore_core::{IngestReport, LabelProjection, PipelineConfig};
use nodestore_data::{PbfIngestConfig, default_parallelism, ingest_pbf_to_sqlite};
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

use crate::{
    ARG_BATCH_SIZE, ARG_DESTINATION, ARG_LABEL_KEY, ARG_SOURCE, ARG_THREADS, BIN_NAME, CliError,
    DEFAULT_LABEL_KEY, ENV_DESTINATION, ENV_SOURCE, progress::ConsoleProgress,
};

/// Command-line arguments for an ingestion run.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    name = "ingest",
    bin_name = BIN_NAME,
    about = "Load the nodes of an OSM PBF extract into a SQLite store",
    long_about = "Stream every node of an OpenStreetMap PBF extract into a \
                  fresh SQLite database, committing in fixed-size batches and \
                  indexing the coordinates at the end. Paths and tuning can \
                  come from CLI arguments, configuration files, or \
                  environment variables.",
    version
)]
#[ortho_config(prefix = "NODESTORE")]
pub struct IngestArgs {
    /// Path to the OpenStreetMap PBF file.
    #[arg(value_name = "source")]
    #[serde(default)]
    pub source: Option<Utf8PathBuf>,
    /// Path of the SQLite database to create. An existing file is replaced.
    #[arg(value_name = "destination")]
    #[serde(default)]
    pub destination: Option<Utf8PathBuf>,
    /// Nodes committed per transaction.
    #[arg(long = ARG_BATCH_SIZE, value_name = "n")]
    #[serde(default)]
    pub batch_size: Option<NonZeroU64>,
    /// Tag stored in the `label` column. Pass an empty value to store none.
    #[arg(long = ARG_LABEL_KEY, value_name = "key")]
    #[serde(default)]
    pub label_key: Option<String>,
    /// Blobs decoded in parallel.
    #[arg(long = ARG_THREADS, value_name = "n")]
    #[serde(default)]
    pub threads: Option<NonZeroUsize>,
}

impl IngestArgs {
    fn into_config(self) -> Result<IngestConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        IngestConfig::try_from(merged)
    }
}

/// Fully resolved ingestion settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    /// PBF file to read.
    pub source: Utf8PathBuf,
    /// SQLite database to create.
    pub destination: Utf8PathBuf,
    /// Pipeline and decoder settings.
    pub ingest: PbfIngestConfig,
}

impl IngestConfig {
    /// Check that the source names an existing regular file.
    pub fn validate_sources(&self) -> Result<(), CliError> {
        Self::require_existing(&self.source, ARG_SOURCE)
    }

    fn require_existing(path: &Utf8Path, field: &'static str) -> Result<(), CliError> {
        match nodestore_fs::file_is_file(path) {
            Ok(true) => Ok(()),
            Ok(false) => Err(CliError::MissingSourceFile {
                field,
                path: path.to_path_buf(),
            }),
            Err(source) => Err(CliError::InspectSourcePath {
                field,
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

impl TryFrom<IngestArgs> for IngestConfig {
    type Error = CliError;

    fn try_from(args: IngestArgs) -> Result<Self, Self::Error> {
        let source = args.source.ok_or(CliError::MissingArgument {
            field: ARG_SOURCE,
            env: ENV_SOURCE,
        })?;
        let destination = args.destination.ok_or(CliError::MissingArgument {
            field: ARG_DESTINATION,
            env: ENV_DESTINATION,
        })?;

        let label_key = args
            .label_key
            .unwrap_or_else(|| DEFAULT_LABEL_KEY.to_owned());
        let label = if label_key.is_empty() {
            LabelProjection::none()
        } else {
            LabelProjection::from_key(label_key)
        };
        let mut pipeline = PipelineConfig::default();
        if let Some(batch_size) = args.batch_size {
            pipeline = pipeline.with_batch_size(batch_size);
        }
        let ingest = PbfIngestConfig::default()
            .with_pipeline(pipeline)
            .with_label(label)
            .with_parallelism(args.threads.unwrap_or_else(default_parallelism));

        Ok(Self {
            source,
            destination,
            ingest,
        })
    }
}

pub(crate) fn resolve_ingest_config(args: IngestArgs) -> Result<IngestConfig, CliError> {
    let config = args.into_config()?;
    config.validate_sources()?;
    Ok(config)
}

/// Resolve `args`, run the ingestion, and write progress lines to `out`.
pub fn run_ingest(args: IngestArgs, out: &mut dyn Write) -> Result<IngestReport, CliError> {
    let config = resolve_ingest_config(args)?;
    execute_ingest(&config, out)
}

pub(crate) fn execute_ingest(
    config: &IngestConfig,
    out: &mut dyn Write,
) -> Result<IngestReport, CliError> {
    let mut progress = ConsoleProgress::new(out);
    let report = ingest_pbf_to_sqlite(
        &config.source,
        &config.destination,
        &config.ingest,
        &mut progress,
    )?;
    Ok(report)
}

#[cfg(test)]
pub(crate) fn config_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<IngestConfig, CliError> {
    let merged = IngestArgs::merge_from_layers(layers).map_err(CliError::from)?;
    IngestConfig::try_from(merged)
}
