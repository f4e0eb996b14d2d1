//! OSM PBF to SQLite ingestion.
//!
//! [`ingest_pbf_to_sqlite`] wires the decoder adapter ([`PbfRecordSource`]),
//! a fresh [`SqliteNodeStore`], and the batched pipeline from
//! `nodestore-core`.

use std::{num::NonZeroUsize, thread};

use camino::Utf8Path;
use log::info;
use nodestore_core::{
    IngestError, IngestReport, LabelProjection, PipelineConfig, ProgressObserver, ingest,
};
use thiserror::Error;

mod pbf;
mod sqlite;

pub use pbf::{DecodeError, OpenSourceError, PbfRecordSource};
pub use sqlite::{CreateStoreError, NodeStoreError, SqliteBatch, SqliteNodeStore};

/// Settings for [`ingest_pbf_to_sqlite`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PbfIngestConfig {
    /// Batch sizing for the pipeline.
    pub pipeline: PipelineConfig,
    /// Tag projected into the `label` column.
    pub label: LabelProjection,
    /// Blobs decoded concurrently by the adapter.
    pub parallelism: NonZeroUsize,
}

impl Default for PbfIngestConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            label: LabelProjection::none(),
            parallelism: default_parallelism(),
        }
    }
}

impl PbfIngestConfig {
    /// Override the pipeline settings.
    #[must_use]
    pub const fn with_pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Override the label projection.
    #[must_use]
    pub fn with_label(mut self, label: LabelProjection) -> Self {
        self.label = label;
        self
    }

    /// Override decoder parallelism.
    #[must_use]
    pub const fn with_parallelism(mut self, parallelism: NonZeroUsize) -> Self {
        self.parallelism = parallelism;
        self
    }
}

/// Threads available to this process, or one when unknown.
#[must_use]
pub fn default_parallelism() -> NonZeroUsize {
    thread::available_parallelism().unwrap_or(NonZeroUsize::MIN)
}

/// Errors returned by [`ingest_pbf_to_sqlite`].
#[derive(Debug, Error)]
pub enum PbfIngestError {
    /// The source file could not be opened.
    #[error(transparent)]
    OpenSource(#[from] OpenSourceError),
    /// The destination store could not be prepared.
    #[error(transparent)]
    CreateStore(#[from] CreateStoreError),
    /// The run aborted after it started.
    #[error(transparent)]
    Ingest(#[from] IngestError<DecodeError, NodeStoreError>),
}

/// Ingest every node of the PBF file at `source` into a new SQLite store at
/// `destination`.
///
/// The source is opened before the destination is touched, so a missing
/// source leaves any previous store in place.
///
/// # Examples
/// ```no_run
/// use camino::Utf8Path;
/// use nodestore_core::{LabelProjection, SilentObserver};
/// use nodestore_data::{PbfIngestConfig, ingest_pbf_to_sqlite};
///
/// # fn main() -> Result<(), nodestore_data::PbfIngestError> {
/// let config = PbfIngestConfig::default().with_label(LabelProjection::from_key("name"));
/// let report = ingest_pbf_to_sqlite(
///     Utf8Path::new("berlin.osm.pbf"),
///     Utf8Path::new("berlin.db"),
///     &config,
///     &mut SilentObserver,
/// )?;
/// println!("Stored {} nodes", report.summary.nodes);
/// # Ok(())
/// # }
/// ```
pub fn ingest_pbf_to_sqlite<O>(
    source: &Utf8Path,
    destination: &Utf8Path,
    config: &PbfIngestConfig,
    observer: &mut O,
) -> Result<IngestReport, PbfIngestError>
where
    O: ProgressObserver + ?Sized,
{
    let records = PbfRecordSource::open(source)?
        .with_parallelism(config.parallelism)
        .with_label_projection(config.label.clone());
    let store = SqliteNodeStore::create(destination)?;
    info!(
        "Ingesting {source} into {destination} with {} decoder threads",
        config.parallelism
    );
    let report = ingest(&store, records, &config.pipeline, observer)?;
    Ok(report)
}
