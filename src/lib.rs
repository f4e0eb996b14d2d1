//! Facade crate for the nodestore OSM ingestion toolkit.
//!
//! This crate re-exports the core pipeline types and exposes the SQLite store
//! and PBF ingestion adapters behind feature flags.

#![forbid(unsafe_code)]

pub use nodestore_core::{
    BatchError, BatchedIngest, DEFAULT_BATCH_SIZE, IngestError, IngestReport, IngestSummary,
    LabelProjection, NodeBatch, NodeStore, OsmNode, PipelineConfig, ProgressObserver, Record,
    RotateError, SilentObserver, ingest,
};

#[cfg(feature = "store-sqlite")]
pub use nodestore_core::{SqliteNodeIndex, SqliteNodeIndexError};

#[cfg(feature = "ingest-pbf")]
pub use nodestore_data::{
    PbfIngestConfig, PbfIngestError, PbfRecordSource, SqliteNodeStore, ingest_pbf_to_sqlite,
};
