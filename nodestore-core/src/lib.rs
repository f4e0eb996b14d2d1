//! Core domain types for the nodestore ingestion pipeline.
//!
//! Responsibilities:
//! - Model the decoded record stream ([`Record`], [`OsmNode`]).
//! - Define the batch and store seams ([`NodeBatch`], [`NodeStore`]).
//! - Drive batched ingestion with count-exact rollover ([`ingest`]).
//!
//! Boundaries:
//! - No PBF decoding here (lives in `nodestore-data`).
//! - No process or terminal concerns (live in `nodestore-cli`).
//!
//! Invariants:
//! - A batch never holds more than [`PipelineConfig::batch_size`] nodes.
//! - At most one batch transaction is open at any time.
//! - No global mutable state; counters live in the pipeline context.
#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod label;
pub mod pipeline;
pub mod record;
pub mod store;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use label::LabelProjection;
pub use pipeline::{
    BatchError, BatchedIngest, DEFAULT_BATCH_SIZE, IngestError, IngestReport, IngestSummary,
    PipelineConfig, ProgressObserver, SilentObserver, ingest,
};
pub use record::{OsmNode, Record};
pub use store::{COORDINATE_INDEX_NAME, NODES_TABLE, NodeBatch, NodeStore, RotateError};

#[cfg(feature = "store-sqlite")]
pub use store::{SqliteNodeIndex, SqliteNodeIndexError};
