//! Data adapters for the nodestore ingestion pipeline.
//!
//! Responsibilities:
//! - Decode OSM PBF files into the ordered record stream.
//! - Persist nodes to a fresh SQLite store in bounded transactions.
//! - Offer a single call that runs a whole ingestion.
//!
//! Boundaries:
//! - Do not encode batching rules (live in `nodestore-core`).
//! - Do not print to the terminal; progress flows through observers and logs.
//!
//! Invariants:
//! - Records are yielded in source order regardless of decoder parallelism.
//! - No global mutable state.
#![forbid(unsafe_code)]

pub mod ingest;

pub use ingest::{
    CreateStoreError, DecodeError, NodeStoreError, OpenSourceError, PbfIngestConfig,
    PbfIngestError, PbfRecordSource, SqliteBatch, SqliteNodeStore, default_parallelism,
    ingest_pbf_to_sqlite,
};
