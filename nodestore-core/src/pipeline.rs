//! Batched ingestion of a decoded record stream into a [`NodeStore`].
//!
//! The pipeline pulls records one at a time, keeps nodes, and rotates the
//! open batch every [`PipelineConfig::batch_size`] accepted nodes. Once the
//! source is exhausted the last batch is committed, even when empty, and the
//! coordinate index is built.

use std::{
    error::Error as StdError,
    num::NonZeroU64,
    time::{Duration, Instant},
};

use geo::{Coord, Rect};
use log::{info, warn};
use thiserror::Error;

use crate::{NodeBatch, NodeStore, OsmNode, Record, RotateError};

/// Number of accepted nodes committed per transaction unless overridden.
pub const DEFAULT_BATCH_SIZE: NonZeroU64 = match NonZeroU64::new(2_000_000) {
    Some(size) => size,
    None => NonZeroU64::MIN,
};

/// Tuning for [`ingest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Accepted nodes per committed batch.
    pub batch_size: NonZeroU64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl PipelineConfig {
    /// Override the batch size.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: NonZeroU64) -> Self {
        self.batch_size = batch_size;
        self
    }
}

/// Running counters for an ingestion run.
///
/// `nodes` is the progress counter: it grows by exactly one per accepted
/// node and is never reset. Ways and relations are counted separately and
/// never advance it.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IngestSummary {
    /// Nodes written to the store.
    pub nodes: u64,
    /// Ways discarded.
    pub ways: u64,
    /// Relations discarded.
    pub relations: u64,
    /// Transactions committed, including the final one.
    pub commits: u64,
    /// Bounding box of accepted nodes with valid coordinates
    /// (`x = longitude`, `y = latitude`).
    pub bounds: Option<Rect<f64>>,
}

impl IngestSummary {
    fn record_node(&mut self, node: &OsmNode) {
        self.nodes += 1;
        if node.has_valid_coordinates() {
            let location = node.location();
            self.include_bounds(Rect::new(location, location));
        } else {
            warn!(
                "Node {} has out-of-range coordinates (lat={}, lon={})",
                node.id, node.lat, node.lon
            );
        }
    }

    fn include_bounds(&mut self, bounds: Rect<f64>) {
        match &mut self.bounds {
            Some(existing) => {
                let min = Coord {
                    x: existing.min().x.min(bounds.min().x),
                    y: existing.min().y.min(bounds.min().y),
                };
                let max = Coord {
                    x: existing.max().x.max(bounds.max().x),
                    y: existing.max().y.max(bounds.max().y),
                };
                *existing = Rect::new(min, max);
            }
            None => self.bounds = Some(bounds),
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    /// Final counters.
    pub summary: IngestSummary,
    /// Wall-clock time from the first pull to the finished index.
    pub elapsed: Duration,
}

/// Receives progress notifications while a run is under way.
pub trait ProgressObserver {
    /// A batch was committed; `accepted` is the cumulative node count.
    fn batch_committed(&mut self, accepted: u64) {
        let _ = accepted;
    }

    /// The run finished and the index is in place.
    fn finished(&mut self, report: &IngestReport) {
        let _ = report;
    }
}

impl<O: ProgressObserver + ?Sized> ProgressObserver for &mut O {
    fn batch_committed(&mut self, accepted: u64) {
        (**self).batch_committed(accepted);
    }

    fn finished(&mut self, report: &IngestReport) {
        (**self).finished(report);
    }
}

/// Observer that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentObserver;

impl ProgressObserver for SilentObserver {}

/// Failures raised while writing into a batch.
#[derive(Debug, Error)]
pub enum BatchError<S>
where
    S: StdError + 'static,
{
    /// Inserting a node failed, for example on a duplicate identifier.
    #[error("failed to insert node {node_id}")]
    Insert {
        /// Identifier of the rejected node.
        node_id: i64,
        /// Store error.
        #[source]
        source: S,
    },
    /// Committing a full batch failed; its rows were rolled back.
    #[error("failed to commit the batch ending at {accepted} nodes")]
    Rollover {
        /// Nodes accepted when the rollover started.
        accepted: u64,
        /// Store error.
        #[source]
        source: S,
    },
    /// A full batch was committed but its replacement could not be opened.
    #[error("failed to open the next batch after committing {accepted} nodes")]
    Reopen {
        /// Nodes made durable before the failure.
        accepted: u64,
        /// Store error.
        #[source]
        source: S,
    },
    /// Committing the trailing batch failed.
    #[error("failed to commit the final batch after {accepted} nodes")]
    FinalCommit {
        /// Nodes accepted in the whole run.
        accepted: u64,
        /// Store error.
        #[source]
        source: S,
    },
}

/// Errors returned by [`ingest`].
///
/// Every variant is fatal. Batches committed before the failure stay in the
/// store; the open batch is rolled back.
#[derive(Debug, Error)]
pub enum IngestError<D, S>
where
    D: StdError + 'static,
    S: StdError + 'static,
{
    /// The first batch could not be opened.
    #[error("failed to open the initial batch")]
    BeginBatch {
        /// Store error.
        #[source]
        source: S,
    },
    /// The record source failed to decode the next record.
    #[error("failed to decode the source after {accepted} nodes")]
    Decode {
        /// Nodes accepted before the failure.
        accepted: u64,
        /// Decoder error.
        #[source]
        source: D,
    },
    /// Writing or committing a batch failed.
    #[error(transparent)]
    Batch(#[from] BatchError<S>),
    /// Building the coordinate index failed after every batch was committed.
    #[error("failed to create the coordinate index over {accepted} nodes")]
    CreateIndex {
        /// Nodes committed to the store.
        accepted: u64,
        /// Store error.
        #[source]
        source: S,
    },
}

/// Pipeline context: the open batch, the counters, and the observer.
///
/// Each call to [`BatchedIngest::accept`] consumes the context and returns
/// it, so a failed step drops the open batch and rolls it back.
///
/// # Examples
///
/// ```
/// use std::num::NonZeroU64;
/// use nodestore_core::{BatchedIngest, NodeStore, OsmNode, PipelineConfig, Record};
/// use nodestore_core::test_support::{MemoryNodeStore, RecordingObserver};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemoryNodeStore::default();
/// let mut observer = RecordingObserver::default();
/// let config = PipelineConfig::default().with_batch_size(NonZeroU64::new(2).ok_or("zero")?);
/// let mut pipeline = BatchedIngest::new(store.begin_batch()?, &config, &mut observer);
/// for id in 1..=3 {
///     pipeline = pipeline.accept(Record::Node(OsmNode::new(id, 0.0, 0.0)))?;
/// }
/// let summary = pipeline.finish()?;
/// assert_eq!(summary.nodes, 3);
/// assert_eq!(observer.batch_counts(), &[2]);
/// # Ok(())
/// # }
/// ```
pub struct BatchedIngest<'o, B, O: ?Sized> {
    batch: B,
    batch_size: NonZeroU64,
    summary: IngestSummary,
    observer: &'o mut O,
}

impl<'o, B, O> BatchedIngest<'o, B, O>
where
    B: NodeBatch,
    O: ProgressObserver + ?Sized,
{
    /// Start a run on an already opened batch.
    pub fn new(batch: B, config: &PipelineConfig, observer: &'o mut O) -> Self {
        Self {
            batch,
            batch_size: config.batch_size,
            summary: IngestSummary::default(),
            observer,
        }
    }

    /// Counters so far.
    pub const fn summary(&self) -> &IngestSummary {
        &self.summary
    }

    /// Process one record, rotating the batch when it fills up.
    pub fn accept(mut self, record: Record) -> Result<Self, BatchError<B::Error>> {
        let node = match record {
            Record::Node(node) => node,
            Record::Way { .. } => {
                self.summary.ways += 1;
                return Ok(self);
            }
            Record::Relation { .. } => {
                self.summary.relations += 1;
                return Ok(self);
            }
        };

        self.batch
            .insert(&node)
            .map_err(|source| BatchError::Insert {
                node_id: node.id,
                source,
            })?;
        self.summary.record_node(&node);

        if self.summary.nodes.is_multiple_of(self.batch_size.get()) {
            self.rotate()
        } else {
            Ok(self)
        }
    }

    fn rotate(self) -> Result<Self, BatchError<B::Error>> {
        let Self {
            batch,
            batch_size,
            mut summary,
            observer,
        } = self;
        let accepted = summary.nodes;
        let next = batch
            .rotate(|| {
                summary.commits += 1;
                info!("Committed batch {} at {accepted} nodes", summary.commits);
                observer.batch_committed(accepted);
            })
            .map_err(|err| match err {
                RotateError::Commit(source) => BatchError::Rollover { accepted, source },
                RotateError::Reopen(source) => BatchError::Reopen { accepted, source },
            })?;
        Ok(Self {
            batch: next,
            batch_size,
            summary,
            observer,
        })
    }

    /// Commit the trailing batch, even when it holds no rows.
    pub fn finish(self) -> Result<IngestSummary, BatchError<B::Error>> {
        let Self {
            batch, mut summary, ..
        } = self;
        let accepted = summary.nodes;
        batch
            .commit()
            .map_err(|source| BatchError::FinalCommit { accepted, source })?;
        summary.commits += 1;
        Ok(summary)
    }
}

/// Ingest every node from `records` into `store`, then build the index.
///
/// Records are consumed in order. A decode error, insert failure, or commit
/// failure aborts the run; batches committed earlier remain in the store.
///
/// # Examples
///
/// ```
/// use std::convert::Infallible;
/// use nodestore_core::{OsmNode, PipelineConfig, Record, SilentObserver, ingest};
/// use nodestore_core::test_support::MemoryNodeStore;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemoryNodeStore::default();
/// let records = vec![
///     Ok::<_, Infallible>(Record::Node(OsmNode::new(1, 52.5, 13.4))),
///     Ok(Record::Way { id: 10 }),
/// ];
/// let report = ingest(&store, records, &PipelineConfig::default(), &mut SilentObserver)?;
/// assert_eq!(report.summary.nodes, 1);
/// assert!(store.is_indexed());
/// # Ok(())
/// # }
/// ```
pub fn ingest<S, I, D, O>(
    store: &S,
    records: I,
    config: &PipelineConfig,
    observer: &mut O,
) -> Result<IngestReport, IngestError<D, S::Error>>
where
    S: NodeStore,
    I: IntoIterator<Item = Result<Record, D>>,
    D: StdError + 'static,
    O: ProgressObserver + ?Sized,
{
    let started = Instant::now();
    info!(
        "Starting node ingestion with batches of {} nodes",
        config.batch_size
    );
    let batch = store
        .begin_batch()
        .map_err(|source| IngestError::BeginBatch { source })?;

    let mut pipeline = BatchedIngest::new(batch, config, &mut *observer);
    for item in records {
        let record = item.map_err(|source| IngestError::Decode {
            accepted: pipeline.summary().nodes,
            source,
        })?;
        pipeline = pipeline.accept(record)?;
    }
    let summary = pipeline.finish()?;

    info!("Creating coordinate index over {} nodes", summary.nodes);
    store
        .create_coordinate_index()
        .map_err(|source| IngestError::CreateIndex {
            accepted: summary.nodes,
            source,
        })?;

    let report = IngestReport {
        summary,
        elapsed: started.elapsed(),
    };
    info!(
        "Finished processing {} nodes in {:?}",
        report.summary.nodes, report.elapsed
    );
    observer.finished(&report);
    Ok(report)
}
