//! Test-only, in-memory `NodeStore` and observer used by unit and behaviour
//! tests.

use std::cell::RefCell;

use thiserror::Error;

use crate::{IngestReport, NodeBatch, NodeStore, OsmNode, ProgressObserver, Record, RotateError};

/// Something that happened to a [`MemoryNodeStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A batch was opened.
    Begin,
    /// A node was inserted into the open batch.
    Insert(i64),
    /// The open batch was committed with `rows` inserts.
    Commit {
        /// Rows made durable by the commit.
        rows: usize,
    },
    /// The open batch was dropped without committing.
    Rollback {
        /// Rows discarded.
        rows: usize,
    },
    /// The coordinate index was built.
    CreateIndex,
}

/// Errors raised by [`MemoryNodeStore`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MemoryStoreError {
    /// The identifier is already present, mirroring a primary-key violation.
    #[error("node {id} already exists")]
    DuplicateId {
        /// Conflicting identifier.
        id: i64,
    },
    /// A failure injected with [`MemoryNodeStore::failing_begin`] or
    /// [`MemoryNodeStore::failing_begin_at`].
    #[error("injected failure on begin {begin}")]
    Begin {
        /// One-based index of the failing begin.
        begin: usize,
    },
    /// A failure injected with [`MemoryNodeStore::failing_commit`].
    #[error("injected failure on commit {commit}")]
    Commit {
        /// One-based index of the failing commit.
        commit: usize,
    },
    /// A failure injected with [`MemoryNodeStore::failing_index`].
    #[error("injected index failure")]
    Index,
}

#[derive(Debug, Default)]
struct MemoryState {
    committed: Vec<OsmNode>,
    events: Vec<StoreEvent>,
    begin_attempts: usize,
    commit_attempts: usize,
    open_batches: usize,
    max_open_batches: usize,
    indexed: bool,
}

/// In-memory `NodeStore` that records every transaction boundary.
///
/// Primary-key uniqueness is enforced at insert time against both committed
/// and pending rows, as SQLite does.
#[derive(Debug, Default)]
pub struct MemoryNodeStore {
    state: RefCell<MemoryState>,
    fail_begin: Option<usize>,
    fail_commit: Option<usize>,
    fail_index: bool,
}

impl MemoryNodeStore {
    /// Make the first `begin_batch` call fail.
    #[must_use]
    pub const fn failing_begin(self) -> Self {
        self.failing_begin_at(1)
    }

    /// Make the `begin`-th `begin_batch` call (one-based) fail.
    #[must_use]
    pub const fn failing_begin_at(mut self, begin: usize) -> Self {
        self.fail_begin = Some(begin);
        self
    }

    /// Make the `commit`-th commit (one-based) fail.
    #[must_use]
    pub const fn failing_commit(mut self, commit: usize) -> Self {
        self.fail_commit = Some(commit);
        self
    }

    /// Make index creation fail.
    #[must_use]
    pub const fn failing_index(mut self) -> Self {
        self.fail_index = true;
        self
    }

    /// Nodes made durable so far, in commit order.
    pub fn committed(&self) -> Vec<OsmNode> {
        self.state.borrow().committed.clone()
    }

    /// Identifiers of the committed nodes, in commit order.
    pub fn committed_ids(&self) -> Vec<i64> {
        self.state
            .borrow()
            .committed
            .iter()
            .map(|node| node.id)
            .collect()
    }

    /// Row counts of each successful commit.
    pub fn commit_sizes(&self) -> Vec<usize> {
        self.state
            .borrow()
            .events
            .iter()
            .filter_map(|event| match event {
                StoreEvent::Commit { rows } => Some(*rows),
                _ => None,
            })
            .collect()
    }

    /// Full event log.
    pub fn events(&self) -> Vec<StoreEvent> {
        self.state.borrow().events.clone()
    }

    /// Batches currently open.
    pub fn open_batches(&self) -> usize {
        self.state.borrow().open_batches
    }

    /// Highest number of simultaneously open batches observed.
    pub fn max_open_batches(&self) -> usize {
        self.state.borrow().max_open_batches
    }

    /// Whether the coordinate index was built.
    pub fn is_indexed(&self) -> bool {
        self.state.borrow().indexed
    }
}

impl NodeStore for MemoryNodeStore {
    type Error = MemoryStoreError;
    type Batch<'a>
        = MemoryBatch<'a>
    where
        Self: 'a;

    fn begin_batch(&self) -> Result<MemoryBatch<'_>, MemoryStoreError> {
        let mut state = self.state.borrow_mut();
        state.begin_attempts += 1;
        if self.fail_begin == Some(state.begin_attempts) {
            return Err(MemoryStoreError::Begin {
                begin: state.begin_attempts,
            });
        }
        state.open_batches += 1;
        state.max_open_batches = state.max_open_batches.max(state.open_batches);
        state.events.push(StoreEvent::Begin);
        Ok(MemoryBatch {
            store: self,
            pending: Vec::new(),
            finished: false,
        })
    }

    fn create_coordinate_index(&self) -> Result<(), MemoryStoreError> {
        if self.fail_index {
            return Err(MemoryStoreError::Index);
        }
        let mut state = self.state.borrow_mut();
        state.indexed = true;
        state.events.push(StoreEvent::CreateIndex);
        Ok(())
    }
}

/// Open batch of a [`MemoryNodeStore`]. Dropping it rolls back.
#[derive(Debug)]
pub struct MemoryBatch<'a> {
    store: &'a MemoryNodeStore,
    pending: Vec<OsmNode>,
    finished: bool,
}

impl MemoryBatch<'_> {
    fn commit_pending(&mut self) -> Result<(), MemoryStoreError> {
        let mut state = self.store.state.borrow_mut();
        state.commit_attempts += 1;
        if self.store.fail_commit == Some(state.commit_attempts) {
            return Err(MemoryStoreError::Commit {
                commit: state.commit_attempts,
            });
        }
        let rows = self.pending.len();
        state.committed.append(&mut self.pending);
        state.events.push(StoreEvent::Commit { rows });
        state.open_batches -= 1;
        self.finished = true;
        Ok(())
    }
}

impl NodeBatch for MemoryBatch<'_> {
    type Error = MemoryStoreError;

    fn insert(&mut self, node: &OsmNode) -> Result<(), MemoryStoreError> {
        let mut state = self.store.state.borrow_mut();
        let taken = state
            .committed
            .iter()
            .chain(&self.pending)
            .any(|existing| existing.id == node.id);
        if taken {
            return Err(MemoryStoreError::DuplicateId { id: node.id });
        }
        state.events.push(StoreEvent::Insert(node.id));
        self.pending.push(node.clone());
        Ok(())
    }

    fn rotate<F>(mut self, committed: F) -> Result<Self, RotateError<MemoryStoreError>>
    where
        F: FnOnce(),
    {
        self.commit_pending().map_err(RotateError::Commit)?;
        let store = self.store;
        drop(self);
        committed();
        store.begin_batch().map_err(RotateError::Reopen)
    }

    fn commit(mut self) -> Result<(), MemoryStoreError> {
        self.commit_pending()
    }
}

impl Drop for MemoryBatch<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let mut state = self.store.state.borrow_mut();
        state.open_batches -= 1;
        state.events.push(StoreEvent::Rollback {
            rows: self.pending.len(),
        });
    }
}

/// Observer that keeps every notification for later assertions.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    batch_counts: Vec<u64>,
    finished: Option<IngestReport>,
}

impl RecordingObserver {
    /// Cumulative counts passed to each `batch_committed` call.
    pub fn batch_counts(&self) -> &[u64] {
        &self.batch_counts
    }

    /// Report passed to `finished`, if the run completed.
    pub const fn finished_report(&self) -> Option<&IngestReport> {
        self.finished.as_ref()
    }
}

impl ProgressObserver for RecordingObserver {
    fn batch_committed(&mut self, accepted: u64) {
        self.batch_counts.push(accepted);
    }

    fn finished(&mut self, report: &IngestReport) {
        self.finished = Some(report.clone());
    }
}

/// Build unlabelled node records at the origin for the given identifiers.
pub fn node_records<I>(ids: I) -> Vec<Record>
where
    I: IntoIterator<Item = i64>,
{
    ids.into_iter()
        .map(|id| Record::Node(OsmNode::new(id, 0.0, 0.0)))
        .collect()
}
