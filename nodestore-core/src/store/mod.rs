//! Storage seams for batched node ingestion.
//!
//! A [`NodeStore`] hands out one [`NodeBatch`] at a time. The batch owns an
//! open transaction and a prepared insert; [`NodeBatch::rotate`] commits it,
//! runs the caller's commit hook, and opens the next one in a single step so
//! callers never hold two open transactions.

use thiserror::Error;

use crate::OsmNode;

#[cfg(feature = "store-sqlite")]
mod sqlite;

#[cfg(feature = "store-sqlite")]
pub use sqlite::{SqliteNodeIndex, SqliteNodeIndexError};

/// Name of the table holding ingested nodes.
pub const NODES_TABLE: &str = "nodes";

/// Name of the composite `(lat, lon)` index built after ingestion.
pub const COORDINATE_INDEX_NAME: &str = "idx_nodes_lat_lon";

/// An open, uncommitted unit of work accumulating node inserts.
///
/// Dropping a batch without calling [`NodeBatch::commit`] or
/// [`NodeBatch::rotate`] discards its inserts.
pub trait NodeBatch: Sized {
    /// Error reported by the backing store.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Insert one node row into the batch.
    fn insert(&mut self, node: &OsmNode) -> Result<(), Self::Error>;

    /// Commit this batch, call `committed`, then open a fresh batch bound to
    /// the same store.
    ///
    /// The current transaction is finished before the next one begins, and
    /// `committed` runs only once the commit is durable.
    fn rotate<F>(self, committed: F) -> Result<Self, RotateError<Self::Error>>
    where
        F: FnOnce();

    /// Commit this batch, leaving no transaction open.
    fn commit(self) -> Result<(), Self::Error>;
}

/// Phase of a [`NodeBatch::rotate`] that failed.
#[derive(Debug, Error)]
pub enum RotateError<E>
where
    E: std::error::Error + 'static,
{
    /// The full batch could not be committed; its rows were rolled back.
    #[error("failed to commit the full batch")]
    Commit(#[source] E),
    /// The full batch was committed but the next one could not be opened.
    #[error("failed to open the next batch")]
    Reopen(#[source] E),
}

/// Destination store for ingested nodes.
///
/// # Examples
///
/// ```
/// use nodestore_core::{NodeBatch, NodeStore, OsmNode};
/// use nodestore_core::test_support::MemoryNodeStore;
///
/// # fn main() -> Result<(), nodestore_core::test_support::MemoryStoreError> {
/// let store = MemoryNodeStore::default();
/// let mut batch = store.begin_batch()?;
/// batch.insert(&OsmNode::new(1, 52.5, 13.4))?;
/// batch.commit()?;
/// store.create_coordinate_index()?;
/// assert_eq!(store.committed_ids(), vec![1]);
/// # Ok(())
/// # }
/// ```
pub trait NodeStore {
    /// Error reported by the store and its batches.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Batch type borrowing the store.
    type Batch<'a>: NodeBatch<Error = Self::Error>
    where
        Self: 'a;

    /// Open a transaction and prepare the node insert.
    fn begin_batch(&self) -> Result<Self::Batch<'_>, Self::Error>;

    /// Build the composite coordinate index over every committed node.
    fn create_coordinate_index(&self) -> Result<(), Self::Error>;
}
