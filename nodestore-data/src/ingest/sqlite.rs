//! SQLite node store written by the batched ingestion pipeline.

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info};
use nodestore_core::{NodeBatch, NodeStore, OsmNode, RotateError};
use rusqlite::{Connection, Error as SqliteError, Statement, Transaction, TransactionBehavior};
use thiserror::Error;

const CREATE_NODES_TABLE: &str = "CREATE TABLE nodes (
    id INTEGER PRIMARY KEY,
    lat REAL,
    lon REAL,
    label TEXT
)";

const INSERT_NODE: &str = "INSERT INTO nodes (id, lat, lon, label) VALUES (?1, ?2, ?3, ?4)";

const CREATE_COORDINATE_INDEX: &str = "CREATE INDEX idx_nodes_lat_lon ON nodes(lat, lon)";

/// Errors raised while preparing a fresh node store on disk.
#[derive(Debug, Error)]
pub enum CreateStoreError {
    /// A file left by a previous run could not be removed.
    #[error("failed to remove existing store at {path}")]
    RemoveExisting {
        /// Destination database path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Failed to create the parent directory for the database.
    #[error("failed to create parent directory for {path}")]
    CreateDirectory {
        /// Destination database path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Opening the SQLite database failed.
    #[error("failed to open SQLite database at {path}")]
    Open {
        /// Destination database path.
        path: Utf8PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
    /// Creating the `nodes` table failed.
    #[error("failed to create nodes table in {path}")]
    CreateSchema {
        /// Destination database path.
        path: Utf8PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
}

/// Errors raised while writing batches or building the index.
#[derive(Debug, Error)]
pub enum NodeStoreError {
    /// A SQLite call failed.
    #[error("failed to {operation}")]
    Sqlite {
        /// Short description of the failed step.
        operation: &'static str,
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
}

impl NodeStoreError {
    fn sqlite(operation: &'static str) -> impl FnOnce(SqliteError) -> Self {
        move |source| Self::Sqlite { operation, source }
    }
}

/// Freshly created SQLite database holding the `nodes` table.
#[derive(Debug)]
pub struct SqliteNodeStore {
    connection: Connection,
    path: Utf8PathBuf,
}

impl SqliteNodeStore {
    /// Create an empty store at `path`.
    ///
    /// Any file already at `path` is deleted first and missing parent
    /// directories are created.
    pub fn create(path: &Utf8Path) -> Result<Self, CreateStoreError> {
        let removed = nodestore_fs::remove_file_if_exists(path).map_err(|source| {
            CreateStoreError::RemoveExisting {
                path: path.to_path_buf(),
                source,
            }
        })?;
        if removed {
            info!("Removed existing store at {path}");
        }
        nodestore_fs::ensure_parent_dir(path).map_err(|source| {
            CreateStoreError::CreateDirectory {
                path: path.to_path_buf(),
                source,
            }
        })?;

        let connection =
            Connection::open(path.as_std_path()).map_err(|source| CreateStoreError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        connection
            .execute(CREATE_NODES_TABLE, [])
            .map_err(|source| CreateStoreError::CreateSchema {
                path: path.to_path_buf(),
                source,
            })?;
        debug!("Created nodes table in {path}");

        Ok(Self {
            connection,
            path: path.to_path_buf(),
        })
    }

    /// Location of the database file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl NodeStore for SqliteNodeStore {
    type Error = NodeStoreError;
    type Batch<'a>
        = SqliteBatch<'a>
    where
        Self: 'a;

    fn begin_batch(&self) -> Result<SqliteBatch<'_>, NodeStoreError> {
        SqliteBatch::begin(&self.connection)
    }

    fn create_coordinate_index(&self) -> Result<(), NodeStoreError> {
        self.connection
            .execute(CREATE_COORDINATE_INDEX, [])
            .map(|_| ())
            .map_err(NodeStoreError::sqlite("create coordinate index"))
    }
}

/// One open transaction with its prepared insert statement.
///
/// Dropping the batch without committing rolls the transaction back.
pub struct SqliteBatch<'conn> {
    // Field order: the statement must drop before the transaction.
    insert: Statement<'conn>,
    transaction: Transaction<'conn>,
    connection: &'conn Connection,
}

impl std::fmt::Debug for SqliteBatch<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBatch").finish_non_exhaustive()
    }
}

impl<'conn> SqliteBatch<'conn> {
    fn begin(connection: &'conn Connection) -> Result<Self, NodeStoreError> {
        let transaction = Transaction::new_unchecked(connection, TransactionBehavior::Deferred)
            .map_err(NodeStoreError::sqlite("begin batch transaction"))?;
        let insert = connection
            .prepare(INSERT_NODE)
            .map_err(NodeStoreError::sqlite("prepare node insert"))?;
        Ok(Self {
            insert,
            transaction,
            connection,
        })
    }
}

impl NodeBatch for SqliteBatch<'_> {
    type Error = NodeStoreError;

    fn insert(&mut self, node: &OsmNode) -> Result<(), NodeStoreError> {
        self.insert
            .execute((node.id, node.lat, node.lon, node.label.as_deref()))
            .map(|_| ())
            .map_err(NodeStoreError::sqlite("insert node"))
    }

    fn rotate<F>(self, committed: F) -> Result<Self, RotateError<NodeStoreError>>
    where
        F: FnOnce(),
    {
        let connection = self.connection;
        self.commit().map_err(RotateError::Commit)?;
        committed();
        Self::begin(connection).map_err(RotateError::Reopen)
    }

    fn commit(self) -> Result<(), NodeStoreError> {
        let Self {
            insert,
            transaction,
            ..
        } = self;
        insert
            .finalize()
            .map_err(NodeStoreError::sqlite("finalize node insert"))?;
        transaction
            .commit()
            .map_err(NodeStoreError::sqlite("commit batch transaction"))
    }
}
