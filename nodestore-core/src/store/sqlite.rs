//! Read-only access to a finished SQLite node store.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use geo::Rect;
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, params};
use thiserror::Error;

use crate::OsmNode;

use super::COORDINATE_INDEX_NAME;

const SELECT_IN_BBOX: &str = "SELECT id, lat, lon, label FROM nodes
    WHERE lat BETWEEN ?1 AND ?2 AND lon BETWEEN ?3 AND ?4
    ORDER BY lat, lon, id";

const SELECT_IN_BBOX_PAGE: &str = "SELECT id, lat, lon, label FROM nodes
    WHERE lat BETWEEN ?1 AND ?2 AND lon BETWEEN ?3 AND ?4
    ORDER BY lat, lon, id
    LIMIT ?5 OFFSET ?6";

/// Error raised when reading a persisted node store.
#[derive(Debug, Error)]
pub enum SqliteNodeIndexError {
    /// Opening the SQLite database failed.
    #[error("failed to open SQLite database at {path}: {source}")]
    OpenDatabase {
        /// Location of the SQLite database on disk.
        path: PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// A read query failed.
    #[error("failed to {operation}: {source}")]
    Query {
        /// Short description of the failed read.
        operation: &'static str,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
}

/// Read-only view over the `nodes` table answering bounding-box queries.
///
/// Bounding boxes use WGS84 with `x = longitude` and `y = latitude`.
/// Boundary points are included. Regions crossing the antimeridian must be
/// split by the caller.
pub struct SqliteNodeIndex {
    connection: Connection,
    path: PathBuf,
}

impl fmt::Debug for SqliteNodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteNodeIndex")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteNodeIndex {
    /// Open an existing node store without write access.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SqliteNodeIndexError> {
        let path = path.as_ref();
        let connection = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|source| SqliteNodeIndexError::OpenDatabase {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            connection,
            path: path.to_path_buf(),
        })
    }

    /// Location of the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of stored nodes.
    pub fn len(&self) -> Result<u64, SqliteNodeIndexError> {
        self.connection
            .query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))
            .map_err(|source| SqliteNodeIndexError::Query {
                operation: "count nodes",
                source,
            })
    }

    /// Whether the store holds no nodes.
    pub fn is_empty(&self) -> Result<bool, SqliteNodeIndexError> {
        self.len().map(|count| count == 0)
    }

    /// Whether the composite coordinate index exists.
    pub fn has_coordinate_index(&self) -> Result<bool, SqliteNodeIndexError> {
        self.connection
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'index' AND name = ?1",
                [COORDINATE_INDEX_NAME],
                |_| Ok(()),
            )
            .optional()
            .map(|found| found.is_some())
            .map_err(|source| SqliteNodeIndexError::Query {
                operation: "look up coordinate index",
                source,
            })
    }

    /// Return every node inside `bbox`, ordered by latitude then longitude.
    pub fn nodes_in_bbox(&self, bbox: &Rect<f64>) -> Result<Vec<OsmNode>, SqliteNodeIndexError> {
        let (min, max) = (bbox.min(), bbox.max());
        let mut statement = self
            .connection
            .prepare_cached(SELECT_IN_BBOX)
            .map_err(|source| SqliteNodeIndexError::Query {
                operation: "prepare bbox query",
                source,
            })?;
        let rows = statement
            .query_map(params![min.y, max.y, min.x, max.x], node_from_row)
            .map_err(|source| SqliteNodeIndexError::Query {
                operation: "run bbox query",
                source,
            })?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|source| SqliteNodeIndexError::Query {
                operation: "read bbox rows",
                source,
            })
    }

    /// Return one page of the nodes inside `bbox`.
    ///
    /// Pages follow the same ordering as [`Self::nodes_in_bbox`], so walking
    /// `offset` in steps of `limit` visits every node exactly once.
    pub fn nodes_in_bbox_page(
        &self,
        bbox: &Rect<f64>,
        limit: u32,
        offset: u64,
    ) -> Result<Vec<OsmNode>, SqliteNodeIndexError> {
        let (min, max) = (bbox.min(), bbox.max());
        let mut statement = self
            .connection
            .prepare_cached(SELECT_IN_BBOX_PAGE)
            .map_err(|source| SqliteNodeIndexError::Query {
                operation: "prepare paginated bbox query",
                source,
            })?;
        let rows = statement
            .query_map(
                params![min.y, max.y, min.x, max.x, limit, offset],
                node_from_row,
            )
            .map_err(|source| SqliteNodeIndexError::Query {
                operation: "run paginated bbox query",
                source,
            })?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|source| SqliteNodeIndexError::Query {
                operation: "read paginated bbox rows",
                source,
            })
    }
}

fn node_from_row(row: &Row<'_>) -> rusqlite::Result<OsmNode> {
    Ok(OsmNode {
        id: row.get(0)?,
        lat: row.get(1)?,
        lon: row.get(2)?,
        label: row.get(3)?,
    })
}
