//! Records produced by a decoded OSM stream.

use geo::Coord;

/// A single OSM node carried forward into the store.
///
/// Coordinates are WGS84 degrees. `label` holds the value of the projected
/// tag (see [`crate::LabelProjection`]); every other tag is dropped at decode
/// time.
///
/// # Examples
///
/// ```
/// use nodestore_core::OsmNode;
///
/// let node = OsmNode::new(42, 52.52, 13.405).with_label("Alexanderplatz");
/// assert_eq!(node.id, 42);
/// assert_eq!(node.label.as_deref(), Some("Alexanderplatz"));
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OsmNode {
    /// Identifier assigned by the source dataset.
    pub id: i64,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
    /// Projected label, `None` when the tag was absent or no key is projected.
    pub label: Option<String>,
}

impl OsmNode {
    /// Create an unlabelled node.
    #[must_use]
    pub const fn new(id: i64, lat: f64, lon: f64) -> Self {
        Self {
            id,
            lat,
            lon,
            label: None,
        }
    }

    /// Attach a label to the node.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Position as a `geo` coordinate (`x = longitude`, `y = latitude`).
    #[must_use]
    pub const fn location(&self) -> Coord<f64> {
        Coord {
            x: self.lon,
            y: self.lat,
        }
    }

    /// Whether both coordinates are finite and inside the WGS84 ranges.
    #[must_use]
    pub fn has_valid_coordinates(&self) -> bool {
        self.lon.is_finite()
            && self.lat.is_finite()
            && (-180.0..=180.0).contains(&self.lon)
            && (-90.0..=90.0).contains(&self.lat)
    }
}

/// One element of the decoded stream.
///
/// Only [`Record::Node`] is persisted. Ways and relations keep their
/// identifier for diagnostics and are otherwise discarded.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// A coordinate-tagged point.
    Node(OsmNode),
    /// An ordered list of node references (discarded).
    Way {
        /// Identifier of the way.
        id: i64,
    },
    /// A composite of other elements (discarded).
    Relation {
        /// Identifier of the relation.
        id: i64,
    },
}

impl Record {
    /// Identifier of the underlying element, whatever its kind.
    #[must_use]
    pub const fn id(&self) -> i64 {
        match self {
            Self::Node(node) => node.id,
            Self::Way { id } | Self::Relation { id } => *id,
        }
    }
}

impl From<OsmNode> for Record {
    fn from(node: OsmNode) -> Self {
        Self::Node(node)
    }
}
