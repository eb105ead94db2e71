//! OpenStreetMap features as seen by the synchronisation core.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use geo::Geometry;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// OpenStreetMap-style tags, ordered by key.
pub type Tags = BTreeMap<String, String>;

/// Raw OSM element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    /// A point.
    Node,
    /// An ordered list of nodes, open or closed.
    Way,
    /// A group of members with roles.
    Relation,
}

impl ElementKind {
    /// Lower-case name used by the OSM API and by `osmium export`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Way => "way",
            Self::Relation => "relation",
        }
    }

    const fn prefix(self) -> char {
        match self {
            Self::Node => 'n',
            Self::Way => 'w',
            Self::Relation => 'r',
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when an element kind or reference cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognised OSM element reference `{input}`")]
pub struct ParseElementError {
    /// Text that failed to parse.
    pub input: String,
}

impl FromStr for ElementKind {
    type Err = ParseElementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "node" | "n" => Ok(Self::Node),
            "way" | "w" => Ok(Self::Way),
            "relation" | "r" => Ok(Self::Relation),
            other => Err(ParseElementError {
                input: other.to_owned(),
            }),
        }
    }
}

/// Identity of a feature: its element type plus integer id.
///
/// Server-assigned ids are positive. Features created locally and not yet
/// uploaded carry negative ids, so they can never collide with server data.
///
/// # Examples
/// ```
/// use osm_sync_core::{ElementKind, ElementRef};
///
/// let created = ElementRef::node(-1);
/// assert!(created.is_local());
/// assert_eq!(created.kind, ElementKind::Node);
/// assert_eq!("w42".parse::<ElementRef>(), Ok(ElementRef::way(42)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ElementRef {
    /// Element type; each type has its own id space.
    pub kind: ElementKind,
    /// Positive for server ids, negative for local creations.
    pub id: i64,
}

impl ElementRef {
    /// Build a reference from its parts.
    #[must_use]
    pub const fn new(kind: ElementKind, id: i64) -> Self {
        Self { kind, id }
    }

    /// Reference to node `id`.
    #[must_use]
    pub const fn node(id: i64) -> Self {
        Self::new(ElementKind::Node, id)
    }

    /// Reference to way `id`.
    #[must_use]
    pub const fn way(id: i64) -> Self {
        Self::new(ElementKind::Way, id)
    }

    /// Reference to relation `id`.
    #[must_use]
    pub const fn relation(id: i64) -> Self {
        Self::new(ElementKind::Relation, id)
    }

    /// Whether the id was assigned locally (never existed on the server).
    #[must_use]
    pub const fn is_local(self) -> bool {
        self.id < 0
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.prefix(), self.id)
    }
}

impl FromStr for ElementRef {
    type Err = ParseElementError;

    /// Parse the compact `n123`/`w-4`/`r7` notation.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let error = || ParseElementError {
            input: s.to_owned(),
        };
        let mut chars = s.chars();
        let kind = chars
            .next()
            .ok_or_else(error)?
            .to_string()
            .parse::<ElementKind>()
            .map_err(|_| error())?;
        let id = chars.as_str().parse::<i64>().map_err(|_| error())?;
        Ok(Self::new(kind, id))
    }
}

/// Where a feature came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Downloaded from the OSM API.
    Server,
    /// A server feature with unsynchronised local edits.
    LocallyModified,
    /// Created locally and never uploaded.
    LocallyCreated,
    /// Marked for deletion on the next upload.
    MarkedForDeletion,
}

/// One map entity: node, way or relation.
///
/// Coordinates are WGS84 with `x = longitude` and `y = latitude`.
///
/// # Examples
/// ```
/// use geo::{Geometry, Point};
/// use osm_sync_core::{ElementRef, Feature, Provenance, Tags};
///
/// let feature = Feature::new(
///     ElementRef::node(3),
///     Geometry::Point(Point::new(10.0, 50.0)),
///     Tags::from([("amenity".into(), "bench".into())]),
///     Provenance::Server,
/// );
/// assert_eq!(feature.tags.get("amenity").map(String::as_str), Some("bench"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    /// Identity of the element.
    pub id: ElementRef,
    /// WGS84 geometry.
    pub geometry: Geometry<f64>,
    /// OSM tags in key order.
    #[serde(default)]
    pub tags: Tags,
    /// Where the feature came from.
    pub provenance: Provenance,
}

impl Feature {
    /// Construct a feature from its parts.
    #[must_use]
    pub const fn new(
        id: ElementRef,
        geometry: Geometry<f64>,
        tags: Tags,
        provenance: Provenance,
    ) -> Self {
        Self {
            id,
            geometry,
            tags,
            provenance,
        }
    }

    /// Return the same feature re-labelled with another provenance.
    #[must_use]
    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }
}
