//! Resolve a tap on the map to the features under it.

use std::collections::BTreeSet;
use std::sync::Arc;

use geo::{Closest, ClosestPoint, Coord, Geometry, Point};

use crate::{ElementRef, GeometryLayerSet, HitTarget};

/// Coarse shape class of a geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryKind {
    /// Points and multi-points.
    PointLike,
    /// Lines, line strings and their multi forms.
    LineLike,
    /// Polygons and other filled shapes, including closed ways.
    Area,
    /// Heterogeneous collections such as relations.
    Collection,
}

impl GeometryKind {
    /// Classify `geometry`.
    #[must_use]
    pub const fn of(geometry: &Geometry<f64>) -> Self {
        match geometry {
            Geometry::Point(_) | Geometry::MultiPoint(_) => Self::PointLike,
            Geometry::Line(_) | Geometry::LineString(_) | Geometry::MultiLineString(_) => {
                Self::LineLike
            }
            Geometry::Polygon(_)
            | Geometry::MultiPolygon(_)
            | Geometry::Rect(_)
            | Geometry::Triangle(_) => Self::Area,
            Geometry::GeometryCollection(_) => Self::Collection,
        }
    }

    /// Whether taps may select geometries of this kind.
    ///
    /// Area fills are never tappable; areas are reached through their outline
    /// when it is drawn as a line.
    #[must_use]
    pub const fn is_tappable(self) -> bool {
        matches!(self, Self::PointLike | Self::LineLike)
    }
}

/// Return every tappable target whose nearest point lies within `tolerance`
/// of `point`.
///
/// Distances are measured in the coordinate units of the targets. No
/// tie-breaking is applied: all qualifying identities are returned.
#[must_use]
pub fn resolve_targets(
    targets: &[HitTarget],
    point: Coord<f64>,
    tolerance: f64,
) -> BTreeSet<ElementRef> {
    let tap = Point::from(point);
    targets
        .iter()
        .filter(|target| GeometryKind::of(&target.geometry).is_tappable())
        .filter(|target| {
            nearest_distance(&target.geometry, tap).is_some_and(|distance| distance <= tolerance)
        })
        .map(|target| target.id)
        .collect()
}

fn nearest_distance(geometry: &Geometry<f64>, tap: Point<f64>) -> Option<f64> {
    match geometry.closest_point(&tap) {
        Closest::Intersection(_) => Some(0.0),
        Closest::SinglePoint(nearest) => {
            Some((nearest.x() - tap.x()).hypot(nearest.y() - tap.y()))
        }
        Closest::Indeterminate => None,
    }
}

/// Tap resolution over the live hit-test collection of a layer set.
#[derive(Debug, Clone)]
pub struct TapResolver {
    layers: Arc<GeometryLayerSet>,
}

impl TapResolver {
    /// Resolve taps against the hit targets of `layers`.
    #[must_use]
    pub const fn new(layers: Arc<GeometryLayerSet>) -> Self {
        Self { layers }
    }

    /// Identities of every point or line within `tolerance` of `point`.
    #[must_use]
    pub fn resolve(&self, point: Coord<f64>, tolerance: f64) -> BTreeSet<ElementRef> {
        resolve_targets(&self.layers.hit_targets(), point, tolerance)
    }
}
