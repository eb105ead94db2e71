//! Square download areas centred on the viewport.

use std::fmt;

use geo::{Coord, Rect};
use serde::{Deserialize, Serialize};

/// Axis-aligned download area around a centre point.
///
/// The box spans `center ± half_extent` degrees on both axes. Coordinates are
/// WGS84 with `x = longitude` and `y = latitude`; the antimeridian is not
/// modelled.
///
/// ```text
///     ---------latMax
///    |           |
///    |     c     |
///    |           |
/// lonMin------lonMax/latMin
/// ```
///
/// # Examples
/// ```
/// use geo::Coord;
/// use osm_sync_core::BoundingBox;
///
/// let bbox = BoundingBox::around(Coord { x: 10.0, y: 50.0 }, 0.002);
/// assert!(bbox.contains(Coord { x: 10.002, y: 49.998 }));
/// assert!(!bbox.contains(Coord { x: 10.0021, y: 50.0 }));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Centre of the box, `x` as longitude and `y` as latitude.
    pub center: Coord<f64>,
    /// Distance from the centre to each edge, in degrees.
    pub half_extent: f64,
}

impl BoundingBox {
    /// Build the box covering `center ± half_extent`.
    #[must_use]
    pub const fn around(center: Coord<f64>, half_extent: f64) -> Self {
        Self {
            center,
            half_extent,
        }
    }

    /// Western edge.
    #[must_use]
    pub fn lon_min(&self) -> f64 {
        self.center.x - self.half_extent
    }

    /// Eastern edge.
    #[must_use]
    pub fn lon_max(&self) -> f64 {
        self.center.x + self.half_extent
    }

    /// Southern edge.
    #[must_use]
    pub fn lat_min(&self) -> f64 {
        self.center.y - self.half_extent
    }

    /// Northern edge.
    #[must_use]
    pub fn lat_max(&self) -> f64 {
        self.center.y + self.half_extent
    }

    /// Whether `point` lies inside the box. Boundary points are inside.
    #[must_use]
    pub fn contains(&self, point: Coord<f64>) -> bool {
        (self.lon_min()..=self.lon_max()).contains(&point.x)
            && (self.lat_min()..=self.lat_max()).contains(&point.y)
    }

    /// The same area as a `geo` rectangle.
    #[must_use]
    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            Coord {
                x: self.lon_min(),
                y: self.lat_min(),
            },
            Coord {
                x: self.lon_max(),
                y: self.lat_max(),
            },
        )
    }

    /// Bounds in the `lonMin,latMin,lonMax,latMax` order used by the OSM API.
    #[must_use]
    pub fn to_query_param(&self) -> String {
        format!(
            "{},{},{},{}",
            self.lon_min(),
            self.lat_min(),
            self.lon_max(),
            self.lat_max()
        )
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}] x [{}, {}]",
            self.lon_min(),
            self.lon_max(),
            self.lat_min(),
            self.lat_max()
        )
    }
}
