//! GeoJSON feature collections as written by `osmium export -a type,id`.
//!
//! Identity is read from the feature's `id` member (`n123`, `w5`) or from the
//! `@type`/`@id` properties. Properties without an `@` prefix become tags.

use geo::{
    Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon,
    Point, Polygon,
};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::DecodeError;
use crate::{ElementKind, ElementRef, Feature, Provenance, Tags};

type Position = Vec<f64>;

#[derive(Debug, Serialize, Deserialize)]
struct FeatureCollectionDoc {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    features: Vec<FeatureDoc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FeatureDoc {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<Value>,
    #[serde(default)]
    geometry: Option<GeometryDoc>,
    #[serde(default)]
    properties: Option<Map<String, Value>>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
enum GeometryDoc {
    Point { coordinates: Position },
    MultiPoint { coordinates: Vec<Position> },
    LineString { coordinates: Vec<Position> },
    MultiLineString { coordinates: Vec<Vec<Position>> },
    Polygon { coordinates: Vec<Vec<Position>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Position>>> },
    GeometryCollection { geometries: Vec<GeometryDoc> },
}

impl GeometryDoc {
    const fn kind(&self) -> &'static str {
        match self {
            Self::Point { .. } => "Point",
            Self::MultiPoint { .. } => "MultiPoint",
            Self::LineString { .. } => "LineString",
            Self::MultiLineString { .. } => "MultiLineString",
            Self::Polygon { .. } => "Polygon",
            Self::MultiPolygon { .. } => "MultiPolygon",
            Self::GeometryCollection { .. } => "GeometryCollection",
        }
    }

    fn into_geometry(self) -> Result<Geometry<f64>, DecodeError> {
        let kind = self.kind();
        let coord = |position: Position| to_coord(kind, &position);
        let line = |positions: Vec<Position>| {
            positions
                .into_iter()
                .map(coord)
                .collect::<Result<Vec<_>, _>>()
                .map(LineString::from)
        };
        let polygon = |rings: Vec<Vec<Position>>| -> Result<Polygon<f64>, DecodeError> {
            let mut rings = rings.into_iter().map(line);
            let exterior = rings.next().ok_or_else(|| DecodeError::InvalidGeometry {
                kind,
                reason: "polygon without an exterior ring".to_owned(),
            })??;
            let interiors = rings.collect::<Result<Vec<_>, _>>()?;
            Ok(Polygon::new(exterior, interiors))
        };

        Ok(match self {
            Self::Point { coordinates } => Geometry::Point(Point::from(coord(coordinates)?)),
            Self::MultiPoint { coordinates } => Geometry::MultiPoint(MultiPoint::new(
                coordinates
                    .into_iter()
                    .map(|position| coord(position).map(Point::from))
                    .collect::<Result<_, _>>()?,
            )),
            Self::LineString { coordinates } => Geometry::LineString(line(coordinates)?),
            Self::MultiLineString { coordinates } => Geometry::MultiLineString(
                MultiLineString::new(coordinates.into_iter().map(line).collect::<Result<_, _>>()?),
            ),
            Self::Polygon { coordinates } => Geometry::Polygon(polygon(coordinates)?),
            Self::MultiPolygon { coordinates } => Geometry::MultiPolygon(MultiPolygon::new(
                coordinates
                    .into_iter()
                    .map(polygon)
                    .collect::<Result<_, _>>()?,
            )),
            Self::GeometryCollection { geometries } => {
                Geometry::GeometryCollection(GeometryCollection::from(
                    geometries
                        .into_iter()
                        .map(Self::into_geometry)
                        .collect::<Result<Vec<_>, _>>()?,
                ))
            }
        })
    }

    fn from_geometry(geometry: &Geometry<f64>) -> Self {
        let position = |coord: &Coord<f64>| vec![coord.x, coord.y];
        let line = |line: &LineString<f64>| line.coords().map(position).collect::<Vec<_>>();
        let polygon = |polygon: &Polygon<f64>| {
            std::iter::once(polygon.exterior())
                .chain(polygon.interiors())
                .map(line)
                .collect::<Vec<_>>()
        };

        match geometry {
            Geometry::Point(point) => Self::Point {
                coordinates: position(&point.0),
            },
            Geometry::MultiPoint(points) => Self::MultiPoint {
                coordinates: points.iter().map(|point| position(&point.0)).collect(),
            },
            Geometry::Line(segment) => Self::LineString {
                coordinates: vec![position(&segment.start), position(&segment.end)],
            },
            Geometry::LineString(string) => Self::LineString {
                coordinates: line(string),
            },
            Geometry::MultiLineString(strings) => Self::MultiLineString {
                coordinates: strings.iter().map(line).collect(),
            },
            Geometry::Polygon(area) => Self::Polygon {
                coordinates: polygon(area),
            },
            Geometry::MultiPolygon(areas) => Self::MultiPolygon {
                coordinates: areas.iter().map(polygon).collect(),
            },
            Geometry::Rect(rect) => Self::Polygon {
                coordinates: polygon(&rect.to_polygon()),
            },
            Geometry::Triangle(triangle) => Self::Polygon {
                coordinates: polygon(&triangle.to_polygon()),
            },
            Geometry::GeometryCollection(collection) => Self::GeometryCollection {
                geometries: collection.iter().map(Self::from_geometry).collect(),
            },
        }
    }
}

fn to_coord(kind: &'static str, position: &[f64]) -> Result<Coord<f64>, DecodeError> {
    match position {
        [x, y, ..] => Ok(Coord { x: *x, y: *y }),
        _ => Err(DecodeError::InvalidGeometry {
            kind,
            reason: format!("position has {} ordinates, expected at least 2", position.len()),
        }),
    }
}

fn identity(id: Option<&Value>, properties: &Map<String, Value>) -> Option<ElementRef> {
    if let Some(Value::String(compact)) = id {
        if let Ok(parsed) = compact.parse::<ElementRef>() {
            return Some(parsed);
        }
    }
    let raw_id = match properties.get("@id")? {
        Value::Number(number) => number.as_i64()?,
        Value::String(text) => {
            if let Ok(parsed) = text.parse::<ElementRef>() {
                return Some(parsed);
            }
            text.parse::<i64>().ok()?
        }
        _ => return None,
    };
    let kind = match properties.get("@type") {
        Some(Value::String(kind)) => kind.parse::<ElementKind>().ok()?,
        // Without a type the element is assumed to be a node.
        None => ElementKind::Node,
        Some(_) => return None,
    };
    Some(ElementRef::new(kind, raw_id))
}

fn tags(properties: &Map<String, Value>) -> Tags {
    properties
        .iter()
        .filter(|(key, _)| !key.starts_with('@'))
        .filter_map(|(key, value)| match value {
            Value::String(text) => Some((key.clone(), text.clone())),
            Value::Null => None,
            other => Some((key.clone(), other.to_string())),
        })
        .collect()
}

/// Decode a GeoJSON feature collection into server features.
///
/// Features without a geometry or a recognisable identity are skipped with a
/// warning.
///
/// # Errors
///
/// Returns [`DecodeError::GeoJson`] for malformed JSON and
/// [`DecodeError::InvalidGeometry`] for impossible coordinates.
///
/// # Examples
/// ```
/// use osm_sync_core::{decode_geojson, ElementRef};
///
/// let json = br#"{"type":"FeatureCollection","features":[
///   {"type":"Feature","geometry":{"type":"Point","coordinates":[10.0,50.0]},
///    "properties":{"@type":"node","@id":3,"amenity":"bench"}}
/// ]}"#;
/// let features = decode_geojson(json)?;
/// assert_eq!(features[0].id, ElementRef::node(3));
/// # Ok::<(), osm_sync_core::DecodeError>(())
/// ```
pub fn decode_geojson(bytes: &[u8]) -> Result<Vec<Feature>, DecodeError> {
    let collection: FeatureCollectionDoc =
        serde_json::from_slice(bytes).map_err(|source| DecodeError::GeoJson { source })?;
    let mut features = Vec::with_capacity(collection.features.len());
    for doc in collection.features {
        let properties = doc.properties.unwrap_or_default();
        let Some(id) = identity(doc.id.as_ref(), &properties) else {
            warn!("Skipped GeoJSON feature without an OSM identity");
            continue;
        };
        let Some(geometry) = doc.geometry else {
            warn!("Skipped GeoJSON feature {id} without geometry");
            continue;
        };
        features.push(Feature::new(
            id,
            geometry.into_geometry()?,
            tags(&properties),
            Provenance::Server,
        ));
    }
    Ok(features)
}

/// Encode features as a GeoJSON feature collection with `@type`/`@id`
/// properties.
///
/// # Errors
///
/// Returns [`DecodeError::GeoJson`] if serialisation fails.
pub fn encode_geojson(features: &[Feature]) -> Result<Vec<u8>, DecodeError> {
    let collection = FeatureCollectionDoc {
        kind: "FeatureCollection".to_owned(),
        features: features
            .iter()
            .map(|feature| {
                let mut properties: Map<String, Value> = feature
                    .tags
                    .iter()
                    .map(|(key, value)| (key.clone(), Value::String(value.clone())))
                    .collect();
                properties.insert(
                    "@type".to_owned(),
                    Value::String(feature.id.kind.as_str().to_owned()),
                );
                properties.insert("@id".to_owned(), Value::from(feature.id.id));
                FeatureDoc {
                    kind: "Feature".to_owned(),
                    id: None,
                    geometry: Some(GeometryDoc::from_geometry(&feature.geometry)),
                    properties: Some(properties),
                }
            })
            .collect(),
    };
    serde_json::to_vec(&collection).map_err(|source| DecodeError::GeoJson { source })
}
