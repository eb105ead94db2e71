//! OSM XML (API 0.6) decoding.
//!
//! Nodes become points, ways become line strings through their resolved node
//! references and relations become collections of their resolved members.
//! References to elements outside the payload are dropped.
use std::collections::HashMap;

use geo::{Coord, Geometry, GeometryCollection, LineString, Point};
use log::warn;
use serde::Deserialize;

use super::DecodeError;
use crate::{ElementKind, ElementRef, Feature, Provenance, Tags};

#[derive(Debug, Default, Deserialize)]
struct XmlDocument {
    #[serde(rename = "node", default)]
    nodes: Vec<XmlNode>,
    #[serde(rename = "way", default)]
    ways: Vec<XmlWay>,
    #[serde(rename = "relation", default)]
    relations: Vec<XmlRelation>,
}

#[derive(Debug, Deserialize)]
struct XmlTag {
    #[serde(rename = "@k")]
    key: String,
    #[serde(rename = "@v")]
    value: String,
}

#[derive(Debug, Deserialize)]
struct XmlNode {
    #[serde(rename = "@id")]
    id: i64,
    #[serde(rename = "@lat", default)]
    lat: Option<f64>,
    #[serde(rename = "@lon", default)]
    lon: Option<f64>,
    #[serde(rename = "tag", default)]
    tags: Vec<XmlTag>,
}

#[derive(Debug, Deserialize)]
struct XmlNodeRef {
    #[serde(rename = "@ref")]
    node: i64,
}

#[derive(Debug, Deserialize)]
struct XmlWay {
    #[serde(rename = "@id")]
    id: i64,
    #[serde(rename = "nd", default)]
    node_refs: Vec<XmlNodeRef>,
    #[serde(rename = "tag", default)]
    tags: Vec<XmlTag>,
}

#[derive(Debug, Deserialize)]
struct XmlMember {
    #[serde(rename = "@type")]
    kind: String,
    #[serde(rename = "@ref")]
    target: i64,
}

#[derive(Debug, Deserialize)]
struct XmlRelation {
    #[serde(rename = "@id")]
    id: i64,
    #[serde(rename = "member", default)]
    members: Vec<XmlMember>,
    #[serde(rename = "tag", default)]
    tags: Vec<XmlTag>,
}

fn collect_tags(tags: &[XmlTag]) -> Tags {
    tags.iter()
        .map(|tag| (tag.key.clone(), tag.value.clone()))
        .collect()
}

/// A parsed OSM XML payload.
///
/// Element passes are exposed separately so callers can stop between them.
///
/// # Examples
/// ```
/// use osm_sync_core::{ElementRef, OsmDocument};
///
/// let xml = r#"<osm version="0.6">
///   <node id="1" lat="50.0" lon="10.0"><tag k="amenity" v="bench"/></node>
///   <node id="2" lat="50.001" lon="10.0"/>
///   <way id="7"><nd ref="1"/><nd ref="2"/><tag k="highway" v="footway"/></way>
/// </osm>"#;
/// let document = OsmDocument::parse(xml.as_bytes())?;
/// let ways = document.way_features();
/// assert_eq!(ways[0].id, ElementRef::way(7));
/// assert_eq!(document.node_features().len(), 2);
/// # Ok::<(), osm_sync_core::DecodeError>(())
/// ```
#[derive(Debug, Default)]
pub struct OsmDocument {
    document: XmlDocument,
    coords: HashMap<i64, Coord<f64>>,
}

impl OsmDocument {
    /// Parse an OSM XML payload.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::OsmXml`] when the payload is not valid OSM XML.
    pub fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        let document: XmlDocument =
            quick_xml::de::from_reader(bytes).map_err(|source| DecodeError::OsmXml { source })?;
        let coords = document
            .nodes
            .iter()
            .filter_map(|node| Some((node.id, validated_coord(node.lon?, node.lat?)?)))
            .collect();
        Ok(Self { document, coords })
    }

    /// Number of elements of every type in the payload.
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.document.nodes.len() + self.document.ways.len() + self.document.relations.len()
    }

    /// Every node with valid coordinates as a point feature.
    #[must_use]
    pub fn node_features(&self) -> Vec<Feature> {
        self.document
            .nodes
            .iter()
            .filter_map(|node| {
                let Some(coord) = self.coords.get(&node.id) else {
                    warn!("Skipped OSM node {} without valid coordinates", node.id);
                    return None;
                };
                Some(Feature::new(
                    ElementRef::node(node.id),
                    Geometry::Point(Point::from(*coord)),
                    collect_tags(&node.tags),
                    Provenance::Server,
                ))
            })
            .collect()
    }

    /// Every way with at least one resolved node as a line-string feature.
    #[must_use]
    pub fn way_features(&self) -> Vec<Feature> {
        self.document
            .ways
            .iter()
            .filter_map(|way| {
                let Some(line) = self.way_line(way) else {
                    warn!("Skipped OSM way {} without resolvable nodes", way.id);
                    return None;
                };
                Some(Feature::new(
                    ElementRef::way(way.id),
                    Geometry::LineString(line),
                    collect_tags(&way.tags),
                    Provenance::Server,
                ))
            })
            .collect()
    }

    /// Every relation as a collection of its resolvable node and way members.
    #[must_use]
    pub fn relation_features(&self) -> Vec<Feature> {
        let ways: HashMap<i64, &XmlWay> = self
            .document
            .ways
            .iter()
            .map(|way| (way.id, way))
            .collect();
        self.document
            .relations
            .iter()
            .map(|relation| {
                let members: Vec<Geometry<f64>> = relation
                    .members
                    .iter()
                    .filter_map(|member| match member.kind.parse::<ElementKind>() {
                        Ok(ElementKind::Node) => self
                            .coords
                            .get(&member.target)
                            .map(|coord| Geometry::Point(Point::from(*coord))),
                        Ok(ElementKind::Way) => ways
                            .get(&member.target)
                            .and_then(|way| self.way_line(way))
                            .map(Geometry::LineString),
                        Ok(ElementKind::Relation) | Err(_) => None,
                    })
                    .collect();
                Feature::new(
                    ElementRef::relation(relation.id),
                    Geometry::GeometryCollection(GeometryCollection::from(members)),
                    collect_tags(&relation.tags),
                    Provenance::Server,
                )
            })
            .collect()
    }

    /// All features: nodes, then ways, then relations.
    #[must_use]
    pub fn features(&self) -> Vec<Feature> {
        let mut features = self.node_features();
        features.extend(self.way_features());
        features.extend(self.relation_features());
        features
    }

    fn way_line(&self, way: &XmlWay) -> Option<LineString<f64>> {
        let coords: Vec<Coord<f64>> = way
            .node_refs
            .iter()
            .filter_map(|node_ref| self.coords.get(&node_ref.node).copied())
            .collect();
        (!coords.is_empty()).then(|| LineString::from(coords))
    }
}

fn validated_coord(lon: f64, lat: f64) -> Option<Coord<f64>> {
    (lon.is_finite()
        && lat.is_finite()
        && (-180.0..=180.0).contains(&lon)
        && (-90.0..=90.0).contains(&lat))
    .then_some(Coord { x: lon, y: lat })
}
