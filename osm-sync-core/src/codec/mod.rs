//! Decoders for the payloads handled by the pipeline.
//!
//! - [`OsmDocument`] parses the raw OSM XML returned by the API and feeds the
//!   feature index.
//! - [`decode_geojson`]/[`encode_geojson`] handle the converted payload that
//!   feeds the render layers.

mod error;
mod geojson;
mod osm_xml;

pub use error::DecodeError;
pub use geojson::{decode_geojson, encode_geojson};
pub use osm_xml::OsmDocument;
