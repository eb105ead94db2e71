use thiserror::Error;

/// Errors raised while decoding downloaded or converted payloads.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The raw payload is not well-formed OSM XML.
    #[error("failed to parse OSM XML payload: {source}")]
    OsmXml {
        /// Deserialiser error from `quick-xml`.
        #[source]
        source: quick_xml::DeError,
    },
    /// The converted payload is not valid GeoJSON.
    #[error("failed to parse GeoJSON payload: {source}")]
    GeoJson {
        /// Deserialiser error from `serde_json`.
        #[source]
        source: serde_json::Error,
    },
    /// A geometry had an impossible shape.
    #[error("invalid {kind} geometry: {reason}")]
    InvalidGeometry {
        /// GeoJSON geometry type.
        kind: &'static str,
        /// What was wrong with it.
        reason: String,
    },
}
