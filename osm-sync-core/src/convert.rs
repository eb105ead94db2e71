//! Conversion of the staged raw payload into a GeoJSON feature collection.

use camino::{Utf8Path, Utf8PathBuf};
use geo::{Geometry, LineString, Polygon};
use log::debug;
use thiserror::Error;

use crate::{DecodeError, ElementKind, Feature, OsmDocument, Tags, encode_geojson};

/// Errors raised by a [`FormatConverter`].
#[derive(Debug, Error)]
pub enum ConversionError {
    /// The input could not be read or the output could not be written.
    #[error("conversion I/O failed for {path}: {source}")]
    Io {
        /// File that could not be accessed.
        path: Utf8PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The input could not be interpreted.
    #[error("failed to decode conversion input {path}: {source}")]
    Decode {
        /// Input file.
        path: Utf8PathBuf,
        /// Decoder error.
        #[source]
        source: DecodeError,
    },
    /// The external conversion tool could not be started.
    #[error("failed to launch `{program}`: {source}")]
    Launch {
        /// Program name.
        program: String,
        /// Spawn error.
        #[source]
        source: std::io::Error,
    },
    /// The external conversion tool reported a failure.
    #[error("`{program}` exited with status {status}: {stderr}")]
    ToolFailed {
        /// Program name.
        program: String,
        /// Exit status description.
        status: String,
        /// Captured standard error.
        stderr: String,
    },
}

/// Transform the raw payload at one path into GeoJSON at another.
///
/// The boundary is file based so out-of-process tools such as `osmium` can be
/// plugged in unchanged.
pub trait FormatConverter: Send + Sync {
    /// Convert `input` to `output`, overwriting any existing output.
    ///
    /// # Errors
    ///
    /// Returns a [`ConversionError`] describing why conversion failed.
    fn convert(&self, input: &Utf8Path, output: &Utf8Path) -> Result<(), ConversionError>;
}

/// Tag keys whose presence on a closed way means it describes an area.
const AREA_KEYS: &[&str] = &[
    "building",
    "landuse",
    "leisure",
    "natural",
    "amenity",
    "area",
    "place",
    "shop",
    "tourism",
];

/// In-process OSM XML to GeoJSON converter.
///
/// Closed ways carrying an area tag become polygons; every other element keeps
/// the geometry produced by [`OsmDocument`].
///
/// # Examples
/// ```
/// use camino::Utf8PathBuf;
/// use osm_sync_core::{BuiltinConverter, FormatConverter, decode_geojson};
///
/// let dir = tempfile::tempdir()?;
/// let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp dir");
/// let input = root.join("input.osm");
/// std::fs::write(&input, r#"<osm version="0.6"><node id="1" lat="1" lon="2"/></osm>"#)?;
/// BuiltinConverter.convert(&input, &root.join("output.geojson"))?;
/// let features = decode_geojson(&std::fs::read(root.join("output.geojson"))?)?;
/// assert_eq!(features.len(), 1);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinConverter;

impl FormatConverter for BuiltinConverter {
    fn convert(&self, input: &Utf8Path, output: &Utf8Path) -> Result<(), ConversionError> {
        let bytes = osm_sync_fs::read_file(input).map_err(|source| ConversionError::Io {
            path: input.to_path_buf(),
            source,
        })?;
        let document = OsmDocument::parse(&bytes).map_err(|source| ConversionError::Decode {
            path: input.to_path_buf(),
            source,
        })?;
        let features: Vec<Feature> = document.features().into_iter().map(close_areas).collect();
        let json = encode_geojson(&features).map_err(|source| ConversionError::Decode {
            path: output.to_path_buf(),
            source,
        })?;
        osm_sync_fs::write_file(output, &json).map_err(|source| ConversionError::Io {
            path: output.to_path_buf(),
            source,
        })?;
        debug!("converted {} features from {input} to {output}", features.len());
        Ok(())
    }
}

fn is_area(tags: &Tags) -> bool {
    match tags.get("area").map(String::as_str) {
        Some("no") => false,
        Some(_) => true,
        None => AREA_KEYS.iter().any(|key| tags.contains_key(*key)),
    }
}

fn close_areas(mut feature: Feature) -> Feature {
    if feature.id.kind != ElementKind::Way || !is_area(&feature.tags) {
        return feature;
    }
    if let Geometry::LineString(line) = &feature.geometry
        && line.is_closed()
        && line.0.len() >= 4
    {
        let exterior: LineString<f64> = line.clone();
        feature.geometry = Geometry::Polygon(Polygon::new(exterior, Vec::new()));
    }
    feature
}
