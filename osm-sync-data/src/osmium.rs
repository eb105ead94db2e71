//! [`FormatConverter`] running the `osmium` command-line tool.
//!
//! `osmium export` turns the staged OSM XML into GeoJSON, assembling areas
//! from closed ways and multipolygon relations. The `type,id` attributes are
//! requested so every exported feature carries `@type` and `@id` properties.

use std::process::Command;

use camino::Utf8Path;
use log::debug;
use osm_sync_core::{ConversionError, FormatConverter};

/// Program name looked up on `PATH` by default.
pub const OSMIUM_PROGRAM: &str = "osmium";

/// Converter delegating to `osmium export`.
///
/// # Examples
/// ```
/// use osm_sync_data::OsmiumConverter;
///
/// let converter = OsmiumConverter::default();
/// assert_eq!(converter.program(), "osmium");
/// ```
#[derive(Debug, Clone)]
pub struct OsmiumConverter {
    program: String,
}

impl Default for OsmiumConverter {
    fn default() -> Self {
        Self::with_program(OSMIUM_PROGRAM)
    }
}

impl OsmiumConverter {
    /// Use an explicit executable instead of `osmium` from `PATH`.
    #[must_use]
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Executable the converter runs.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    fn arguments<'a>(input: &'a Utf8Path, output: &'a Utf8Path) -> [&'a str; 9] {
        [
            "export",
            input.as_str(),
            "-o",
            output.as_str(),
            "--overwrite",
            "-f",
            "geojson",
            "-a",
            "type,id",
        ]
    }
}

impl FormatConverter for OsmiumConverter {
    fn convert(&self, input: &Utf8Path, output: &Utf8Path) -> Result<(), ConversionError> {
        debug!("running {} export {input} -> {output}", self.program);
        let result = Command::new(&self.program)
            .args(Self::arguments(input, output))
            .output()
            .map_err(|source| ConversionError::Launch {
                program: self.program.clone(),
                source,
            })?;
        if result.status.success() {
            return Ok(());
        }
        Err(ConversionError::ToolFailed {
            program: self.program.clone(),
            status: result.status.to_string(),
            stderr: String::from_utf8_lossy(&result.stderr).trim().to_owned(),
        })
    }
}
