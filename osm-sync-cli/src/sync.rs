//! Sync command implementation for the `osm-sync` CLI.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::Parser;
use geo::Coord;
use log::{debug, info};
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use osm_sync_core::{
    BuiltinConverter, DefaultStyles, Feature, FormatConverter, LayerName, RenderSurface,
    SessionOutcome, Style, SyncConfig, SyncController, SyncParts,
};
use osm_sync_data::{HttpOsmProvider, JsonEditStore, OsmServer, OsmiumConverter};
use serde::{Deserialize, Serialize};

use crate::{
    ARG_CONVERTER, ARG_EDITS_DIR, ARG_INITIAL_HALF_EXTENT, ARG_LAT, ARG_LON,
    ARG_MIN_HALF_EXTENT, ARG_SERVER, ARG_SHRINK_FACTOR, ARG_STAGING_DIR, CliError, ENV_LAT,
    ENV_LON,
};

/// Directory below the staging directory used for edits when none is given.
const DEFAULT_EDITS_SUBDIR: &str = "edits";

/// CLI arguments for the `sync` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Run one synchronisation session for a map centre: download \
                 the surrounding area from the OSM API, convert and index it, \
                 and print a JSON report. Options can come from CLI flags, \
                 configuration files, or environment variables.",
    about = "Synchronise the area around a map centre"
)]
#[ortho_config(prefix = "OSM_SYNC")]
pub(crate) struct SyncArgs {
    /// Longitude of the map centre in degrees.
    #[arg(long = ARG_LON, value_name = "degrees", allow_negative_numbers = true)]
    #[serde(default)]
    pub(crate) lon: Option<f64>,
    /// Latitude of the map centre in degrees.
    #[arg(long = ARG_LAT, value_name = "degrees", allow_negative_numbers = true)]
    #[serde(default)]
    pub(crate) lat: Option<f64>,
    /// OSM API deployment: `production` or `development`.
    #[arg(long = ARG_SERVER, value_name = "name")]
    #[serde(default)]
    pub(crate) server: Option<String>,
    /// Directory holding the staged raw and converted payloads.
    #[arg(long = ARG_STAGING_DIR, value_name = "dir")]
    #[serde(default)]
    pub(crate) staging_dir: Option<Utf8PathBuf>,
    /// Directory holding `saved.json` and `deleted.json`.
    #[arg(long = ARG_EDITS_DIR, value_name = "dir")]
    #[serde(default)]
    pub(crate) edits_dir: Option<Utf8PathBuf>,
    /// Format converter: `builtin` or `osmium`.
    #[arg(long = ARG_CONVERTER, value_name = "name")]
    #[serde(default)]
    pub(crate) converter: Option<String>,
    /// Half-extent of the first download in degrees.
    #[arg(long = ARG_INITIAL_HALF_EXTENT, value_name = "degrees")]
    #[serde(default)]
    pub(crate) initial_half_extent: Option<f64>,
    /// Factor applied to the half-extent after an object-limit refusal.
    #[arg(long = ARG_SHRINK_FACTOR, value_name = "factor")]
    #[serde(default)]
    pub(crate) shrink_factor: Option<f64>,
    /// Smallest half-extent a retry may request, in degrees.
    #[arg(long = ARG_MIN_HALF_EXTENT, value_name = "degrees")]
    #[serde(default)]
    pub(crate) min_half_extent: Option<f64>,
}

impl SyncArgs {
    pub(crate) fn into_config(self) -> Result<SyncCommandConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        SyncCommandConfig::try_from(merged)
    }
}

/// Which [`FormatConverter`] the command uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum ConverterKind {
    /// The in-process OSM XML to GeoJSON converter.
    #[default]
    Builtin,
    /// `osmium export` from `PATH`.
    Osmium,
}

impl FromStr for ConverterKind {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "builtin" => Ok(Self::Builtin),
            "osmium" => Ok(Self::Osmium),
            _ => Err(CliError::InvalidConverter {
                value: s.to_owned(),
            }),
        }
    }
}

impl fmt::Display for ConverterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Builtin => "builtin",
            Self::Osmium => "osmium",
        })
    }
}

/// Resolved `sync` command configuration.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SyncCommandConfig {
    /// Map centre to synchronise around.
    pub(crate) center: Coord<f64>,
    /// OSM API deployment to download from.
    pub(crate) server: OsmServer,
    /// Pipeline settings, including the staging directory.
    pub(crate) sync: SyncConfig,
    /// Edit store directory.
    pub(crate) edits_dir: Utf8PathBuf,
    /// Converter used on the staged payload.
    pub(crate) converter: ConverterKind,
}

impl SyncCommandConfig {
    fn require_coordinate(
        value: Option<f64>,
        field: &'static str,
        env: &'static str,
        limit: f64,
    ) -> Result<f64, CliError> {
        let value = value.ok_or(CliError::MissingArgument { field, env })?;
        if value.is_finite() && (-limit..=limit).contains(&value) {
            Ok(value)
        } else {
            Err(CliError::CoordinateOutOfRange {
                field,
                value,
                limit,
            })
        }
    }

    fn sync_config(args: &SyncArgs) -> Result<SyncConfig, CliError> {
        let defaults = SyncConfig::default();
        let staging_dir = args
            .staging_dir
            .clone()
            .unwrap_or_else(|| defaults.staging_dir().to_path_buf());
        SyncConfig::new(
            args.initial_half_extent
                .unwrap_or(defaults.initial_half_extent()),
            args.shrink_factor.unwrap_or(defaults.shrink_factor()),
            args.min_half_extent.or(defaults.min_half_extent()),
            staging_dir,
        )
        .map_err(|source| CliError::InvalidSyncConfig { source })
    }
}

impl TryFrom<SyncArgs> for SyncCommandConfig {
    type Error = CliError;

    fn try_from(args: SyncArgs) -> Result<Self, Self::Error> {
        let lon = Self::require_coordinate(args.lon, ARG_LON, ENV_LON, 180.0)?;
        let lat = Self::require_coordinate(args.lat, ARG_LAT, ENV_LAT, 90.0)?;
        let server = args
            .server
            .as_deref()
            .map(str::parse::<OsmServer>)
            .transpose()
            .map_err(|source| CliError::InvalidServer { source })?
            .unwrap_or_default();
        let converter = args
            .converter
            .as_deref()
            .map(str::parse::<ConverterKind>)
            .transpose()?
            .unwrap_or_default();
        let sync = Self::sync_config(&args)?;
        let edits_dir = args
            .edits_dir
            .unwrap_or_else(|| sync.staging_dir().join(DEFAULT_EDITS_SUBDIR));

        Ok(Self {
            center: Coord { x: lon, y: lat },
            server,
            sync,
            edits_dir,
            converter,
        })
    }
}

/// Render surface for runs without a display.
///
/// Geometry is kept by the layer set itself, so the surface only logs.
#[derive(Debug, Default)]
pub(crate) struct HeadlessSurface;

impl RenderSurface for HeadlessSurface {
    fn add_layer(&self, layer: LayerName) {
        debug!("layer {} attached", layer.as_str());
    }

    fn remove_layer(&self, layer: LayerName) {
        debug!("layer {} detached", layer.as_str());
    }

    fn set_layer_geometry(&self, layer: LayerName, features: &[Feature], _style: &Style) {
        debug!("layer {} holds {} geometries", layer.as_str(), features.len());
    }
}

/// Builds the collaborators for the current sync invocation.
pub(super) trait SyncPartsBuilder {
    fn build(&self, config: &SyncCommandConfig) -> Result<SyncParts, CliError>;
}

pub(super) struct DefaultSyncPartsBuilder;

impl SyncPartsBuilder for DefaultSyncPartsBuilder {
    fn build(&self, config: &SyncCommandConfig) -> Result<SyncParts, CliError> {
        let provider =
            HttpOsmProvider::new(config.server).map_err(|source| CliError::BuildProvider {
                server: config.server,
                source,
            })?;
        let converter: Arc<dyn FormatConverter> = match config.converter {
            ConverterKind::Builtin => Arc::new(BuiltinConverter),
            ConverterKind::Osmium => Arc::new(OsmiumConverter::default()),
        };
        Ok(SyncParts {
            provider: Arc::new(provider),
            converter,
            surface: Arc::new(HeadlessSurface),
            styles: Arc::new(DefaultStyles),
            edits: Arc::new(open_edit_store(config)?),
        })
    }
}

/// Open the JSON edit store named by `config`.
pub(super) fn open_edit_store(config: &SyncCommandConfig) -> Result<JsonEditStore, CliError> {
    JsonEditStore::open(config.edits_dir.clone()).map_err(|source| CliError::OpenEditStore {
        path: config.edits_dir.clone(),
        source,
    })
}

/// JSON document printed after a run.
#[derive(Debug, Serialize)]
pub(crate) struct SyncReport {
    /// How the session ended, with the publish summary when it published.
    #[serde(flatten)]
    pub(crate) outcome: SessionOutcome,
    /// Half-extent in force after the session, in degrees.
    pub(crate) half_extent: f64,
    /// Geometries per layer.
    pub(crate) layers: BTreeMap<&'static str, usize>,
    /// Pending edits shown on the upload badge.
    pub(crate) badge: usize,
}

pub(super) fn run_sync(args: SyncArgs) -> Result<(), CliError> {
    let mut stdout = std::io::stdout().lock();
    let builder = DefaultSyncPartsBuilder;
    run_sync_with(args, &builder, &mut stdout)
}

pub(super) fn run_sync_with(
    args: SyncArgs,
    builder: &dyn SyncPartsBuilder,
    writer: &mut dyn Write,
) -> Result<(), CliError> {
    let report = execute_sync(args, builder)?;
    write_sync_report(writer, &report)
}

fn execute_sync(args: SyncArgs, builder: &dyn SyncPartsBuilder) -> Result<SyncReport, CliError> {
    let config = args.into_config()?;
    info!(
        "synchronising around ({}, {}) from {} using the {} converter",
        config.center.x, config.center.y, config.server, config.converter
    );
    let parts = builder.build(&config)?;
    let controller = SyncController::new(config.sync.clone(), parts);
    let handle = controller
        .check_map_center(config.center)
        .ok_or(CliError::SessionNotStarted)?;
    let outcome = handle
        .join()
        .map_err(|source| CliError::Sync { source })?;
    let layers = LayerName::ALL
        .into_iter()
        .map(|layer| (layer.as_str(), controller.layers().layer(layer).len()))
        .collect();
    Ok(SyncReport {
        outcome,
        half_extent: controller.pipeline().half_extent(),
        layers,
        badge: controller.badge_count(),
    })
}

fn write_sync_report(writer: &mut dyn Write, report: &SyncReport) -> Result<(), CliError> {
    let payload = serde_json::to_string_pretty(report).map_err(CliError::SerialiseReport)?;
    writer
        .write_all(payload.as_bytes())
        .map_err(CliError::WriteReport)?;
    writer.write_all(b"\n").map_err(CliError::WriteReport)?;
    Ok(())
}

#[cfg(test)]
pub(crate) fn config_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<SyncCommandConfig, CliError> {
    let merged = SyncArgs::merge_from_layers(layers).map_err(CliError::from)?;
    SyncCommandConfig::try_from(merged)
}
