//! Error types emitted by the `osm-sync` CLI.
//!
//! Keep this error type reasonably small, as many CLI helpers return
//! `Result<_, CliError>` and the workspace enables `clippy::result_large_err`.

use std::sync::Arc;

use camino::Utf8PathBuf;
use osm_sync_core::{ConfigError, SyncError};
use osm_sync_data::osm_api::ParseServerError;
use osm_sync_data::{EditStoreError, OsmServer, ProviderBuildError};
use thiserror::Error;

/// Errors emitted by the `osm-sync` CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        field: &'static str,
        env: &'static str,
    },
    /// A coordinate lies outside the WGS84 range.
    #[error("{field} {value} is outside [-{limit}, {limit}]")]
    CoordinateOutOfRange {
        field: &'static str,
        value: f64,
        limit: f64,
    },
    /// The server name is not a known deployment.
    #[error("invalid --server: {source}")]
    InvalidServer {
        #[source]
        source: ParseServerError,
    },
    /// The download area settings cannot drive a shrinking retry.
    #[error("invalid download area settings: {source}")]
    InvalidSyncConfig {
        #[source]
        source: ConfigError,
    },
    /// The converter name is not recognised.
    #[error("unknown converter {value:?}; expected `builtin` or `osmium`")]
    InvalidConverter { value: String },
    /// Constructing the OSM API provider failed.
    #[error("failed to build OSM API provider for {server}: {source}")]
    BuildProvider {
        server: OsmServer,
        #[source]
        source: ProviderBuildError,
    },
    /// Opening the edit store failed.
    #[error("failed to open edit store at {path:?}: {source}")]
    OpenEditStore {
        path: Utf8PathBuf,
        #[source]
        source: EditStoreError,
    },
    /// The background session could not be started.
    #[error("the synchronisation session could not be started")]
    SessionNotStarted,
    /// The synchronisation session failed.
    #[error("synchronisation failed: {source}")]
    Sync {
        #[source]
        source: Arc<SyncError>,
    },
    /// Serialising the report failed.
    #[error("failed to serialise sync report: {0}")]
    SerialiseReport(#[source] serde_json::Error),
    /// Writing the report failed.
    #[error("failed to write sync report: {0}")]
    WriteReport(#[source] std::io::Error),
}
