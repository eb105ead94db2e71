//! Standard collaborators for the OSM synchronisation core.
//!
//! Responsibilities:
//! - Download raw OSM XML from the OSM API over HTTP.
//! - Convert staged payloads with the `osmium` command-line tool.
//! - Persist local edits as JSON files.
//!
//! Boundaries:
//! - Do not encode synchronisation rules (live in `osm-sync-core`).
//! - Every adapter implements a synchronous collaborator trait so the core
//!   can call it from plain threads.

mod edit_store;
pub mod osm_api;
mod osmium;

pub use edit_store::{DELETED_FILE_NAME, EditStoreError, JsonEditStore, SAVED_FILE_NAME};
pub use osm_api::{HttpOsmProvider, OsmApiConfig, OsmServer, ProviderBuildError};
pub use osmium::{OSMIUM_PROGRAM, OsmiumConverter};
