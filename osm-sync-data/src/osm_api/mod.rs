//! HTTP access to the OpenStreetMap editing API.
//!
//! This module provides [`HttpOsmProvider`], an implementation of
//! [`osm_sync_core::RemoteDataProvider`] that downloads raw OSM XML for a
//! bounding box from the API's `map` call.
//!
//! # Architecture
//!
//! The [`RemoteDataProvider`] trait is synchronous so the synchronisation core
//! can run on plain threads. The provider bridges to `reqwest`'s async client
//! by blocking on a Tokio runtime internally.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use osm_sync_core::{BoundingBox, RemoteDataProvider};
//! use osm_sync_data::osm_api::{HttpOsmProvider, OsmApiConfig, OsmServer};
//!
//! let config = OsmApiConfig::for_server(OsmServer::Development)
//!     .with_timeout(Duration::from_secs(60))
//!     .with_user_agent("my-editor/1.0");
//! let provider = HttpOsmProvider::with_config(config)?;
//!
//! let bbox = BoundingBox::around(geo::Coord { x: 10.0, y: 50.0 }, 0.002);
//! let payload = provider.fetch(&bbox)?;
//! println!("downloaded {} bytes", payload.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! [`RemoteDataProvider`]: osm_sync_core::RemoteDataProvider

mod provider;

pub use provider::{
    DEFAULT_USER_AGENT, HttpOsmProvider, OsmApiConfig, OsmServer, ParseServerError,
    ProviderBuildError,
};
