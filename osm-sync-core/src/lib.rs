//! Synchronisation core for an OpenStreetMap editor.
//!
//! The crate keeps a local working set of map features consistent with a
//! moving viewport. Viewport changes drive the [`BboxFetchPipeline`], which
//! downloads raw OSM data for a bounding box, converts and decodes it, and
//! publishes the result into a [`FeatureIndex`] and the `source` layer of a
//! [`GeometryLayerSet`]. Local edits from an [`EditStore`] are layered on top
//! as `modified` and `created` layers, and [`TapResolver`] answers which
//! features lie under a tap.
//!
//! Network, conversion, rendering and persistence are collaborator traits so
//! hosts can plug in their own implementations; `osm-sync-data` provides the
//! standard ones.

mod bbox;
mod codec;
mod config;
mod controller;
mod convert;
mod edits;
mod feature;
mod index;
mod layers;
mod pipeline;
mod provider;
mod style;
mod tap;

#[doc(hidden)]
pub mod test_support;

pub use bbox::BoundingBox;
pub use codec::{DecodeError, OsmDocument, decode_geojson, encode_geojson};
pub use config::{
    ConfigError, DEFAULT_HALF_EXTENT, DEFAULT_MIN_HALF_EXTENT, DEFAULT_SHRINK_FACTOR,
    STAGED_INPUT_NAME, STAGED_OUTPUT_NAME, SyncConfig,
};
pub use controller::{SessionHandle, SyncController, SyncEvent, SyncObserver, SyncParts};
pub use convert::{BuiltinConverter, ConversionError, FormatConverter};
pub use edits::{EditListener, EditMap, EditPartition, EditStore};
pub use feature::{ElementKind, ElementRef, Feature, ParseElementError, Provenance, Tags};
pub use index::FeatureIndex;
pub use layers::{GeometryLayerSet, HitTarget, LayerName, RenderSurface};
pub use pipeline::{
    BboxFetchPipeline, Checkpoint, GenerationClock, PendingSession, PipelineParts,
    PublishReport, SessionOutcome, SessionToken, SyncError,
};
pub use provider::{FetchError, RawPayload, RemoteDataProvider};
pub use style::{DefaultStyles, Style, StyleProvider};
pub use tap::{GeometryKind, TapResolver, resolve_targets};
