//! Facade crate for OSM viewport synchronisation.
//!
//! This crate re-exports the synchronisation core and, behind the `http`
//! feature, the standard HTTP, `osmium` and JSON edit store adapters.

#![forbid(unsafe_code)]

pub use osm_sync_core::{
    BboxFetchPipeline, BoundingBox, BuiltinConverter, Checkpoint, ConfigError, ConversionError,
    DEFAULT_HALF_EXTENT, DEFAULT_MIN_HALF_EXTENT, DEFAULT_SHRINK_FACTOR, DecodeError,
    DefaultStyles, EditListener, EditMap, EditPartition, EditStore, ElementKind, ElementRef,
    Feature, FeatureIndex, FetchError, FormatConverter, GenerationClock, GeometryKind,
    GeometryLayerSet, HitTarget, LayerName, OsmDocument, ParseElementError, PendingSession,
    PipelineParts, Provenance, PublishReport, RawPayload, RemoteDataProvider, RenderSurface,
    STAGED_INPUT_NAME, STAGED_OUTPUT_NAME, SessionHandle, SessionOutcome, SessionToken, Style,
    StyleProvider, SyncConfig, SyncController, SyncError, SyncEvent, SyncObserver, SyncParts,
    Tags, TapResolver, decode_geojson, encode_geojson, resolve_targets,
};

#[cfg(feature = "http")]
pub use osm_sync_data::{
    EditStoreError, HttpOsmProvider, JsonEditStore, OsmApiConfig, OsmServer, OsmiumConverter,
    ProviderBuildError,
};
