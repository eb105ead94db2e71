//! Bounding-box download pipeline.
//!
//! A session moves through `fetching → converting → indexing → published`.
//! Each session owns a [`SessionToken`]; starting a newer session or retrying
//! after an object-limit rejection advances the [`GenerationClock`] and so
//! invalidates every older token. Work checks its token at each stage
//! boundary and stops silently once superseded.
//!
//! Pipeline state (half-extent, published baseline, in-flight session) lives
//! behind one lock. Every check-and-act sequence on it, including the final
//! publish of the index and the source layer, runs while holding that lock.
//! The staging files have a lock of their own so the caller deciding whether
//! to start a session never waits behind a conversion.

mod error;
mod generation;
mod stages;
#[cfg(test)]
mod tests;

use std::sync::Arc;

use geo::Coord;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;

pub use error::SyncError;
pub use generation::{GenerationClock, SessionToken};
use stages::{Stage, index_payload, stage_and_convert};

use crate::{
    BoundingBox, FeatureIndex, FetchError, FormatConverter, GeometryLayerSet, LayerName,
    RawPayload, RemoteDataProvider, SyncConfig,
};

/// Stage boundary at which a superseded session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Checkpoint {
    /// Before the first request was sent.
    BeforeFetch,
    /// After the provider returned a payload.
    Fetched,
    /// While shrinking the area after an object-limit rejection.
    Retry,
    /// After the payload was written to the staging slot.
    Staged,
    /// After the converter finished.
    Converted,
    /// After the converted payload was decoded.
    Decoded,
    /// Inside the background indexer.
    Indexing,
    /// Immediately before publishing.
    Publish,
}

/// Summary of a published session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishReport {
    /// Id of the operation that published.
    pub operation: u64,
    /// Area that was downloaded.
    pub bbox: BoundingBox,
    /// Entries in the feature index after the swap.
    pub indexed: usize,
    /// Geometries drawn on the source layer.
    pub rendered: usize,
    /// Requests sent, including rejected ones.
    pub attempts: u32,
}

/// How a session ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SessionOutcome {
    /// The session's data is now visible.
    Published(PublishReport),
    /// A newer session invalidated this one; nothing was published.
    Superseded {
        /// Id of the operation that stopped.
        operation: u64,
        /// Where it stopped.
        checkpoint: Checkpoint,
    },
}

/// A session that has been started but not yet run.
#[derive(Debug, Clone)]
pub struct PendingSession {
    center: Coord<f64>,
    token: SessionToken,
    bbox: BoundingBox,
}

impl PendingSession {
    /// Operation id of the first request.
    #[must_use]
    pub const fn operation(&self) -> u64 {
        self.token.generation()
    }

    /// Area of the first request.
    #[must_use]
    pub const fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    /// Whether no newer session has been started.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.token.is_live()
    }
}

struct Fetched {
    payload: RawPayload,
    bbox: BoundingBox,
    token: SessionToken,
    attempts: u32,
}

enum FetchEnd {
    Fetched(Fetched),
    Superseded(Checkpoint, SessionToken),
    Failed(SyncError, SessionToken),
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    center: Coord<f64>,
    generation: u64,
}

#[derive(Debug)]
struct PipelineState {
    half_extent: f64,
    published: Option<Coord<f64>>,
    in_flight: Option<InFlight>,
}

/// Collaborators wired into a [`BboxFetchPipeline`].
#[derive(Clone)]
pub struct PipelineParts {
    /// Remote source of raw payloads.
    pub provider: Arc<dyn RemoteDataProvider>,
    /// Raw payload to GeoJSON converter.
    pub converter: Arc<dyn FormatConverter>,
    /// Index replaced on every publish.
    pub index: Arc<FeatureIndex>,
    /// Layers whose `source` layer is replaced on every publish.
    pub layers: Arc<GeometryLayerSet>,
}

/// State machine coordinating viewport changes, retries and cancellation.
pub struct BboxFetchPipeline {
    config: SyncConfig,
    parts: PipelineParts,
    clock: GenerationClock,
    state: Mutex<PipelineState>,
    staging: Mutex<()>,
}

impl std::fmt::Debug for BboxFetchPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BboxFetchPipeline")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl BboxFetchPipeline {
    /// Create an idle pipeline.
    #[must_use]
    pub fn new(config: SyncConfig, parts: PipelineParts) -> Self {
        let state = PipelineState {
            half_extent: config.initial_half_extent(),
            published: None,
            in_flight: None,
        };
        Self {
            config,
            parts,
            clock: GenerationClock::new(),
            state: Mutex::new(state),
            staging: Mutex::new(()),
        }
    }

    /// Decide whether `center` needs a new session and start it if so.
    ///
    /// Returns `None` when `center` lies inside the area of the live
    /// in-flight session or, with nothing in flight, inside the last
    /// published area. Starting a session invalidates every older operation.
    /// No I/O happens here.
    pub fn on_viewport_changed(&self, center: Coord<f64>) -> Option<PendingSession> {
        let mut state = self.state.lock();
        let live_in_flight = state
            .in_flight
            .filter(|in_flight| in_flight.generation == self.clock.current());
        let covered = live_in_flight.map_or(state.published, |in_flight| Some(in_flight.center));
        if let Some(covered) = covered
            && BoundingBox::around(covered, state.half_extent).contains(center)
        {
            debug!("viewport centre {center:?} already covered");
            return None;
        }

        let token = self.clock.advance();
        state.in_flight = Some(InFlight {
            center,
            generation: token.generation(),
        });
        let bbox = BoundingBox::around(center, state.half_extent);
        debug!("operation {}: new session for {bbox}", token.generation());
        Some(PendingSession {
            center,
            token,
            bbox,
        })
    }

    /// Run a started session to completion on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns a [`SyncError`] for transport, staging, conversion and decode
    /// failures, and when the area cannot shrink any further.
    pub fn run(&self, session: PendingSession) -> Result<SessionOutcome, SyncError> {
        let PendingSession { center, token, .. } = session;
        let (result, last_token) = self.run_session(center, token);
        let mut state = self.state.lock();
        if state
            .in_flight
            .is_some_and(|in_flight| in_flight.generation == last_token.generation())
        {
            state.in_flight = None;
        }
        result
    }

    /// Start and run a session for `center` if one is needed.
    ///
    /// # Errors
    ///
    /// See [`BboxFetchPipeline::run`].
    pub fn sync(&self, center: Coord<f64>) -> Result<Option<SessionOutcome>, SyncError> {
        self.on_viewport_changed(center)
            .map(|session| self.run(session))
            .transpose()
    }

    /// Invalidate every outstanding operation.
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        self.clock.invalidate();
        state.in_flight = None;
    }

    /// Current adaptive half-extent.
    #[must_use]
    pub fn half_extent(&self) -> f64 {
        self.state.lock().half_extent
    }

    /// Centre of the last published session.
    #[must_use]
    pub fn published_center(&self) -> Option<Coord<f64>> {
        self.state.lock().published
    }

    /// Id of the most recently started operation.
    #[must_use]
    pub fn current_operation(&self) -> u64 {
        self.clock.current()
    }

    /// Configuration the pipeline was built with.
    #[must_use]
    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Index replaced on every publish.
    #[must_use]
    pub fn index(&self) -> &Arc<FeatureIndex> {
        &self.parts.index
    }

    /// Layers whose `source` layer is replaced on every publish.
    #[must_use]
    pub fn layers(&self) -> &Arc<GeometryLayerSet> {
        &self.parts.layers
    }

    fn run_session(
        &self,
        center: Coord<f64>,
        token: SessionToken,
    ) -> (Result<SessionOutcome, SyncError>, SessionToken) {
        let fetched = match self.fetch_with_retry(center, token) {
            FetchEnd::Fetched(fetched) => fetched,
            FetchEnd::Superseded(checkpoint, token) => {
                return (Ok(superseded(&token, checkpoint)), token);
            }
            FetchEnd::Failed(err, token) => return (Err(err), token),
        };
        if !fetched.token.is_live() {
            return (
                Ok(superseded(&fetched.token, Checkpoint::Fetched)),
                fetched.token,
            );
        }
        let result = self.convert_index_publish(&fetched, center);
        (result, fetched.token)
    }

    /// Fetch `center ± half_extent`, shrinking and retrying on object-limit
    /// rejections until the server accepts, the session is superseded or the
    /// floor is reached.
    fn fetch_with_retry(&self, center: Coord<f64>, mut token: SessionToken) -> FetchEnd {
        let mut attempts = 0_u32;
        loop {
            let bbox = {
                let state = self.state.lock();
                if !token.is_live() {
                    return FetchEnd::Superseded(Checkpoint::BeforeFetch, token);
                }
                BoundingBox::around(center, state.half_extent)
            };
            attempts += 1;
            debug!(
                "operation {}: requesting {bbox} (attempt {attempts})",
                token.generation()
            );
            match self.parts.provider.fetch(&bbox) {
                Ok(payload) => {
                    return FetchEnd::Fetched(Fetched {
                        payload,
                        bbox,
                        token,
                        attempts,
                    });
                }
                Err(FetchError::ObjectLimitExceeded { message }) => {
                    let mut state = self.state.lock();
                    if !token.is_live() {
                        return FetchEnd::Superseded(Checkpoint::Retry, token);
                    }
                    let Some(next) = self.config.shrunk(state.half_extent) else {
                        let half_extent = state.half_extent;
                        return FetchEnd::Failed(SyncError::HalfExtentExhausted { half_extent }, token);
                    };
                    warn!(
                        "operation {}: object limit exceeded ({message}); half-extent {} -> {next}",
                        token.generation(),
                        state.half_extent
                    );
                    state.half_extent = next;
                    token = self.clock.advance();
                    state.in_flight = Some(InFlight {
                        center,
                        generation: token.generation(),
                    });
                }
                Err(source) => return FetchEnd::Failed(SyncError::Transport { bbox, source }, token),
            }
        }
    }

    fn convert_index_publish(
        &self,
        fetched: &Fetched,
        center: Coord<f64>,
    ) -> Result<SessionOutcome, SyncError> {
        let Fetched {
            payload,
            bbox,
            token,
            attempts,
        } = fetched;
        let (rendered, indexed) = std::thread::scope(|scope| {
            let indexer = std::thread::Builder::new()
                .name(format!("osm-sync-index-{}", token.generation()))
                .spawn_scoped(scope, || index_payload(payload, token))
                .map_err(|source| SyncError::WorkerSpawn {
                    worker: "indexer",
                    source,
                })?;
            let rendered = {
                let _slot = self.staging.lock();
                stage_and_convert(&self.config, &*self.parts.converter, payload, token)
            };
            let indexed = indexer.join().map_err(|_| SyncError::WorkerPanicked {
                worker: "indexer",
            })?;
            Ok::<_, SyncError>((rendered?, indexed?))
        })?;

        let rendered = match rendered {
            Stage::Done(features) => features,
            Stage::Superseded(checkpoint) => return Ok(superseded(token, checkpoint)),
        };
        let indexed = match indexed {
            Stage::Done(features) => features,
            Stage::Superseded(checkpoint) => return Ok(superseded(token, checkpoint)),
        };

        let mut state = self.state.lock();
        if !token.is_live() {
            return Ok(superseded(token, Checkpoint::Publish));
        }
        self.parts.index.load(indexed);
        let report = PublishReport {
            operation: token.generation(),
            bbox: *bbox,
            indexed: self.parts.index.len(),
            rendered: rendered.len(),
            attempts: *attempts,
        };
        self.parts.layers.set_layer(LayerName::Source, rendered);
        state.published = Some(center);
        state.in_flight = None;
        info!(
            "operation {}: published {} indexed and {} rendered features for {bbox}",
            report.operation, report.indexed, report.rendered
        );
        Ok(SessionOutcome::Published(report))
    }
}

fn superseded(token: &SessionToken, checkpoint: Checkpoint) -> SessionOutcome {
    warn!(
        "operation {}: superseded at {checkpoint:?}",
        token.generation()
    );
    SessionOutcome::Superseded {
        operation: token.generation(),
        checkpoint,
    }
}
