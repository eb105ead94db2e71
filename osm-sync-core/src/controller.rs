//! Entry points used by the map UI.
//!
//! The controller turns viewport settle events into pipeline sessions run on
//! background threads, keeps the edited layers in step with the edit store and
//! reports everything through [`SyncObserver`]s. Nothing here returns an
//! error to the caller moving the map.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use geo::Coord;
use log::{debug, error};
use parking_lot::Mutex;

use crate::{
    BboxFetchPipeline, BoundingBox, Checkpoint, EditListener, EditStore, FeatureIndex,
    FormatConverter, GeometryLayerSet, PendingSession, PipelineParts, PublishReport,
    RemoteDataProvider, RenderSurface, SessionOutcome, StyleProvider, SyncConfig, SyncError,
    TapResolver,
};

/// Notification emitted by a [`SyncController`].
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A session started downloading; show the busy indicator.
    DownloadStarted {
        /// Operation id.
        operation: u64,
        /// Area requested first.
        bbox: BoundingBox,
    },
    /// A session published its data.
    DownloadFinished(PublishReport),
    /// A newer session replaced this one.
    DownloadSuperseded {
        /// Operation id.
        operation: u64,
        /// Where it stopped.
        checkpoint: Checkpoint,
    },
    /// A session failed.
    DownloadFailed {
        /// What went wrong.
        error: Arc<SyncError>,
    },
    /// The edited layers were rebuilt.
    EditsChanged {
        /// Created + modified + deleted features.
        badge: usize,
    },
}

/// Receives [`SyncEvent`]s, possibly from background threads.
pub trait SyncObserver: Send + Sync {
    /// Handle one event; must not block for long.
    fn on_sync_event(&self, event: &SyncEvent);
}

/// Collaborators injected into a [`SyncController`].
#[derive(Clone)]
pub struct SyncParts {
    /// Source of raw payloads.
    pub provider: Arc<dyn RemoteDataProvider>,
    /// Raw payload to GeoJSON converter.
    pub converter: Arc<dyn FormatConverter>,
    /// Surface the layers are drawn on.
    pub surface: Arc<dyn RenderSurface>,
    /// Styles per layer.
    pub styles: Arc<dyn StyleProvider>,
    /// Local edits; the controller subscribes to their changes.
    pub edits: Arc<dyn EditStore>,
}

/// Background session started by [`SyncController::check_map_center`].
#[derive(Debug)]
pub struct SessionHandle {
    operation: u64,
    handle: JoinHandle<Result<SessionOutcome, Arc<SyncError>>>,
}

impl SessionHandle {
    /// Operation id the session started with.
    #[must_use]
    pub const fn operation(&self) -> u64 {
        self.operation
    }

    /// Wait for the session to end.
    ///
    /// # Errors
    ///
    /// Returns the error already reported to observers, or
    /// [`SyncError::WorkerPanicked`] if the worker thread panicked.
    pub fn join(self) -> Result<SessionOutcome, Arc<SyncError>> {
        self.handle
            .join()
            .map_err(|_| Arc::new(SyncError::WorkerPanicked { worker: "session" }))?
    }
}

/// Glue between the map UI, the fetch pipeline and the edit store.
pub struct SyncController {
    pipeline: BboxFetchPipeline,
    edits: Arc<dyn EditStore>,
    observers: Mutex<Vec<Arc<dyn SyncObserver>>>,
    badge: AtomicUsize,
    active: AtomicUsize,
}

impl std::fmt::Debug for SyncController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncController")
            .field("pipeline", &self.pipeline)
            .field("badge", &self.badge)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl SyncController {
    /// Build a controller, subscribe it to the edit store and draw the edited
    /// layers once.
    #[must_use]
    pub fn new(config: SyncConfig, parts: SyncParts) -> Arc<Self> {
        let SyncParts {
            provider,
            converter,
            surface,
            styles,
            edits,
        } = parts;
        let layers = Arc::new(GeometryLayerSet::new(surface, styles));
        let pipeline = BboxFetchPipeline::new(
            config,
            PipelineParts {
                provider,
                converter,
                index: Arc::new(FeatureIndex::default()),
                layers,
            },
        );
        let controller = Arc::new(Self {
            pipeline,
            edits: Arc::clone(&edits),
            observers: Mutex::new(Vec::new()),
            badge: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
        });
        let listener: Arc<dyn EditListener> = controller.clone();
        edits.subscribe(Arc::downgrade(&listener));
        controller.refresh_edits();
        controller
    }

    /// Register an observer. Observers are called in registration order.
    pub fn subscribe(&self, observer: Arc<dyn SyncObserver>) {
        self.observers.lock().push(observer);
    }

    /// React to the viewport settling on `center`.
    ///
    /// Starts a background session when `center` is not covered by the live
    /// or last published area and returns its handle; otherwise returns
    /// `None`. Never blocks on I/O.
    pub fn check_map_center(self: &Arc<Self>, center: Coord<f64>) -> Option<SessionHandle> {
        let session = self.pipeline.on_viewport_changed(center)?;
        let operation = session.operation();
        self.active.fetch_add(1, Ordering::AcqRel);
        self.emit(&SyncEvent::DownloadStarted {
            operation,
            bbox: session.bbox(),
        });

        let controller = Arc::clone(self);
        let spawned = std::thread::Builder::new()
            .name(format!("osm-sync-session-{operation}"))
            .spawn(move || controller.run_session(session));
        match spawned {
            Ok(handle) => Some(SessionHandle { operation, handle }),
            Err(source) => {
                self.pipeline.cancel();
                self.finish(Err(Arc::new(SyncError::WorkerSpawn {
                    worker: "session",
                    source,
                })));
                None
            }
        }
    }

    /// Number of pending edits shown on the upload badge.
    #[must_use]
    pub fn badge_count(&self) -> usize {
        self.badge.load(Ordering::Acquire)
    }

    /// Whether any session is still running.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.active.load(Ordering::Acquire) > 0
    }

    /// Tap resolution over the current layers.
    #[must_use]
    pub fn tap_resolver(&self) -> TapResolver {
        TapResolver::new(Arc::clone(self.pipeline.layers()))
    }

    /// Index of the last published download.
    #[must_use]
    pub fn index(&self) -> &Arc<FeatureIndex> {
        self.pipeline.index()
    }

    /// Render layers.
    #[must_use]
    pub fn layers(&self) -> &Arc<GeometryLayerSet> {
        self.pipeline.layers()
    }

    /// Pipeline the controller drives.
    #[must_use]
    pub const fn pipeline(&self) -> &BboxFetchPipeline {
        &self.pipeline
    }

    fn run_session(&self, session: PendingSession) -> Result<SessionOutcome, Arc<SyncError>> {
        let result = self.pipeline.run(session).map_err(Arc::new);
        self.finish(result.clone());
        result
    }

    fn finish(&self, result: Result<SessionOutcome, Arc<SyncError>>) {
        self.active.fetch_sub(1, Ordering::AcqRel);
        let event = match result {
            Ok(SessionOutcome::Published(report)) => SyncEvent::DownloadFinished(report),
            Ok(SessionOutcome::Superseded {
                operation,
                checkpoint,
            }) => SyncEvent::DownloadSuperseded {
                operation,
                checkpoint,
            },
            Err(err) => {
                error!("synchronisation failed: {err}");
                SyncEvent::DownloadFailed { error: err }
            }
        };
        self.emit(&event);
    }

    fn refresh_edits(&self) {
        let partition = self.pipeline.layers().rebuild_edited_layers(&*self.edits);
        let badge = partition.modified.len() + partition.created.len() + self.edits.deleted().len();
        self.badge.store(badge, Ordering::Release);
        debug!("pending edits: {badge}");
        self.emit(&SyncEvent::EditsChanged { badge });
    }

    fn emit(&self, event: &SyncEvent) {
        let observers = self.observers.lock().clone();
        for observer in observers {
            observer.on_sync_event(event);
        }
    }
}

impl EditListener for SyncController {
    fn on_edit_store_changed(&self) {
        self.refresh_edits();
    }
}
