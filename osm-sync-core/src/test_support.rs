//! Deterministic collaborators for unit and behaviour tests.
//!
//! None of these types perform network or process I/O; they record what the
//! pipeline asked of them so tests can assert on it.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;

use camino::Utf8Path;
use geo::{Geometry, Point};
use parking_lot::{Condvar, Mutex};

use crate::{
    BoundingBox, ConversionError, EditListener, EditMap, EditStore, ElementRef, Feature,
    FetchError, FormatConverter, LayerName, Provenance, RawPayload, RemoteDataProvider,
    RenderSurface, Style, SyncEvent, SyncObserver, Tags,
};

/// A tagged point feature with server provenance.
#[must_use]
pub fn point_feature(id: ElementRef, x: f64, y: f64) -> Feature {
    Feature::new(
        id,
        Geometry::Point(Point::new(x, y)),
        Tags::from([("test".to_owned(), "yes".to_owned())]),
        Provenance::Server,
    )
}

/// OSM XML payload containing one tagged node per `(id, lon, lat)` triple.
///
/// # Examples
/// ```
/// use osm_sync_core::OsmDocument;
/// use osm_sync_core::test_support::osm_xml_nodes;
///
/// let xml = osm_xml_nodes(&[(1, 10.0, 50.0), (2, 10.001, 50.0)]);
/// let document = OsmDocument::parse(xml.as_bytes()).expect("valid payload");
/// assert_eq!(document.node_features().len(), 2);
/// ```
#[must_use]
pub fn osm_xml_nodes(nodes: &[(i64, f64, f64)]) -> String {
    let body: String = nodes
        .iter()
        .map(|(id, lon, lat)| {
            format!(
                "  <node id=\"{id}\" lat=\"{lat}\" lon=\"{lon}\">\
                 <tag k=\"amenity\" v=\"bench\"/></node>\n"
            )
        })
        .collect();
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<osm version=\"0.6\">\n{body}</osm>\n")
}

type Response = Result<RawPayload, FetchError>;

/// Provider replaying a queue of responses in order.
///
/// Once the queue is empty every request fails with a network error.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<Response>>,
    requests: Mutex<Vec<BoundingBox>>,
}

impl ScriptedProvider {
    /// Replay `responses` in order.
    #[must_use]
    pub fn new<I>(responses: I) -> Self
    where
        I: IntoIterator<Item = Response>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A provider rejecting the first `rejections` requests as too large and
    /// then answering with `payload`.
    #[must_use]
    pub fn rejecting(rejections: usize, payload: impl Into<RawPayload>) -> Self {
        let rejections = (0..rejections).map(|_| {
            Err(FetchError::ObjectLimitExceeded {
                message: "You requested too many nodes".to_owned(),
            })
        });
        Self::new(rejections.chain(std::iter::once(Ok(payload.into()))))
    }

    /// Queue another response.
    pub fn push(&self, response: Response) {
        self.responses.lock().push_back(response);
    }

    /// Every area requested so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<BoundingBox> {
        self.requests.lock().clone()
    }
}

impl RemoteDataProvider for ScriptedProvider {
    fn fetch(&self, bbox: &BoundingBox) -> Result<RawPayload, FetchError> {
        self.requests.lock().push(*bbox);
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| {
                Err(FetchError::Network {
                    url: "scripted://provider".to_owned(),
                    message: "no scripted response left".to_owned(),
                })
            })
    }
}

#[derive(Debug, Default)]
struct Gate {
    entered: bool,
    released: bool,
}

/// Provider whose first request blocks until [`GatedProvider::release`].
///
/// Later requests pass straight through to the scripted responses, which
/// makes it possible to start a newer session while an older one is stuck in
/// its download.
#[derive(Debug, Default)]
pub struct GatedProvider {
    inner: ScriptedProvider,
    gate: Mutex<Gate>,
    changed: Condvar,
}

impl GatedProvider {
    /// Gate the first of `responses`.
    #[must_use]
    pub fn new<I>(responses: I) -> Self
    where
        I: IntoIterator<Item = Response>,
    {
        Self {
            inner: ScriptedProvider::new(responses),
            gate: Mutex::new(Gate::default()),
            changed: Condvar::new(),
        }
    }

    /// Wait until the gated request has arrived. Returns `false` on timeout.
    pub fn wait_until_entered(&self, timeout: Duration) -> bool {
        let mut gate = self.gate.lock();
        if !gate.entered {
            let _timed_out = self
                .changed
                .wait_while_for(&mut gate, |gate| !gate.entered, timeout);
        }
        gate.entered
    }

    /// Let the gated request complete.
    pub fn release(&self) {
        self.gate.lock().released = true;
        self.changed.notify_all();
    }

    /// Every area requested so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<BoundingBox> {
        self.inner.requests()
    }
}

impl RemoteDataProvider for GatedProvider {
    fn fetch(&self, bbox: &BoundingBox) -> Result<RawPayload, FetchError> {
        let mut gate = self.gate.lock();
        if gate.entered {
            drop(gate);
            return self.inner.fetch(bbox);
        }
        // Take the first response before announcing entry so later requests
        // see the rest of the queue.
        let response = self.inner.fetch(bbox);
        gate.entered = true;
        self.changed.notify_all();
        self.changed.wait_while(&mut gate, |gate| !gate.released);
        response
    }
}

/// Call made on a [`RecordingSurface`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceCall {
    /// Layer attached.
    Add(LayerName),
    /// Layer detached.
    Remove(LayerName),
    /// Geometry replaced; carries the identities drawn.
    SetGeometry(LayerName, Vec<ElementRef>),
}

/// Render surface that records every call.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    calls: Mutex<Vec<SurfaceCall>>,
}

impl RecordingSurface {
    /// Calls received so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.calls.lock().clone()
    }

    /// Identities most recently drawn on `layer`.
    #[must_use]
    pub fn drawn(&self, layer: LayerName) -> Vec<ElementRef> {
        self.calls
            .lock()
            .iter()
            .rev()
            .find_map(|call| match call {
                SurfaceCall::SetGeometry(drawn, ids) if *drawn == layer => Some(ids.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }
}

impl RenderSurface for RecordingSurface {
    fn add_layer(&self, layer: LayerName) {
        self.calls.lock().push(SurfaceCall::Add(layer));
    }

    fn remove_layer(&self, layer: LayerName) {
        self.calls.lock().push(SurfaceCall::Remove(layer));
    }

    fn set_layer_geometry(&self, layer: LayerName, features: &[Feature], _style: &Style) {
        let ids = features.iter().map(|feature| feature.id).collect();
        self.calls.lock().push(SurfaceCall::SetGeometry(layer, ids));
    }
}

/// In-memory edit store notifying listeners after each mutation.
#[derive(Default)]
pub struct MemoryEditStore {
    saved: Mutex<EditMap>,
    deleted: Mutex<EditMap>,
    listeners: Mutex<Vec<Weak<dyn EditListener>>>,
}

impl std::fmt::Debug for MemoryEditStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEditStore")
            .field("saved", &*self.saved.lock())
            .field("deleted", &*self.deleted.lock())
            .finish_non_exhaustive()
    }
}

impl MemoryEditStore {
    /// Save a created or modified feature under its own identity.
    pub fn save(&self, feature: Feature) {
        self.saved.lock().insert(feature.id, feature);
        self.notify();
    }

    /// Mark a feature for deletion.
    pub fn mark_deleted(&self, feature: Feature) {
        let feature = feature.with_provenance(Provenance::MarkedForDeletion);
        self.deleted.lock().insert(feature.id, feature);
        self.notify();
    }

    /// Forget any saved or deleted state for `id`.
    pub fn discard(&self, id: ElementRef) {
        self.saved.lock().remove(&id);
        self.deleted.lock().remove(&id);
        self.notify();
    }

    fn notify(&self) {
        let listeners: Vec<Arc<dyn EditListener>> = {
            let mut listeners = self.listeners.lock();
            listeners.retain(|listener| listener.strong_count() > 0);
            listeners.iter().filter_map(Weak::upgrade).collect()
        };
        for listener in listeners {
            listener.on_edit_store_changed();
        }
    }
}

impl EditStore for MemoryEditStore {
    fn saved(&self) -> EditMap {
        self.saved.lock().clone()
    }

    fn deleted(&self) -> EditMap {
        self.deleted.lock().clone()
    }

    fn subscribe(&self, listener: Weak<dyn EditListener>) {
        self.listeners.lock().push(listener);
    }
}

/// Converter that always fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingConverter;

impl FormatConverter for FailingConverter {
    fn convert(&self, _input: &Utf8Path, _output: &Utf8Path) -> Result<(), ConversionError> {
        Err(ConversionError::ToolFailed {
            program: "failing-converter".to_owned(),
            status: "exit status: 1".to_owned(),
            stderr: "conversion refused".to_owned(),
        })
    }
}

/// Observer that keeps every event it receives.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<SyncEvent>>,
}

impl RecordingObserver {
    /// Events received so far, in order.
    #[must_use]
    pub fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().clone()
    }
}

impl SyncObserver for RecordingObserver {
    fn on_sync_event(&self, event: &SyncEvent) {
        self.events.lock().push(event.clone());
    }
}
