//! Render layers for server data and local edits.
//!
//! Three named layers are drawn on the rendering surface:
//! - `source`: the last published server snapshot;
//! - `modified`: server features with local edits;
//! - `created`: features created locally.
//!
//! Alongside the layers, a flat hit-test collection holds every geometry
//! tagged with its identity for tap resolution.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use geo::Geometry;
use log::debug;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{EditPartition, EditStore, ElementRef, Feature, Style, StyleProvider};

/// Name of a render layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerName {
    /// Features of the last published download.
    Source,
    /// Server features carrying local edits.
    Modified,
    /// Features created locally and not yet uploaded.
    Created,
}

impl LayerName {
    /// All layers in draw order.
    pub const ALL: [Self; 3] = [Self::Source, Self::Modified, Self::Created];

    /// Layers with a higher draw order are drawn on top.
    #[must_use]
    pub const fn draw_order(self) -> u8 {
        match self {
            Self::Source => 0,
            Self::Modified => 1,
            Self::Created => 2,
        }
    }

    /// Lowercase name used by styles and reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Modified => "modified",
            Self::Created => "created",
        }
    }
}

impl fmt::Display for LayerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Surface that draws named layers of styled geometry.
pub trait RenderSurface: Send + Sync {
    /// Make `layer` visible.
    fn add_layer(&self, layer: LayerName);
    /// Hide `layer`.
    fn remove_layer(&self, layer: LayerName);
    /// Replace the geometry drawn for `layer`.
    fn set_layer_geometry(&self, layer: LayerName, features: &[Feature], style: &Style);
}

/// One entry of the hit-test collection.
///
/// Every drawn geometry gets an entry, areas included. Closed ways that the
/// converter turns into polygons are kept here but are never returned by tap
/// resolution, which only matches point-like and line-like geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct HitTarget {
    /// Identity of the feature the geometry belongs to.
    pub id: ElementRef,
    /// Layer the geometry is drawn on.
    pub layer: LayerName,
    /// Geometry as drawn.
    pub geometry: Geometry<f64>,
}

#[derive(Debug, Default)]
struct LayerContents {
    source: Vec<Feature>,
    modified: Vec<Feature>,
    created: Vec<Feature>,
}

impl LayerContents {
    fn get(&self, layer: LayerName) -> &[Feature] {
        match layer {
            LayerName::Source => &self.source,
            LayerName::Modified => &self.modified,
            LayerName::Created => &self.created,
        }
    }

    fn slot(&mut self, layer: LayerName) -> &mut Vec<Feature> {
        match layer {
            LayerName::Source => &mut self.source,
            LayerName::Modified => &mut self.modified,
            LayerName::Created => &mut self.created,
        }
    }

    fn hit_targets(&self) -> Vec<HitTarget> {
        LayerName::ALL
            .into_iter()
            .flat_map(|layer| {
                self.get(layer).iter().map(move |feature| HitTarget {
                    id: feature.id,
                    layer,
                    geometry: feature.geometry.clone(),
                })
            })
            .collect()
    }
}

/// The three render layers plus the flat hit-test collection.
///
/// Owns presentation only: what is drawn and with which style. Fetching and
/// merging happen elsewhere.
pub struct GeometryLayerSet {
    surface: Arc<dyn RenderSurface>,
    styles: Arc<dyn StyleProvider>,
    contents: Mutex<LayerContents>,
    hit_targets: ArcSwap<Vec<HitTarget>>,
}

impl fmt::Debug for GeometryLayerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeometryLayerSet")
            .field("contents", &*self.contents.lock())
            .field("surface", &"<dyn RenderSurface>")
            .field("styles", &"<dyn StyleProvider>")
            .finish_non_exhaustive()
    }
}

impl GeometryLayerSet {
    /// Create an empty layer set drawing onto `surface` with `styles`.
    #[must_use]
    pub fn new(surface: Arc<dyn RenderSurface>, styles: Arc<dyn StyleProvider>) -> Self {
        Self {
            surface,
            styles,
            contents: Mutex::new(LayerContents::default()),
            hit_targets: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Replace the contents of `layer` and redraw it.
    pub fn set_layer(&self, layer: LayerName, features: Vec<Feature>) {
        let mut contents = self.contents.lock();
        self.draw(layer, &features);
        *contents.slot(layer) = features;
        self.hit_targets.store(Arc::new(contents.hit_targets()));
    }

    /// Rebuild `modified` and `created` from the edit store's saved features.
    ///
    /// Returns the partition that was drawn.
    pub fn rebuild_edited_layers(&self, store: &dyn EditStore) -> EditPartition {
        let partition = EditPartition::from_saved(&store.saved());
        let mut contents = self.contents.lock();
        self.draw(LayerName::Modified, &partition.modified);
        self.draw(LayerName::Created, &partition.created);
        contents.modified.clone_from(&partition.modified);
        contents.created.clone_from(&partition.created);
        self.hit_targets.store(Arc::new(contents.hit_targets()));
        debug!(
            "rebuilt edited layers: {} modified, {} created",
            partition.modified.len(),
            partition.created.len()
        );
        partition
    }

    /// Current contents of `layer`.
    #[must_use]
    pub fn layer(&self, layer: LayerName) -> Vec<Feature> {
        self.contents.lock().get(layer).to_vec()
    }

    /// Snapshot of the flat hit-test collection.
    #[must_use]
    pub fn hit_targets(&self) -> Arc<Vec<HitTarget>> {
        self.hit_targets.load_full()
    }

    fn draw(&self, layer: LayerName, features: &[Feature]) {
        let style = self.styles.style(layer);
        self.surface.remove_layer(layer);
        self.surface.set_layer_geometry(layer, features, &style);
        self.surface.add_layer(layer);
    }
}
