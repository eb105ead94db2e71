//! Identity lookup over the last downloaded server snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::{ElementRef, Feature};

type Snapshot = HashMap<ElementRef, Feature>;

/// Mapping from identity to feature, replaced wholesale on every download.
///
/// `load` swaps in a fully built table, so concurrent readers see either the
/// previous snapshot or the new one, never a mixture.
///
/// # Examples
/// ```
/// use geo::{Geometry, Point};
/// use osm_sync_core::{ElementRef, Feature, FeatureIndex, Provenance, Tags};
///
/// let index = FeatureIndex::default();
/// index.load(vec![Feature::new(
///     ElementRef::node(1),
///     Geometry::Point(Point::new(0.0, 0.0)),
///     Tags::new(),
///     Provenance::Server,
/// )]);
/// assert!(index.get(ElementRef::node(1)).is_some());
/// assert!(index.get(ElementRef::way(1)).is_none());
/// ```
#[derive(Debug, Default)]
pub struct FeatureIndex {
    snapshot: ArcSwap<Snapshot>,
}

impl FeatureIndex {
    /// Replace the whole index with `features`.
    ///
    /// When several features share an identity the last one wins.
    pub fn load<I>(&self, features: I)
    where
        I: IntoIterator<Item = Feature>,
    {
        let table: Snapshot = features
            .into_iter()
            .map(|feature| (feature.id, feature))
            .collect();
        self.snapshot.store(Arc::new(table));
    }

    /// Look up a feature by identity.
    #[must_use]
    pub fn get(&self, id: ElementRef) -> Option<Feature> {
        self.snapshot.load().get(&id).cloned()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.snapshot.store(Arc::new(Snapshot::new()));
    }

    /// Number of indexed features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    /// Whether nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshot.load().is_empty()
    }

    /// Identities of every indexed feature, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<ElementRef> {
        let mut ids: Vec<_> = self.snapshot.load().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Features whose tags contain `key`, sorted by identity.
    #[must_use]
    pub fn with_tag(&self, key: &str) -> Vec<Feature> {
        let mut found: Vec<_> = self
            .snapshot
            .load()
            .values()
            .filter(|feature| feature.tags.contains_key(key))
            .cloned()
            .collect();
        found.sort_by_key(|feature| feature.id);
        found
    }
}
