//! Read access to unsynchronised local edits.
//!
//! The edit store is durable on its own; the synchronisation core only reads
//! it and reacts to its change notifications.

use std::collections::BTreeMap;
use std::sync::Weak;

use crate::{ElementRef, Feature, Provenance};

/// Edited features keyed by identity.
pub type EditMap = BTreeMap<ElementRef, Feature>;

/// Receives change notifications from an [`EditStore`].
pub trait EditListener: Send + Sync {
    /// Called after the store's contents changed and were persisted.
    fn on_edit_store_changed(&self);
}

/// Persistent store of user-created, modified and deleted features.
///
/// Implementations notify subscribed listeners synchronously, in
/// subscription order, after every mutation. Listeners that have been dropped
/// are skipped.
pub trait EditStore: Send + Sync {
    /// Created and modified features.
    fn saved(&self) -> EditMap;

    /// Features marked for deletion.
    fn deleted(&self) -> EditMap;

    /// Register a listener for change notifications.
    fn subscribe(&self, listener: Weak<dyn EditListener>);

    /// Number of pending edits: created + modified + deleted.
    fn pending_count(&self) -> usize {
        self.saved().len() + self.deleted().len()
    }
}

/// Saved edits split by the sign of their id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditPartition {
    /// Overlays over server features (`id >= 0`).
    pub modified: Vec<Feature>,
    /// Features that never existed on the server (`id < 0`).
    pub created: Vec<Feature>,
}

impl EditPartition {
    /// Partition `saved` by identity sign, labelling each feature's provenance.
    ///
    /// # Examples
    /// ```
    /// use geo::{Geometry, Point};
    /// use osm_sync_core::{EditMap, EditPartition, ElementRef, Feature, Provenance, Tags};
    ///
    /// let feature = |id| Feature::new(
    ///     ElementRef::node(id),
    ///     Geometry::Point(Point::new(0.0, 0.0)),
    ///     Tags::new(),
    ///     Provenance::Server,
    /// );
    /// let saved = EditMap::from([
    ///     (ElementRef::node(-1), feature(-1)),
    ///     (ElementRef::node(7), feature(7)),
    /// ]);
    /// let partition = EditPartition::from_saved(&saved);
    /// assert_eq!(partition.created[0].provenance, Provenance::LocallyCreated);
    /// assert_eq!(partition.modified[0].provenance, Provenance::LocallyModified);
    /// ```
    #[must_use]
    pub fn from_saved(saved: &EditMap) -> Self {
        let mut partition = Self::default();
        for (id, feature) in saved {
            // The map key is authoritative for identity.
            let mut feature = feature.clone();
            feature.id = *id;
            if id.is_local() {
                partition
                    .created
                    .push(feature.with_provenance(Provenance::LocallyCreated));
            } else {
                partition
                    .modified
                    .push(feature.with_provenance(Provenance::LocallyModified));
            }
        }
        partition
    }
}
