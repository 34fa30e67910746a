//! Reference tracking for non-serializable objects
//!
//! Objects that cannot be written as JSON (live tables, host handles) are sent
//! out-of-band and referred to in the document by a small integer index. The
//! [`Exporter`] assigns those indices and tracks, pass by pass, which objects
//! the client has to learn about and which ones it can forget.
//!
//! Each encode pass marks the objects it references. Ending the pass with
//! [`Exporter::references`] reports the objects first seen in the pass and
//! evicts those the pass did not reference. An evicted object that shows up
//! again gets a new index; indices are never reused. [`Exporter::pending`]
//! previews the report so the pass can be committed only once the client has
//! actually received it.

use std::fmt;

use rustc_hash::FxHashMap;
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;

use plinth_core::{ObjectId, ObjectRef};

new_key_type! {
    struct ExportKey;
}

/// Wire identity of an exported object
#[derive(Clone, Debug, PartialEq)]
pub struct Reference {
    pub index: u32,
    pub object: ObjectRef,
}

/// Changes to the exported set produced by one encode pass
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReferenceDelta {
    /// Objects first referenced in this pass, in index order
    pub new_objects: Vec<ObjectRef>,
    /// Indices of `new_objects`, position for position
    pub new_reference_ids: Vec<u32>,
    /// Indices the client can release
    pub removed_reference_ids: Vec<u32>,
}

impl ReferenceDelta {
    pub fn is_empty(&self) -> bool {
        self.new_objects.is_empty() && self.removed_reference_ids.is_empty()
    }
}

struct ExportEntry {
    index: u32,
    object: ObjectRef,
    used: bool,
}

/// Per-connection object table
pub struct Exporter {
    entries: SlotMap<ExportKey, ExportEntry>,
    by_object: FxHashMap<ObjectId, ExportKey>,
    by_index: FxHashMap<u32, ExportKey>,
    added: SmallVec<[ExportKey; 8]>,
    next_index: u32,
}

impl Default for Exporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Exporter {
    pub fn new() -> Self {
        Self {
            entries: SlotMap::with_key(),
            by_object: FxHashMap::default(),
            by_index: FxHashMap::default(),
            added: SmallVec::new(),
            next_index: 0,
        }
    }

    /// Reference `object` in the current pass
    ///
    /// The same object keeps the same index for as long as every pass
    /// references it.
    pub fn reference(&mut self, object: &ObjectRef) -> Reference {
        if let Some(entry) = self
            .by_object
            .get(&object.id())
            .and_then(|key| self.entries.get_mut(*key))
        {
            entry.used = true;
            return Reference {
                index: entry.index,
                object: entry.object.clone(),
            };
        }

        let index = self.next_index;
        self.next_index += 1;
        let key = self.entries.insert(ExportEntry {
            index,
            object: object.clone(),
            used: true,
        });
        self.by_object.insert(object.id(), key);
        self.by_index.insert(index, key);
        self.added.push(key);

        tracing::trace!(index, object_type = object.type_name(), "exported object");
        Reference {
            index,
            object: object.clone(),
        }
    }

    /// What ending the current pass would report, without ending it
    ///
    /// Lets a caller put the delta on the wire first and only then commit the
    /// pass with [`Exporter::references`], or abandon it with
    /// [`Exporter::rollback`] if the client never received it.
    pub fn pending(&self) -> ReferenceDelta {
        let mut delta = ReferenceDelta::default();
        for entry in self.added.iter().filter_map(|key| self.entries.get(*key)) {
            delta.new_objects.push(entry.object.clone());
            delta.new_reference_ids.push(entry.index);
        }
        delta.removed_reference_ids = self
            .entries
            .values()
            .filter(|entry| !entry.used)
            .map(|entry| entry.index)
            .collect();
        delta.removed_reference_ids.sort_unstable();
        delta
    }

    /// End the current pass, evicting objects it did not reference
    pub fn references(&mut self) -> ReferenceDelta {
        let delta = self.pending();
        self.added.clear();
        self.entries.retain(|_, entry| entry.used);
        self.by_object.retain(|_, key| self.entries.contains_key(*key));
        self.by_index.retain(|_, key| self.entries.contains_key(*key));
        for (_, entry) in self.entries.iter_mut() {
            entry.used = false;
        }

        if !delta.is_empty() {
            tracing::debug!(
                added = delta.new_reference_ids.len(),
                removed = delta.removed_reference_ids.len(),
                live = self.entries.len(),
                "reference pass finished"
            );
        }
        delta
    }

    /// Abandon the current pass without reporting it
    ///
    /// Objects first seen in the abandoned pass are forgotten; objects known
    /// before it stay exported.
    pub fn rollback(&mut self) {
        for key in self.added.drain(..) {
            if let Some(entry) = self.entries.remove(key) {
                self.by_object.remove(&entry.object.id());
                self.by_index.remove(&entry.index);
            }
        }
        for (_, entry) in self.entries.iter_mut() {
            entry.used = false;
        }
    }

    /// Object exported under `index`
    pub fn get(&self, index: u32) -> Option<&ObjectRef> {
        self.by_index
            .get(&index)
            .and_then(|key| self.entries.get(*key))
            .map(|entry| &entry.object)
    }

    /// Index of `object` if it is currently exported
    pub fn index_of(&self, object: &ObjectRef) -> Option<u32> {
        self.by_object
            .get(&object.id())
            .and_then(|key| self.entries.get(*key))
            .map(|entry| entry.index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every exported object, returning their indices
    pub fn clear(&mut self) -> Vec<u32> {
        let mut released: Vec<u32> = self.entries.values().map(|entry| entry.index).collect();
        released.sort_unstable();
        self.entries.clear();
        self.by_object.clear();
        self.by_index.clear();
        self.added.clear();
        released
    }
}

impl fmt::Debug for Exporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exporter")
            .field("live", &self.entries.len())
            .field("next_index", &self.next_index)
            .finish()
    }
}
