//! Source Resource Sets
//!
//! The items contributed by one physical source, grouped by type and name.
//! Variants of a name are kept in scan order (file path, then position in
//! the file) no matter whether they arrived in a full scan or a delta.
//! Duplicates (same type, name and qualifiers) are all stored; the merger
//! keeps the first one.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::item::{ResourceItem, SourceId};
use crate::resource_type::ResourceType;

/// Incremental change to one source
#[derive(Debug, Clone)]
pub struct SourceDelta {
    pub source: SourceId,
    pub added: Vec<ResourceItem>,
    pub removed: Vec<ResourceItem>,
}

impl SourceDelta {
    pub fn new(source: SourceId) -> Self {
        Self {
            source,
            added: Vec::new(),
            removed: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Outcome of applying a delta
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeltaStats {
    pub added: usize,
    pub removed: usize,
}

type NameMap = IndexMap<String, Vec<Arc<ResourceItem>>>;

/// Bag of items from one source
#[derive(Debug, Clone)]
pub struct SourceResourceSet {
    id: SourceId,
    items: BTreeMap<ResourceType, NameMap>,
    files: HashMap<PathBuf, Vec<Arc<ResourceItem>>>,
    len: usize,
}

impl SourceResourceSet {
    pub fn new(id: SourceId) -> Self {
        Self {
            id,
            items: BTreeMap::new(),
            files: HashMap::new(),
            len: 0,
        }
    }

    /// Build a set from a full scan
    pub fn with_items(id: SourceId, items: impl IntoIterator<Item = ResourceItem>) -> Self {
        let mut set = Self::new(id);
        set.replace_all(items);
        set
    }

    pub fn id(&self) -> &SourceId {
        &self.id
    }

    /// Number of stored items, duplicates included
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drop every item and repopulate from a full scan
    pub fn replace_all(&mut self, items: impl IntoIterator<Item = ResourceItem>) {
        self.items.clear();
        self.files.clear();
        self.len = 0;
        for item in items {
            self.insert(item);
        }
        debug!("Source {} repopulated with {} items", self.id, self.len);
    }

    /// Apply removals, then additions
    ///
    /// A removal matches an item with the same identity declared in the same
    /// file. Items belonging to another source are ignored.
    pub fn apply(&mut self, delta: SourceDelta) -> DeltaStats {
        let mut stats = DeltaStats::default();

        for item in &delta.removed {
            if self.remove(item) {
                stats.removed += 1;
            } else {
                debug!("Removal of {} from {} matched nothing", item.url(), self.id);
            }
        }

        for item in delta.added {
            if self.insert(item) {
                stats.added += 1;
            }
        }

        stats
    }

    fn insert(&mut self, item: ResourceItem) -> bool {
        if item.source != self.id {
            warn!(
                "Dropping {} declared by source {} while updating {}",
                item.url(),
                item.source,
                self.id
            );
            return false;
        }

        let item = Arc::new(item);
        self.files
            .entry(item.locator.file.clone())
            .or_default()
            .push(Arc::clone(&item));
        let variants = self
            .items
            .entry(item.resource_type)
            .or_default()
            .entry(item.name.clone())
            .or_default();
        let position = variants.partition_point(|v| scan_order(v) <= scan_order(&item));
        variants.insert(position, item);
        self.len += 1;
        true
    }

    fn remove(&mut self, item: &ResourceItem) -> bool {
        let Some(names) = self.items.get_mut(&item.resource_type) else {
            return false;
        };
        let Some(variants) = names.get_mut(&item.name) else {
            return false;
        };
        let Some(position) = variants
            .iter()
            .position(|v| v.same_identity(item) && v.locator.file == item.locator.file)
        else {
            return false;
        };

        let removed = variants.remove(position);
        if variants.is_empty() {
            names.shift_remove(&item.name);
            if names.is_empty() {
                self.items.remove(&item.resource_type);
            }
        }

        if let Some(in_file) = self.files.get_mut(&removed.locator.file) {
            in_file.retain(|i| !Arc::ptr_eq(i, &removed));
            if in_file.is_empty() {
                self.files.remove(&removed.locator.file);
            }
        }

        self.len -= 1;
        true
    }

    /// Variants of (type, name) in scan order
    pub fn get(&self, resource_type: ResourceType, name: &str) -> &[Arc<ResourceItem>] {
        self.items
            .get(&resource_type)
            .and_then(|names| names.get(name))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Types with at least one item, in ordinal order
    pub fn types(&self) -> impl Iterator<Item = ResourceType> + '_ {
        self.items.keys().copied()
    }

    /// Names of a type with their variants, in order of first encounter
    pub fn entries(&self, resource_type: ResourceType) -> impl Iterator<Item = (&str, &[Arc<ResourceItem>])> {
        self.items
            .get(&resource_type)
            .into_iter()
            .flat_map(|names| names.iter().map(|(n, v)| (n.as_str(), v.as_slice())))
    }

    /// Items declared by one file
    pub fn items_in_file(&self, file: &Path) -> Vec<ResourceItem> {
        self.files
            .get(file)
            .map(|items| items.iter().map(|i| ResourceItem::clone(i)).collect())
            .unwrap_or_default()
    }

    /// Files contributing items
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.files.keys().map(|p| p.as_path())
    }
}

fn scan_order(item: &ResourceItem) -> (&Path, u64) {
    (item.locator.file.as_path(), item.locator.byte_offset)
}
