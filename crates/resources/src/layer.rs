//! Merged Layers
//!
//! A layer is the merged view of the ordered sources of one module or one
//! library. Readers load the current [`MergedLayer`] snapshot from its
//! [`LayerSlot`]; a rebuild is prepared off to the side and published with a
//! single pointer swap.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::debug;

use crate::configuration::FolderConfiguration;
use crate::item::{ResourceItem, SourceId, SourceLocator};
use crate::merger::ResourceMerger;
use crate::resource_type::ResourceType;
use crate::source_set::SourceResourceSet;

/// Identity of a library on disk (exploded directory or `.aar` path)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LibraryLocation(Arc<str>);

impl LibraryLocation {
    pub fn new(location: impl AsRef<str>) -> Self {
        Self(Arc::from(location.as_ref()))
    }

    pub fn from_path(path: &Path) -> Self {
        Self::new(path.to_string_lossy())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LibraryLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a layer holds
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LayerKey {
    Module(String),
    Library(LibraryLocation),
}

impl LayerKey {
    pub fn is_module(&self) -> bool {
        matches!(self, LayerKey::Module(_))
    }
}

impl fmt::Display for LayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerKey::Module(name) => write!(f, "module:{}", name),
            LayerKey::Library(location) => write!(f, "library:{}", location),
        }
    }
}

/// A tolerated duplicate definition inside one source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Duplicate {
    pub resource_type: ResourceType,
    pub name: String,
    pub config: FolderConfiguration,
    pub source: SourceId,
    pub kept: SourceLocator,
    pub dropped: SourceLocator,
}

/// Immutable merged snapshot of a layer
#[derive(Debug)]
pub struct MergedLayer {
    key: LayerKey,
    generation: u64,
    pub(crate) resources: BTreeMap<ResourceType, BTreeMap<String, Vec<Arc<ResourceItem>>>>,
    pub(crate) duplicates: Vec<Duplicate>,
}

impl MergedLayer {
    pub(crate) fn new(key: LayerKey, generation: u64) -> Self {
        Self {
            key,
            generation,
            resources: BTreeMap::new(),
            duplicates: Vec::new(),
        }
    }

    pub fn key(&self) -> &LayerKey {
        &self.key
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Winning variants of (type, name), ordered by qualifiers
    pub fn variants(&self, resource_type: ResourceType, name: &str) -> Option<&[Arc<ResourceItem>]> {
        self.resources
            .get(&resource_type)
            .and_then(|names| names.get(name))
            .map(|v| v.as_slice())
    }

    pub fn defines(&self, resource_type: ResourceType, name: &str) -> bool {
        self.variants(resource_type, name).is_some()
    }

    /// Names of a type in sorted order
    pub fn names(&self, resource_type: ResourceType) -> impl Iterator<Item = &str> {
        self.resources
            .get(&resource_type)
            .into_iter()
            .flat_map(|names| names.keys().map(|n| n.as_str()))
    }

    pub fn types(&self) -> impl Iterator<Item = ResourceType> + '_ {
        self.resources.keys().copied()
    }

    /// Every winning item
    pub fn items(&self) -> impl Iterator<Item = &Arc<ResourceItem>> {
        self.resources
            .values()
            .flat_map(|names| names.values())
            .flatten()
    }

    pub fn duplicates(&self) -> &[Duplicate] {
        &self.duplicates
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// Shared, swappable holder of a layer's current snapshot
pub struct LayerSlot {
    key: LayerKey,
    sources: Vec<SourceId>,
    current: ArcSwap<MergedLayer>,
    generation: AtomicU64,
    rebuild: Mutex<()>,
}

impl LayerSlot {
    /// Create a slot over `sources`, lowest precedence first, holding an empty layer
    pub fn new(key: LayerKey, sources: Vec<SourceId>) -> Self {
        let empty = MergedLayer::new(key.clone(), 0);
        Self {
            key,
            sources,
            current: ArcSwap::from_pointee(empty),
            generation: AtomicU64::new(0),
            rebuild: Mutex::new(()),
        }
    }

    pub fn key(&self) -> &LayerKey {
        &self.key
    }

    pub fn sources(&self) -> &[SourceId] {
        &self.sources
    }

    pub fn contains_source(&self, source: &SourceId) -> bool {
        self.sources.contains(source)
    }

    /// Current snapshot
    pub fn load(&self) -> Arc<MergedLayer> {
        self.current.load_full()
    }

    /// Generation of the published snapshot
    pub fn generation(&self) -> u64 {
        self.current.load().generation()
    }

    /// Merge `sets` and publish the result; returns the new generation
    ///
    /// `sets` must be in the slot's source order. Concurrent rebuilds are
    /// serialized so generations are published in increasing order.
    pub fn recompute(&self, merger: &ResourceMerger, sets: &[Arc<SourceResourceSet>]) -> u64 {
        let _guard = self.rebuild.lock();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let layer = merger.merge(&self.key, generation, sets);
        merger.report_new_duplicates(&self.current.load(), &layer);
        debug!(
            "Layer {} recomputed at generation {} ({} duplicates)",
            self.key,
            generation,
            layer.duplicates().len()
        );
        self.current.store(Arc::new(layer));
        generation
    }
}

impl fmt::Debug for LayerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerSlot")
            .field("key", &self.key)
            .field("sources", &self.sources)
            .field("generation", &self.generation())
            .finish()
    }
}
