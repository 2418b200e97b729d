//! Resource Repository Manager
//!
//! Owns every source set, layer, repository and the id allocator of one
//! project. All mutations enter here: file deltas, full rescans and changes
//! to the module dependency graph. Repositories are built lazily and cached
//! until something they depend on changes. A build that raced with a change
//! of the module graph is thrown away and made again.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use parking_lot::{Mutex, RwLock};
use r_droid_core::{Event, EventBus, RDroidError, ResourceConfig, Result};
use tracing::{debug, info, warn};

use crate::cache::LayerCache;
use crate::configuration::RuntimeConfig;
use crate::ids::{IdAllocator, SymbolTable};
use crate::item::{ResourceItem, SourceId};
use crate::layer::{LayerKey, LayerSlot, LibraryLocation};
use crate::merger::ResourceMerger;
use crate::repository::LayeredRepository;
use crate::resource_type::ResourceType;
use crate::source_set::{DeltaStats, SourceDelta, SourceResourceSet};

/// Dependency of a module
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Dependency {
    Module(String),
    Library(LibraryLocation),
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dependency::Module(name) => write!(f, "module {}", name),
            Dependency::Library(location) => write!(f, "library {}", location),
        }
    }
}

/// Description of one module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSpec {
    pub name: String,
    pub package: String,
    /// Resource sources, lowest precedence first
    pub sources: Vec<SourceId>,
    /// Direct dependencies, nearest first
    pub dependencies: Vec<Dependency>,
}

/// Resources of a library as produced by a [`LibraryLoader`]
#[derive(Debug, Clone, Default)]
pub struct LoadedLibrary {
    pub package: String,
    pub sources: Vec<(SourceId, Vec<ResourceItem>)>,
    pub symbols: Option<SymbolTable>,
}

/// Reads the resources of a library from disk
pub trait LibraryLoader: Send + Sync {
    fn load(&self, location: &LibraryLocation) -> Result<LoadedLibrary>;
}

/// A dependency that could not be added to a repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyFailure {
    pub dependency: Dependency,
    pub reason: String,
}

/// Result of building a module repository
#[derive(Debug)]
pub struct RepositoryBuild {
    pub module: String,
    pub package: String,
    pub repository: Arc<LayeredRepository>,
    /// Single layer repositories of the library packages, nearest first
    pub packages: Vec<(String, Arc<LayeredRepository>)>,
    pub failures: Vec<DependencyFailure>,
}

impl RepositoryBuild {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    fn uses_library(&self, location: &LibraryLocation) -> bool {
        self.repository
            .layers()
            .iter()
            .any(|slot| matches!(slot.key(), LayerKey::Library(l) if l == location))
    }
}

pub struct ResourceRepositoryManager {
    merger: ResourceMerger,
    ids: Arc<IdAllocator>,
    loader: Arc<dyn LibraryLoader>,
    events: Arc<EventBus>,
    sources: RwLock<HashMap<SourceId, Arc<SourceResourceSet>>>,
    modules: RwLock<HashMap<String, ModuleSpec>>,
    module_layers: RwLock<HashMap<String, Arc<LayerSlot>>>,
    libraries: LayerCache,
    library_packages: RwLock<HashMap<LibraryLocation, String>>,
    repositories: RwLock<HashMap<String, Arc<RepositoryBuild>>>,
    /// Bumped, with `repositories` locked, whenever cached builds are invalidated
    structure: AtomicU64,
    writer: Mutex<()>,
}

impl ResourceRepositoryManager {
    pub fn new(config: &ResourceConfig, loader: Arc<dyn LibraryLoader>, events: Arc<EventBus>) -> Self {
        Self {
            merger: ResourceMerger::from_config(config),
            ids: Arc::new(IdAllocator::from_config(config)),
            loader,
            events,
            sources: RwLock::new(HashMap::new()),
            modules: RwLock::new(HashMap::new()),
            module_layers: RwLock::new(HashMap::new()),
            libraries: LayerCache::new(),
            library_packages: RwLock::new(HashMap::new()),
            repositories: RwLock::new(HashMap::new()),
            structure: AtomicU64::new(0),
            writer: Mutex::new(()),
        }
    }

    pub fn ids(&self) -> &Arc<IdAllocator> {
        &self.ids
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Register the platform symbol table for framework attr ids
    pub fn set_framework_symbols(&self, symbols: &SymbolTable) -> usize {
        self.ids.register_framework(symbols)
    }

    /// Module names in sorted order
    pub fn modules(&self) -> Vec<String> {
        let names: BTreeSet<String> = self.modules.read().keys().cloned().collect();
        names.into_iter().collect()
    }

    pub fn module(&self, name: &str) -> Option<ModuleSpec> {
        self.modules.read().get(name).cloned()
    }

    pub fn source(&self, source: &SourceId) -> Option<Arc<SourceResourceSet>> {
        self.sources.read().get(source).cloned()
    }

    /// Number of library layers currently alive
    pub fn live_library_layers(&self) -> usize {
        self.libraries.live_count()
    }

    /// Add or replace a module
    ///
    /// Invalidates the repositories of the module and of every module
    /// depending on it, directly or transitively. Sources the previous
    /// definition used and no module uses any more are dropped.
    pub fn set_module(&self, spec: ModuleSpec) {
        let _writer = self.writer.lock();
        let name = spec.name.clone();

        let slot = Arc::new(LayerSlot::new(LayerKey::Module(name.clone()), spec.sources.clone()));
        self.recompute(&slot);

        let previous = self.modules.write().insert(name.clone(), spec);
        self.module_layers.write().insert(name.clone(), slot);
        info!("Module {} updated", name);

        self.invalidate_dependents(&name);
        if let Some(previous) = previous {
            self.release_sources(previous.sources);
        }
    }

    /// Remove a module; returns whether it existed
    pub fn remove_module(&self, name: &str) -> bool {
        let _writer = self.writer.lock();
        let removed = self.modules.write().remove(name);
        self.module_layers.write().remove(name);
        match removed {
            Some(spec) => {
                info!("Module {} removed", name);
                self.invalidate_dependents(name);
                self.release_sources(spec.sources);
                true
            }
            None => false,
        }
    }

    /// Apply an incremental change of one source
    pub fn apply_delta(&self, delta: SourceDelta) -> DeltaStats {
        let _writer = self.writer.lock();
        let source = delta.source.clone();

        let mut set = self.current_set(&source);
        let stats = set.apply(delta);
        self.sources.write().insert(source.clone(), Arc::new(set));

        self.events.emit(Event::SourceChanged {
            source: source.to_string(),
            added: stats.added,
            removed: stats.removed,
        });
        self.recompute_layers_of(&source);
        stats
    }

    /// Repopulate a source from a full rescan
    ///
    /// Dynamic ids are reset afterwards; returns the new id generation.
    pub fn replace_source(&self, source: SourceId, items: Vec<ResourceItem>) -> u64 {
        let _writer = self.writer.lock();

        let mut set = self.current_set(&source);
        set.replace_all(items);
        let count = set.len();
        self.sources.write().insert(source.clone(), Arc::new(set));

        self.events.emit(Event::SourceRescanned {
            source: source.to_string(),
            items: count,
        });
        self.recompute_layers_of(&source);

        let generation = self.ids.reset();
        self.events.emit(Event::IdsReset { generation });
        generation
    }

    /// Drop a source; returns whether it existed
    pub fn remove_source(&self, source: &SourceId) -> bool {
        let _writer = self.writer.lock();
        let removed = self.sources.write().remove(source).is_some();
        if removed {
            self.events.emit(Event::SourceRemoved {
                source: source.to_string(),
            });
            self.recompute_layers_of(source);
        }
        removed
    }

    /// Rebuild every module layer, drop all repositories and library layers, reset ids
    pub fn reset_resources(&self) -> u64 {
        let _writer = self.writer.lock();

        let slots: Vec<Arc<LayerSlot>> = self.module_layers.read().values().cloned().collect();
        for slot in &slots {
            self.recompute(slot);
        }

        let locations: Vec<LibraryLocation> = self.library_packages.write().drain().map(|(l, _)| l).collect();
        for location in &locations {
            self.libraries.evict(location);
        }
        self.libraries.purge();

        let modules: Vec<String> = {
            let mut repositories = self.repositories.write();
            self.structure.fetch_add(1, Ordering::SeqCst);
            repositories.drain().map(|(m, _)| m).collect()
        };
        for module in modules {
            self.events.emit(Event::RepositoryInvalidated { module });
        }

        let generation = self.ids.reset();
        self.events.emit(Event::IdsReset { generation });
        info!("Resources reset, id generation {}", generation);
        generation
    }

    /// Forget a cached library layer; returns whether it was cached
    ///
    /// Repositories using it are invalidated and load it again on next use.
    pub fn evict_library(&self, location: &LibraryLocation) -> bool {
        let _writer = self.writer.lock();
        let evicted = self.libraries.evict(location);
        self.library_packages.write().remove(location);

        let affected: Vec<String> = self
            .repositories
            .read()
            .iter()
            .filter(|(_, build)| build.uses_library(location))
            .map(|(module, _)| module.clone())
            .collect();
        self.invalidate(&affected);

        if evicted {
            self.events.emit(Event::LibraryEvicted {
                location: location.to_string(),
            });
        }
        evicted
    }

    /// Repository of a module, built on first use
    pub fn repository(&self, module: &str) -> Result<Arc<RepositoryBuild>> {
        loop {
            if let Some(build) = self.repositories.read().get(module) {
                return Ok(Arc::clone(build));
            }

            let structure = self.structure.load(Ordering::SeqCst);
            let build = Arc::new(self.build_repository(module)?);

            let mut repositories = self.repositories.write();
            if self.structure.load(Ordering::SeqCst) != structure {
                debug!("Module graph changed while building {}, building again", module);
                continue;
            }
            let build = repositories
                .entry(module.to_string())
                .or_insert(build)
                .clone();
            return Ok(build);
        }
    }

    /// Drop the cached repository of a module and build it again
    pub fn rebuild(&self, module: &str) -> Result<Arc<RepositoryBuild>> {
        self.repositories.write().remove(module);
        self.repository(module)
    }

    fn build_repository(&self, module: &str) -> Result<RepositoryBuild> {
        let spec = self
            .module(module)
            .ok_or_else(|| RDroidError::UnknownModule(module.to_string()))?;
        let own_layer = self
            .module_layers
            .read()
            .get(module)
            .cloned()
            .ok_or_else(|| RDroidError::UnknownModule(module.to_string()))?;

        let mut layers = vec![own_layer];
        let mut packages = Vec::new();
        let mut failures = Vec::new();

        let mut seen_modules: HashSet<String> = HashSet::from([module.to_string()]);
        let mut seen_libraries: HashSet<LibraryLocation> = HashSet::new();
        let mut queue: VecDeque<Dependency> = spec.dependencies.iter().cloned().collect();

        while let Some(dependency) = queue.pop_front() {
            match &dependency {
                Dependency::Module(name) => {
                    if !seen_modules.insert(name.clone()) {
                        continue;
                    }
                    let dep_spec = self.module(name);
                    let dep_layer = self.module_layers.read().get(name).cloned();
                    match (dep_spec, dep_layer) {
                        (Some(dep_spec), Some(dep_layer)) => {
                            layers.push(dep_layer);
                            queue.extend(dep_spec.dependencies);
                        }
                        _ => {
                            warn!("Module {} depends on unknown module {}", module, name);
                            failures.push(DependencyFailure {
                                dependency: dependency.clone(),
                                reason: RDroidError::UnknownModule(name.clone()).to_string(),
                            });
                        }
                    }
                }
                Dependency::Library(location) => {
                    if !seen_libraries.insert(location.clone()) {
                        continue;
                    }
                    match self.libraries.get_or_create(location, || self.load_library(location)) {
                        Ok(slot) => {
                            if let Some(package) = self.library_packages.read().get(location) {
                                let single = LayeredRepository::new(package.clone(), vec![Arc::clone(&slot)]);
                                packages.push((package.clone(), Arc::new(single)));
                            }
                            layers.push(slot);
                        }
                        Err(error) => {
                            warn!("Leaving out library {} of module {}: {}", location, module, error);
                            failures.push(DependencyFailure {
                                dependency: dependency.clone(),
                                reason: error.to_string(),
                            });
                        }
                    }
                }
            }
        }

        self.events.emit(Event::RepositoryBuilt {
            module: module.to_string(),
            layers: layers.len(),
            failures: failures.len(),
        });
        info!(
            "Built repository for {} with {} layers ({} failures)",
            module,
            layers.len(),
            failures.len()
        );

        Ok(RepositoryBuild {
            module: module.to_string(),
            package: spec.package,
            repository: Arc::new(LayeredRepository::new(module, layers)),
            packages,
            failures,
        })
    }

    fn load_library(&self, location: &LibraryLocation) -> Result<Arc<LayerSlot>> {
        let library = self.loader.load(location)?;

        let mut source_ids = Vec::with_capacity(library.sources.len());
        let mut sets = Vec::with_capacity(library.sources.len());
        for (source, items) in library.sources {
            source_ids.push(source.clone());
            sets.push(Arc::new(SourceResourceSet::with_items(source, items)));
        }

        let slot = Arc::new(LayerSlot::new(LayerKey::Library(location.clone()), source_ids));
        slot.recompute(&self.merger, &sets);

        if let Some(symbols) = &library.symbols {
            self.ids.register_library(&library.package, symbols);
        }
        self.library_packages
            .write()
            .insert(location.clone(), library.package.clone());

        debug!("Loaded library {} ({})", location, library.package);
        Ok(slot)
    }

    /// Resolve a resource for a module and device configuration
    pub fn resolve(
        &self,
        module: &str,
        resource_type: ResourceType,
        name: &str,
        config: &RuntimeConfig,
    ) -> Result<Option<Arc<ResourceItem>>> {
        Ok(self.repository(module)?.repository.resolve(resource_type, name, config))
    }

    /// Sorted names of a type visible to a module
    pub fn names_of_type(&self, module: &str, resource_type: ResourceType) -> Result<Vec<String>> {
        Ok(self.repository(module)?.repository.names_of_type(resource_type))
    }

    /// Languages used by the resources of any module of the project
    pub fn languages_in_project(&self) -> Vec<String> {
        let mut slots: Vec<(String, Arc<LayerSlot>)> = self
            .module_layers
            .read()
            .iter()
            .map(|(name, slot)| (name.clone(), Arc::clone(slot)))
            .collect();
        slots.sort_by(|a, b| a.0.cmp(&b.0));

        LayeredRepository::new("project", slots.into_iter().map(|(_, slot)| slot).collect()).languages()
    }

    fn current_set(&self, source: &SourceId) -> SourceResourceSet {
        match self.sources.read().get(source) {
            Some(existing) => SourceResourceSet::clone(existing),
            None => SourceResourceSet::new(source.clone()),
        }
    }

    fn recompute(&self, slot: &LayerSlot) -> u64 {
        let sets: Vec<Arc<SourceResourceSet>> = {
            let sources = self.sources.read();
            slot.sources()
                .iter()
                .filter_map(|id| sources.get(id).cloned())
                .collect()
        };
        let generation = slot.recompute(&self.merger, &sets);
        self.events.emit(Event::LayerRecomputed {
            layer: slot.key().to_string(),
            generation,
        });
        generation
    }

    fn recompute_layers_of(&self, source: &SourceId) {
        let slots: Vec<Arc<LayerSlot>> = self
            .module_layers
            .read()
            .values()
            .filter(|slot| slot.contains_source(source))
            .cloned()
            .collect();

        if slots.is_empty() {
            debug!("Source {} is not part of any module", source);
        }
        for slot in slots {
            self.recompute(&slot);
        }
    }

    /// Drop the `candidates` no module references any more
    fn release_sources(&self, candidates: Vec<SourceId>) {
        let unused: Vec<SourceId> = {
            let modules = self.modules.read();
            candidates
                .into_iter()
                .filter(|source| !modules.values().any(|spec| spec.sources.contains(source)))
                .collect()
        };

        for source in unused {
            if self.sources.write().remove(&source).is_some() {
                debug!("Released source {}", source);
                self.events.emit(Event::SourceRemoved {
                    source: source.to_string(),
                });
            }
        }
    }

    fn invalidate_dependents(&self, module: &str) {
        let mut affected = vec![module.to_string()];
        let mut seen: HashSet<String> = HashSet::from([module.to_string()]);
        let mut index = 0;

        {
            let modules = self.modules.read();
            while index < affected.len() {
                let current = affected[index].clone();
                for spec in modules.values() {
                    let depends = spec
                        .dependencies
                        .iter()
                        .any(|d| matches!(d, Dependency::Module(m) if *m == current));
                    if depends && seen.insert(spec.name.clone()) {
                        affected.push(spec.name.clone());
                    }
                }
                index += 1;
            }
        }

        self.invalidate(&affected);
    }

    fn invalidate(&self, modules: &[String]) {
        let mut repositories = self.repositories.write();
        self.structure.fetch_add(1, Ordering::SeqCst);
        for module in modules {
            if repositories.remove(module).is_some() {
                debug!("Invalidated repository of {}", module);
                self.events.emit(Event::RepositoryInvalidated {
                    module: module.clone(),
                });
            }
        }
    }
}
