//! Resource Identifiers
//!
//! Ids come from two places:
//! - fixed ids registered verbatim from library `R.txt` symbol tables
//! - dynamic ids minted on first use for the project's own resources
//!
//! Fixed ids are never changed or reused. Dynamic ids are dropped by
//! [`IdAllocator::reset`] (a full rescan); their counters keep running so a
//! stale id never resolves to a different name.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use indexmap::IndexMap;
use parking_lot::RwLock;
use r_droid_core::ResourceConfig;
use tracing::{debug, info, warn};

use crate::resource_type::{field_name, ResourceType};

const MAX_ENTRY: u32 = 0xFFFF;

/// Packed Android resource id `0xPPTTEEEE`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u32);

impl ResourceId {
    pub fn new(package: u8, type_byte: u8, entry: u16) -> Self {
        Self(u32::from(package) << 24 | u32::from(type_byte) << 16 | u32::from(entry))
    }

    pub fn package(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub fn type_byte(&self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub fn entry(&self) -> u16 {
        self.0 as u16
    }

    /// Value as stored in a Java `int` field
    pub fn as_i32(&self) -> i32 {
        self.0 as i32
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Symbols of a compiled library (its `R.txt`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTable {
    values: IndexMap<(ResourceType, String), u32>,
    styleables: IndexMap<String, Vec<u32>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an `int` symbol; names are stored in field form
    pub fn insert(&mut self, resource_type: ResourceType, name: &str, value: u32) {
        self.values.insert((resource_type, field_name(name)), value);
    }

    /// Record an `int[] styleable` symbol
    pub fn insert_styleable(&mut self, name: &str, attr_ids: Vec<u32>) {
        self.styleables.insert(field_name(name), attr_ids);
    }

    pub fn get(&self, resource_type: ResourceType, name: &str) -> Option<u32> {
        self.values.get(&(resource_type, field_name(name))).copied()
    }

    pub fn styleable(&self, name: &str) -> Option<&[u32]> {
        self.styleables.get(&field_name(name)).map(|v| v.as_slice())
    }

    /// `int` symbols in file order
    pub fn iter(&self) -> impl Iterator<Item = (ResourceType, &str, u32)> {
        self.values.iter().map(|((ty, name), value)| (*ty, name.as_str(), *value))
    }

    pub fn len(&self) -> usize {
        self.values.len() + self.styleables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Immutable copy of every known (type, name) → id mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdTable {
    pub generation: u64,
    entries: BTreeMap<(ResourceType, String), ResourceId>,
}

impl IdTable {
    pub fn get(&self, resource_type: ResourceType, name: &str) -> Option<ResourceId> {
        self.entries.get(&(resource_type, field_name(name))).copied()
    }

    /// Entries sorted by type, then field name
    pub fn iter(&self) -> impl Iterator<Item = (ResourceType, &str, ResourceId)> {
        self.entries.iter().map(|((ty, name), id)| (*ty, name.as_str(), *id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Default)]
struct AllocatorState {
    fixed: HashMap<(ResourceType, String), ResourceId>,
    dynamic: HashMap<(ResourceType, String), ResourceId>,
    owners: HashMap<ResourceId, (ResourceType, String)>,
    next_entry: [u32; ResourceType::ALL.len()],
    libraries: HashSet<String>,
    framework: HashMap<String, ResourceId>,
}

impl AllocatorState {
    fn lookup(&self, key: &(ResourceType, String)) -> Option<ResourceId> {
        self.fixed.get(key).or_else(|| self.dynamic.get(key)).copied()
    }
}

/// Assigns and remembers resource ids for one project
pub struct IdAllocator {
    package_id: u8,
    state: RwLock<AllocatorState>,
    generation: AtomicU64,
}

impl IdAllocator {
    pub fn new(package_id: u8) -> Self {
        Self {
            package_id,
            state: RwLock::new(AllocatorState::default()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &ResourceConfig) -> Self {
        Self::new(config.dynamic_package_id)
    }

    /// Bumped whenever previously handed out ids may have become invalid
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Id of (type, name), minting a dynamic one on first use
    pub fn id_for(&self, resource_type: ResourceType, name: &str) -> ResourceId {
        let key = (resource_type, field_name(name));

        if let Some(id) = self.state.read().lookup(&key) {
            return id;
        }

        let mut state = self.state.write();
        // Another thread may have minted it between the locks
        if let Some(id) = state.lookup(&key) {
            return id;
        }

        let id = self.mint(&mut state, resource_type);
        debug!("Assigned {} to @{}/{}", id, resource_type, key.1);
        state.owners.insert(id, key.clone());
        state.dynamic.insert(key, id);
        id
    }

    fn mint(&self, state: &mut AllocatorState, resource_type: ResourceType) -> ResourceId {
        let ordinal = resource_type.ordinal();
        let type_byte = (ordinal + 1) as u8;
        let mut candidate = ResourceId::new(self.package_id, type_byte, 0);

        for _ in 0..=MAX_ENTRY {
            let entry = state.next_entry[ordinal];
            if entry >= MAX_ENTRY {
                warn!("Dynamic id space of type {} exhausted, wrapping around", resource_type);
                state.next_entry[ordinal] = 0;
            } else {
                state.next_entry[ordinal] = entry + 1;
            }

            candidate = ResourceId::new(self.package_id, type_byte, entry as u16);
            if !state.owners.contains_key(&candidate) {
                return candidate;
            }
        }

        warn!("No free dynamic id left for type {}", resource_type);
        candidate
    }

    /// Id of (type, name) without minting
    pub fn get(&self, resource_type: ResourceType, name: &str) -> Option<ResourceId> {
        self.state.read().lookup(&(resource_type, field_name(name)))
    }

    /// Field name owning `id`, if it is currently assigned to a resource of that type
    pub fn name_for(&self, resource_type: ResourceType, id: ResourceId) -> Option<String> {
        let state = self.state.read();
        state
            .owners
            .get(&id)
            .filter(|(ty, _)| *ty == resource_type)
            .map(|(_, name)| name.clone())
    }

    /// Id of a framework (`android:`) attribute
    pub fn framework_id(&self, attr: &str) -> Option<ResourceId> {
        let attr = attr.strip_prefix("android:").unwrap_or(attr);
        self.state.read().framework.get(&field_name(attr)).copied()
    }

    /// Register the attr ids of the platform symbol table
    pub fn register_framework(&self, symbols: &SymbolTable) -> usize {
        let mut state = self.state.write();
        let mut count = 0;
        for (ty, name, value) in symbols.iter() {
            if ty == ResourceType::Attr {
                state.framework.insert(name.to_string(), ResourceId(value));
                count += 1;
            }
        }
        info!("Registered {} framework attribute ids", count);
        count
    }

    /// Register the ids of a library verbatim
    ///
    /// The first registration of a (type, name) wins. A dynamic id that
    /// collides with a fixed one is dropped and the generation is bumped.
    /// Registering the same package twice is a no-op.
    pub fn register_library(&self, package: &str, symbols: &SymbolTable) -> usize {
        let mut state = self.state.write();
        if !state.libraries.insert(package.to_string()) {
            debug!("Library package {} already registered", package);
            return 0;
        }

        let mut registered = 0;
        let mut invalidated = false;

        for (ty, name, value) in symbols.iter() {
            // Index fields of styleables are not ids
            if ty == ResourceType::Styleable {
                continue;
            }

            let key = (ty, name.to_string());
            let id = ResourceId(value);

            if let Some(existing) = state.fixed.get(&key) {
                if *existing != id {
                    debug!(
                        "Keeping {} for @{}/{}, ignoring {} from {}",
                        existing, ty, name, id, package
                    );
                }
                continue;
            }

            if let Some(stale) = state.dynamic.remove(&key) {
                state.owners.remove(&stale);
                invalidated = true;
            }
            let owned_by_fixed = match state.owners.get(&id).cloned() {
                Some(owner) if state.dynamic.remove(&owner).is_some() => {
                    invalidated = true;
                    false
                }
                Some(_) => true,
                None => false,
            };
            // Independently compiled libraries may reuse values; the first owner keeps reverse lookups
            if !owned_by_fixed {
                state.owners.insert(id, key.clone());
            }
            state.fixed.insert(key, id);
            registered += 1;
        }

        if invalidated {
            self.generation.fetch_add(1, Ordering::SeqCst);
        }

        info!("Registered {} fixed ids from {}", registered, package);
        registered
    }

    /// Drop every dynamic id; returns the new generation
    pub fn reset(&self) -> u64 {
        let mut state = self.state.write();
        let dynamic: Vec<ResourceId> = state.dynamic.drain().map(|(_, id)| id).collect();
        for id in &dynamic {
            state.owners.remove(id);
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Reset {} dynamic ids, generation {}", dynamic.len(), generation);
        generation
    }

    /// Copy of all current mappings
    pub fn snapshot(&self) -> IdTable {
        let state = self.state.read();
        let mut entries: BTreeMap<(ResourceType, String), ResourceId> = BTreeMap::new();
        entries.extend(state.dynamic.iter().map(|(k, v)| (k.clone(), *v)));
        entries.extend(state.fixed.iter().map(|(k, v)| (k.clone(), *v)));
        IdTable {
            generation: self.generation(),
            entries,
        }
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new(0x7f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dynamic_id_layout() {
        let ids = IdAllocator::default();
        let first = ids.id_for(ResourceType::String, "app_name");
        let second = ids.id_for(ResourceType::String, "title");

        assert_eq!(first.package(), 0x7f);
        assert_eq!(first.type_byte() as usize, ResourceType::String.ordinal() + 1);
        assert_eq!(second.entry(), first.entry() + 1);
        assert_eq!(ids.id_for(ResourceType::String, "app_name"), first);
        assert_eq!(first.to_string(), "0x7f140000");
    }

    #[test]
    fn test_field_form_lookup() {
        let ids = IdAllocator::default();
        let id = ids.id_for(ResourceType::Style, "Theme.App");
        assert_eq!(ids.id_for(ResourceType::Style, "Theme_App"), id);
        assert_eq!(ids.name_for(ResourceType::Style, id).as_deref(), Some("Theme_App"));
        assert_eq!(ids.name_for(ResourceType::String, id), None);
    }

    #[test]
    fn test_library_ids_are_used_verbatim() {
        let ids = IdAllocator::default();
        let mut symbols = SymbolTable::new();
        symbols.insert(ResourceType::String, "abc_action_bar_home", 0x7f140000);
        symbols.insert(ResourceType::Styleable, "ActionBar_height", 3);

        assert_eq!(ids.register_library("androidx.appcompat", &symbols), 1);
        assert_eq!(ids.id_for(ResourceType::String, "abc_action_bar_home"), ResourceId(0x7f140000));

        // Minting skips the fixed value.
        let local = ids.id_for(ResourceType::String, "local");
        assert_eq!(local, ResourceId(0x7f140001));
        assert!(ids.get(ResourceType::Styleable, "ActionBar_height").is_none());
    }

    #[test]
    fn test_first_library_registration_wins() {
        let ids = IdAllocator::default();
        let mut a = SymbolTable::new();
        a.insert(ResourceType::Color, "shared", 0x7f060001);
        let mut b = SymbolTable::new();
        b.insert(ResourceType::Color, "shared", 0x7f060009);

        ids.register_library("lib.a", &a);
        ids.register_library("lib.b", &b);
        assert_eq!(ids.get(ResourceType::Color, "shared"), Some(ResourceId(0x7f060001)));
        assert_eq!(ids.register_library("lib.a", &a), 0);
    }

    #[test]
    fn test_reset_retires_dynamic_ids() {
        let ids = IdAllocator::default();
        let mut symbols = SymbolTable::new();
        symbols.insert(ResourceType::Layout, "lib_layout", 0x7f0e0100);
        ids.register_library("lib", &symbols);

        let old = ids.id_for(ResourceType::Layout, "main");
        let generation = ids.reset();
        assert_eq!(generation, 1);
        assert_eq!(ids.name_for(ResourceType::Layout, old), None);
        assert_eq!(ids.get(ResourceType::Layout, "lib_layout"), Some(ResourceId(0x7f0e0100)));

        let new = ids.id_for(ResourceType::Layout, "main");
        assert_ne!(new, old);
        assert_eq!(ids.snapshot().generation, 1);
    }

    #[test]
    fn test_fixed_registration_replaces_colliding_dynamic_id() {
        let ids = IdAllocator::default();
        let dynamic = ids.id_for(ResourceType::Color, "accent");

        let mut symbols = SymbolTable::new();
        symbols.insert(ResourceType::Color, "primary", dynamic.0);
        ids.register_library("lib", &symbols);

        assert_eq!(ids.generation(), 1);
        assert_eq!(ids.name_for(ResourceType::Color, dynamic).as_deref(), Some("primary"));
        assert_ne!(ids.id_for(ResourceType::Color, "accent"), dynamic);
    }

    #[test]
    fn test_framework_ids() {
        let ids = IdAllocator::default();
        let mut android = SymbolTable::new();
        android.insert(ResourceType::Attr, "textColor", 0x01010098);
        android.insert(ResourceType::String, "ok", 0x0104000a);
        assert_eq!(ids.register_framework(&android), 1);

        assert_eq!(ids.framework_id("android:textColor"), Some(ResourceId(0x01010098)));
        assert_eq!(ids.framework_id("textColor"), Some(ResourceId(0x01010098)));
        assert_eq!(ids.framework_id("unknownAttr"), None);
    }

    #[test]
    fn test_concurrent_first_use_mints_once() {
        let ids = IdAllocator::default();
        let results: Vec<ResourceId> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| ids.id_for(ResourceType::Drawable, "icon")))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(results.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(ids.snapshot().len(), 1);
    }

    #[test]
    fn test_snapshot_is_sorted_and_detached() {
        let ids = IdAllocator::default();
        ids.id_for(ResourceType::String, "b");
        ids.id_for(ResourceType::Color, "a");
        let table = ids.snapshot();
        ids.id_for(ResourceType::String, "c");

        let types: Vec<ResourceType> = table.iter().map(|(ty, _, _)| ty).collect();
        assert_eq!(types, vec![ResourceType::Color, ResourceType::String]);
        assert_eq!(table.len(), 2);
        assert!(table.get(ResourceType::String, "b").is_some());
    }
}
