//! Layered Repository
//!
//! The resource view of one module: its own layer first, then its
//! dependencies nearest first. Layers are shared with other repositories.
//! Aggregate queries are served from a cache stamped with the generations of
//! the layers it was built from.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use parking_lot::RwLock;
use tracing::trace;

use crate::configuration::{best_match, LocaleQualifier, RuntimeConfig};
use crate::item::ResourceItem;
use crate::layer::{LayerSlot, MergedLayer};
use crate::resource_type::ResourceType;

struct Aggregate {
    stamp: Vec<u64>,
    names: BTreeMap<ResourceType, BTreeSet<String>>,
    locales: BTreeSet<LocaleQualifier>,
}

/// Ordered stack of merged layers
pub struct LayeredRepository {
    name: String,
    layers: Vec<Arc<LayerSlot>>,
    aggregate: RwLock<Option<Arc<Aggregate>>>,
}

impl LayeredRepository {
    /// `layers` in precedence order, highest first
    pub fn new(name: impl Into<String>, layers: Vec<Arc<LayerSlot>>) -> Self {
        Self {
            name: name.into(),
            layers,
            aggregate: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layers(&self) -> &[Arc<LayerSlot>] {
        &self.layers
    }

    /// Generations of the layers, in precedence order
    pub fn generations(&self) -> Vec<u64> {
        self.layers.iter().map(|l| l.generation()).collect()
    }

    fn snapshots(&self) -> Vec<Arc<MergedLayer>> {
        self.layers.iter().map(|l| l.load()).collect()
    }

    /// Resolve (type, name) for a device configuration
    ///
    /// The first layer that defines the name decides. If none of its variants
    /// is compatible the lookup fails; later layers are not consulted.
    pub fn resolve(
        &self,
        resource_type: ResourceType,
        name: &str,
        config: &RuntimeConfig,
    ) -> Option<Arc<ResourceItem>> {
        for slot in &self.layers {
            let layer = slot.load();
            if let Some(variants) = layer.variants(resource_type, name) {
                let chosen = best_match(config, variants, |item| &item.config).cloned();
                trace!(
                    "Resolved @{}/{} in {}: {:?}",
                    resource_type,
                    name,
                    layer.key(),
                    chosen.as_ref().map(|c| c.config.to_string())
                );
                return chosen;
            }
        }
        None
    }

    /// All variants from the first layer defining (type, name)
    pub fn definitions(&self, resource_type: ResourceType, name: &str) -> Vec<Arc<ResourceItem>> {
        self.layers
            .iter()
            .map(|slot| slot.load())
            .find_map(|layer| layer.variants(resource_type, name).map(|v| v.to_vec()))
            .unwrap_or_default()
    }

    /// Whether any layer defines (type, name)
    pub fn contains(&self, resource_type: ResourceType, name: &str) -> bool {
        self.layers
            .iter()
            .any(|slot| slot.load().defines(resource_type, name))
    }

    /// Sorted union of the names of a type across all layers
    pub fn names_of_type(&self, resource_type: ResourceType) -> Vec<String> {
        self.aggregate()
            .names
            .get(&resource_type)
            .map(|names| names.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Types with at least one member, in ordinal order
    pub fn types(&self) -> Vec<ResourceType> {
        self.aggregate().names.keys().copied().collect()
    }

    /// Locales used by module layers
    pub fn locales(&self) -> Vec<LocaleQualifier> {
        self.aggregate().locales.iter().cloned().collect()
    }

    /// Languages used by module layers
    pub fn languages(&self) -> Vec<String> {
        let languages: BTreeSet<String> = self
            .aggregate()
            .locales
            .iter()
            .map(|l| l.language.clone())
            .collect();
        languages.into_iter().collect()
    }

    fn aggregate(&self) -> Arc<Aggregate> {
        let snapshots = self.snapshots();
        let stamp: Vec<u64> = snapshots.iter().map(|s| s.generation()).collect();

        if let Some(cached) = self.aggregate.read().as_ref() {
            if cached.stamp == stamp {
                return Arc::clone(cached);
            }
        }

        let mut names: BTreeMap<ResourceType, BTreeSet<String>> = BTreeMap::new();
        let mut locales = BTreeSet::new();

        for layer in &snapshots {
            for resource_type in layer.types() {
                names
                    .entry(resource_type)
                    .or_default()
                    .extend(layer.names(resource_type).map(|n| n.to_string()));
            }
            if layer.key().is_module() {
                locales.extend(layer.items().filter_map(|i| i.config.locale.clone()));
            }
        }

        trace!("Rebuilt aggregate of {} at {:?}", self.name, stamp);
        let aggregate = Arc::new(Aggregate { stamp, names, locales });
        *self.aggregate.write() = Some(Arc::clone(&aggregate));
        aggregate
    }
}

impl std::fmt::Debug for LayeredRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayeredRepository")
            .field("name", &self.name)
            .field("layers", &self.layers)
            .finish()
    }
}
