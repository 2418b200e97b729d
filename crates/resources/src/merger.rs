//! Resource Merger
//!
//! Combines the ordered source sets of one layer into a [`MergedLayer`].
//! Later sources override earlier ones for identical qualifiers; duplicate
//! definitions inside a single source keep the first one encountered and are
//! reported once, when they first show up in a layer.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use r_droid_core::ResourceConfig;
use tracing::{debug, warn};

use crate::configuration::FolderConfiguration;
use crate::item::{ResourceItem, SourceId};
use crate::layer::{Duplicate, LayerKey, MergedLayer};
use crate::resource_type::ResourceType;
use crate::source_set::SourceResourceSet;

/// Overlay merge of source sets
#[derive(Debug, Clone)]
pub struct ResourceMerger {
    warn_on_duplicates: bool,
}

impl Default for ResourceMerger {
    fn default() -> Self {
        Self {
            warn_on_duplicates: true,
        }
    }
}

impl ResourceMerger {
    pub fn new(warn_on_duplicates: bool) -> Self {
        Self { warn_on_duplicates }
    }

    pub fn from_config(config: &ResourceConfig) -> Self {
        Self::new(config.warn_on_duplicates)
    }

    /// Merge `sets`, lowest precedence first
    pub fn merge(&self, key: &LayerKey, generation: u64, sets: &[Arc<SourceResourceSet>]) -> MergedLayer {
        let mut layer = MergedLayer::new(key.clone(), generation);

        for set in sets {
            for resource_type in set.types() {
                for (name, variants) in set.entries(resource_type) {
                    let winners = self.dedupe_within_source(resource_type, name, variants, &mut layer.duplicates);

                    let merged = layer
                        .resources
                        .entry(resource_type)
                        .or_insert_with(BTreeMap::new)
                        .entry(name.to_string())
                        .or_default();

                    for item in winners {
                        match merged.iter_mut().find(|existing| existing.config == item.config) {
                            Some(existing) => *existing = item,
                            None => merged.push(item),
                        }
                    }
                }
            }
        }

        for names in layer.resources.values_mut() {
            for variants in names.values_mut() {
                variants.sort_by(|a, b| a.config.cmp(&b.config));
            }
        }

        layer
    }

    /// Keep the first variant per qualifier tuple and record the rest
    fn dedupe_within_source(
        &self,
        resource_type: ResourceType,
        name: &str,
        variants: &[Arc<ResourceItem>],
        duplicates: &mut Vec<Duplicate>,
    ) -> Vec<Arc<ResourceItem>> {
        let mut kept: Vec<Arc<ResourceItem>> = Vec::with_capacity(variants.len());

        for item in variants {
            match kept.iter().find(|k| k.config == item.config) {
                Some(first) => {
                    duplicates.push(Duplicate {
                        resource_type,
                        name: name.to_string(),
                        config: item.config.clone(),
                        source: item.source.clone(),
                        kept: first.locator.clone(),
                        dropped: item.locator.clone(),
                    });
                }
                None => kept.push(Arc::clone(item)),
            }
        }

        kept
    }

    /// Log the duplicates of `layer` that `previous` did not have
    ///
    /// Returns how many were reported.
    pub fn report_new_duplicates(&self, previous: &MergedLayer, layer: &MergedLayer) -> usize {
        let known: HashSet<DuplicateKey<'_>> = previous.duplicates().iter().map(duplicate_key).collect();
        let mut reported = 0;

        for duplicate in layer.duplicates() {
            if known.contains(&duplicate_key(duplicate)) {
                continue;
            }
            reported += 1;

            // Re-declaring an id is harmless
            if duplicate.resource_type == ResourceType::Id || !self.warn_on_duplicates {
                debug!(
                    "Duplicate @{}/{} in {} ignored ({:?})",
                    duplicate.resource_type, duplicate.name, duplicate.source, duplicate.dropped.file
                );
            } else {
                warn!(
                    "Duplicate resource @{}/{} [{}] in {}: keeping {:?}:{}, ignoring {:?}:{}",
                    duplicate.resource_type,
                    duplicate.name,
                    duplicate.config,
                    duplicate.source,
                    duplicate.kept.file,
                    duplicate.kept.line,
                    duplicate.dropped.file,
                    duplicate.dropped.line
                );
            }
        }

        reported
    }
}

/// Identity of a duplicate that survives edits moving it inside its files
type DuplicateKey<'a> = (ResourceType, &'a str, &'a FolderConfiguration, &'a SourceId, &'a Path, &'a Path);

fn duplicate_key(duplicate: &Duplicate) -> DuplicateKey<'_> {
    (
        duplicate.resource_type,
        duplicate.name.as_str(),
        &duplicate.config,
        &duplicate.source,
        duplicate.kept.file.as_path(),
        duplicate.dropped.file.as_path(),
    )
}
