//! Class Registry
//!
//! Maps application packages to their [`RClassGenerator`] and answers class
//! lookups by binary name. Registrations remember the id generation they were
//! made at; once the allocator moves past it (a full rescan) the entry is
//! stale until the package is registered again. Stale entries keep answering.

use std::collections::HashMap;
use std::sync::Arc;
use bytes::Bytes;
use parking_lot::RwLock;
use r_droid_core::{Event, EventBus, RClassConfig, Result};
use r_droid_resources::{IdAllocator, LayeredRepository, ResourceType};
use tracing::{debug, info, trace};

use crate::synthesizer::RClassGenerator;

/// Source of class bytes for a preview class loader
pub trait BinaryClassProvider: Send + Sync {
    /// Bytes of the class with the given binary name (`com.example.R$string`),
    /// `None` when this provider does not define it
    fn find_class_bytes(&self, binary_name: &str) -> Result<Option<Bytes>>;
}

/// Registration state of a package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Unregistered,
    Active,
    /// Ids were reset after the registration
    Stale,
}

struct Registration {
    generator: Arc<RClassGenerator>,
    generation: u64,
}

/// Owned registry of R class generators, one per package
pub struct ClassRegistry {
    ids: Arc<IdAllocator>,
    config: RClassConfig,
    entries: RwLock<HashMap<String, Registration>>,
    events: Option<Arc<EventBus>>,
}

impl ClassRegistry {
    pub fn new(ids: Arc<IdAllocator>, config: &RClassConfig) -> Self {
        Self {
            ids,
            config: config.clone(),
            entries: RwLock::new(HashMap::new()),
            events: None,
        }
    }

    /// Emit [`Event::PackageRegistered`] on `events`
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Associate `package` with `repository`
    ///
    /// Re-registering the same repository refreshes a stale entry and is a
    /// no-op otherwise. Returns whether anything changed.
    pub fn register(&self, package: &str, repository: Arc<LayeredRepository>) -> bool {
        let generation = self.ids.generation();
        {
            let mut entries = self.entries.write();
            let existing = entries
                .get_mut(package)
                .filter(|entry| Arc::ptr_eq(entry.generator.repository(), &repository));
            match existing {
                Some(entry) if entry.generation == generation => {
                    trace!("Package {} already registered", package);
                    return false;
                }
                Some(entry) => {
                    debug!(
                        "Refreshing stale registration of {} ({} -> {})",
                        package, entry.generation, generation
                    );
                    entry.generation = generation;
                }
                None => {
                    let generator = RClassGenerator::new(package, repository, self.ids.clone(), &self.config);
                    entries.insert(
                        package.to_string(),
                        Registration {
                            generator: Arc::new(generator),
                            generation,
                        },
                    );
                    info!("Registered R classes for {}", package);
                }
            }
        }

        if let Some(events) = &self.events {
            events.emit(Event::PackageRegistered {
                package: package.to_string(),
            });
        }
        true
    }

    pub fn unregister(&self, package: &str) -> bool {
        let removed = self.entries.write().remove(package).is_some();
        if removed {
            info!("Unregistered R classes for {}", package);
        }
        removed
    }

    pub fn status(&self, package: &str) -> RegistrationState {
        match self.entries.read().get(package) {
            None => RegistrationState::Unregistered,
            Some(entry) if entry.generation < self.ids.generation() => RegistrationState::Stale,
            Some(_) => RegistrationState::Active,
        }
    }

    /// Registered packages, sorted
    pub fn packages(&self) -> Vec<String> {
        let mut packages: Vec<String> = self.entries.read().keys().cloned().collect();
        packages.sort();
        packages
    }

    pub fn generator(&self, package: &str) -> Option<Arc<RClassGenerator>> {
        self.entries.read().get(package).map(|e| e.generator.clone())
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl BinaryClassProvider for ClassRegistry {
    fn find_class_bytes(&self, binary_name: &str) -> Result<Option<Bytes>> {
        let Some((package, nested)) = split_r_class_name(binary_name) else {
            return Ok(None);
        };
        let Some(generator) = self.generator(package) else {
            return Ok(None);
        };

        match nested {
            None => generator.generate_r().map(Some),
            Some(type_name) => match ResourceType::from_name(type_name) {
                Some(ty) => generator.generate_type(ty),
                None => Ok(None),
            },
        }
    }
}

impl std::fmt::Debug for ClassRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassRegistry")
            .field("packages", &self.packages())
            .finish()
    }
}

/// Split `com.example.R$string` into (`com.example`, `Some("string")`)
fn split_r_class_name(binary_name: &str) -> Option<(&str, Option<&str>)> {
    let index = binary_name.rfind(".R")?;
    let package = &binary_name[..index];
    let rest = &binary_name[index + 2..];
    if package.is_empty() {
        return None;
    }
    match rest {
        "" => Some((package, None)),
        _ => match rest.strip_prefix('$') {
            Some(nested) if !nested.is_empty() && !nested.contains('$') => Some((package, Some(nested))),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use r_droid_resources::{
        FolderConfiguration, LayerKey, LayerSlot, ResourceItem, ResourceMerger, ResourceValue, SourceId,
        SourceLocator, SourceResourceSet,
    };
    use crate::inspect::ClassSummary;

    fn repository(names: &[&str]) -> Arc<LayeredRepository> {
        let source = SourceId::new("app/res");
        let items: Vec<ResourceItem> = names
            .iter()
            .map(|name| {
                ResourceItem::new(
                    ResourceType::String,
                    *name,
                    FolderConfiguration::from_qualifiers("").unwrap(),
                    ResourceValue::text("x"),
                    source.clone(),
                    SourceLocator::file("values/strings.xml"),
                )
            })
            .collect();
        let slot = Arc::new(LayerSlot::new(LayerKey::Module("app".into()), vec![source.clone()]));
        slot.recompute(
            &ResourceMerger::default(),
            &[Arc::new(SourceResourceSet::with_items(source, items))],
        );
        Arc::new(LayeredRepository::new("app", vec![slot]))
    }

    fn registry() -> (ClassRegistry, Arc<IdAllocator>) {
        let ids = Arc::new(IdAllocator::default());
        (ClassRegistry::new(ids.clone(), &RClassConfig::default()), ids)
    }

    #[test]
    fn test_split_r_class_name() {
        assert_eq!(split_r_class_name("com.example.R"), Some(("com.example", None)));
        assert_eq!(split_r_class_name("com.example.R$string"), Some(("com.example", Some("string"))));
        assert_eq!(split_r_class_name("com.example.Rx"), None);
        assert_eq!(split_r_class_name("com.example.R$"), None);
        assert_eq!(split_r_class_name("com.example.R$string$x"), None);
        assert_eq!(split_r_class_name("R"), None);
        assert_eq!(split_r_class_name("com.example.MainActivity"), None);
    }

    #[test]
    fn test_find_class_bytes() {
        let (registry, _) = registry();
        assert!(registry.register("com.example", repository(&["title"])));

        let r = registry.find_class_bytes("com.example.R").unwrap().unwrap();
        assert_eq!(ClassSummary::parse(&r).unwrap().name, "com/example/R");

        let strings = registry.find_class_bytes("com.example.R$string").unwrap().unwrap();
        let summary = ClassSummary::parse(&strings).unwrap();
        assert!(summary.field("title").is_some());

        // Known type without members, unknown type, unknown package, other class
        assert!(registry.find_class_bytes("com.example.R$layout").unwrap().is_none());
        assert!(registry.find_class_bytes("com.example.R$bogus").unwrap().is_none());
        assert!(registry.find_class_bytes("com.other.R").unwrap().is_none());
        assert!(registry.find_class_bytes("com.example.MainActivity").unwrap().is_none());
        assert_eq!(registry.packages(), vec!["com.example"]);
    }

    #[test]
    fn test_registration_states() {
        let (registry, ids) = registry();
        let repo = repository(&["title"]);
        assert_eq!(registry.status("com.example"), RegistrationState::Unregistered);

        assert!(registry.register("com.example", repo.clone()));
        assert_eq!(registry.status("com.example"), RegistrationState::Active);
        assert!(!registry.register("com.example", repo.clone()));

        ids.reset();
        assert_eq!(registry.status("com.example"), RegistrationState::Stale);
        // Stale entries keep answering
        assert!(registry.find_class_bytes("com.example.R$string").unwrap().is_some());

        assert!(registry.register("com.example", repo));
        assert_eq!(registry.status("com.example"), RegistrationState::Active);

        assert!(registry.unregister("com.example"));
        assert!(!registry.unregister("com.example"));
        assert_eq!(registry.status("com.example"), RegistrationState::Unregistered);
    }

    #[test]
    fn test_new_repository_replaces_generator() {
        let (registry, _) = registry();
        registry.register("com.example", repository(&["old"]));
        assert!(registry.register("com.example", repository(&["new"])));

        let bytes = registry.find_class_bytes("com.example.R$string").unwrap().unwrap();
        let summary = ClassSummary::parse(&bytes).unwrap();
        assert!(summary.field("new").is_some());
        assert!(summary.field("old").is_none());
    }

    #[test]
    fn test_registration_emits_event() {
        let ids = Arc::new(IdAllocator::default());
        let events = Arc::new(EventBus::new());
        let subscription = events.subscribe();
        let registry = ClassRegistry::new(ids, &RClassConfig::default()).with_events(events);

        let repo = repository(&["title"]);
        registry.register("com.example", repo.clone());
        registry.register("com.example", repo);

        let received = subscription.drain();
        assert_eq!(received.len(), 1);
        assert!(matches!(&received[0], Event::PackageRegistered { package } if package == "com.example"));
    }

    #[test]
    fn test_ids_are_stable_across_lookups() {
        let (registry, ids) = registry();
        registry.register("com.example", repository(&["a", "b"]));

        let first = registry.find_class_bytes("com.example.R$string").unwrap();
        let second = registry.find_class_bytes("com.example.R$string").unwrap();
        assert_eq!(first, second);
        assert_eq!(ids.get(ResourceType::String, "a").map(|id| id.type_byte()), Some(0x14));
    }
}
