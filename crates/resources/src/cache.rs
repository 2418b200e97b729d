//! Library Layer Cache
//!
//! Library layers are shared by every repository depending on the same
//! library location. The cache only holds weak references, so a layer lives
//! while some repository holds it; `evict` forgets an entry early.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use parking_lot::Mutex;
use tracing::debug;

use crate::layer::{LayerSlot, LibraryLocation};

#[derive(Default)]
pub struct LayerCache {
    entries: Mutex<HashMap<LibraryLocation, Weak<LayerSlot>>>,
}

impl LayerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live layer for `location`, if any repository still holds it
    pub fn get(&self, location: &LibraryLocation) -> Option<Arc<LayerSlot>> {
        self.entries.lock().get(location).and_then(Weak::upgrade)
    }

    /// Return the live layer or build one with `create`
    ///
    /// `create` runs under the cache lock so concurrent callers share a
    /// single layer per location.
    pub fn get_or_create<E>(
        &self,
        location: &LibraryLocation,
        create: impl FnOnce() -> Result<Arc<LayerSlot>, E>,
    ) -> Result<Arc<LayerSlot>, E> {
        let mut entries = self.entries.lock();
        if let Some(slot) = entries.get(location).and_then(Weak::upgrade) {
            return Ok(slot);
        }

        let slot = create()?;
        entries.insert(location.clone(), Arc::downgrade(&slot));
        debug!("Cached library layer {}", location);
        Ok(slot)
    }

    /// Forget the entry for `location`; returns whether it was present
    ///
    /// Repositories already holding the layer keep using it until rebuilt.
    pub fn evict(&self, location: &LibraryLocation) -> bool {
        self.entries.lock().remove(location).is_some()
    }

    /// Drop entries whose layer is no longer referenced
    pub fn purge(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, slot| slot.strong_count() > 0);
        before - entries.len()
    }

    /// Number of live layers
    pub fn live_count(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|slot| slot.strong_count() > 0)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::SourceId;
    use crate::layer::LayerKey;

    fn make(location: &LibraryLocation) -> Result<Arc<LayerSlot>, ()> {
        Ok(Arc::new(LayerSlot::new(
            LayerKey::Library(location.clone()),
            vec![SourceId::new(location.as_str())],
        )))
    }

    #[test]
    fn test_layer_is_shared_while_held() {
        let cache = LayerCache::new();
        let location = LibraryLocation::new("/libs/appcompat.aar");

        let first = cache.get_or_create(&location, || make(&location)).unwrap();
        let second = cache
            .get_or_create(&location, || -> Result<Arc<LayerSlot>, ()> { panic!("must reuse") })
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.live_count(), 1);

        drop(first);
        assert!(cache.get(&location).is_some());
        drop(second);
        assert!(cache.get(&location).is_none());
        assert_eq!(cache.purge(), 1);
    }

    #[test]
    fn test_evict_forces_new_layer() {
        let cache = LayerCache::new();
        let location = LibraryLocation::new("/libs/material");

        let held = cache.get_or_create(&location, || make(&location)).unwrap();
        assert!(cache.evict(&location));
        assert!(!cache.evict(&location));

        let fresh = cache.get_or_create(&location, || make(&location)).unwrap();
        assert!(!Arc::ptr_eq(&held, &fresh));
    }

    #[test]
    fn test_failed_create_is_not_cached() {
        let cache = LayerCache::new();
        let location = LibraryLocation::new("/libs/broken.aar");

        let result = cache.get_or_create(&location, || Err::<Arc<LayerSlot>, _>("corrupt"));
        assert_eq!(result.unwrap_err(), "corrupt");
        assert!(cache.get(&location).is_none());
    }
}
