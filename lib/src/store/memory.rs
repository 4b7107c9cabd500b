//! Reference in-memory store: a two-level concurrent index.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use super::{canonical_axes, ContentStore, Entry, StoredItem};
use crate::error::Error;
use crate::keys::{PrimaryKey, VariantKey, VaryKey};

/// An in-memory [`ContentStore`].
///
/// The outer map goes from primary key to a per-resource entry map; the inner
/// map goes from vary key to an entry, which owns its variant-to-item map
/// behind its own lock. The outer lock is only ever held to resolve or create
/// an inner reference, never while touching entry internals, so lock
/// acquisition order is strictly outer → entry and no entry → entry ordering
/// is possible. No lock is held across an await point.
#[derive(Default)]
pub struct InMemoryStore {
    resources: Mutex<HashMap<PrimaryKey, Arc<EntryMap>>>,
}

#[derive(Default)]
struct EntryMap {
    entries: Mutex<HashMap<VaryKey, Arc<EntrySlot>>>,
}

struct EntrySlot {
    primary_key: PrimaryKey,
    vary_axes: Vec<String>,
    items: Mutex<HashMap<VariantKey, StoredItem>>,
}

impl EntrySlot {
    fn snapshot(&self) -> Entry {
        let items = self.items.lock().expect("failed to lock cache entry");
        Entry {
            primary_key: self.primary_key.clone(),
            vary_axes: self.vary_axes.clone(),
            variant_keys: items.keys().cloned().collect(),
        }
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Default::default()
    }

    fn resource(&self, primary_key: &PrimaryKey) -> Option<Arc<EntryMap>> {
        let resources = self.resources.lock().expect("failed to lock resource map");
        resources.get(primary_key).map(Arc::clone)
    }

    fn resource_or_create(&self, primary_key: &PrimaryKey) -> Arc<EntryMap> {
        let mut resources = self.resources.lock().expect("failed to lock resource map");
        Arc::clone(resources.entry(primary_key.clone()).or_default())
    }
}

#[async_trait]
impl ContentStore for InMemoryStore {
    async fn get_entry(
        &self,
        primary_key: &PrimaryKey,
        vary_key: &VaryKey,
    ) -> Result<Option<Entry>, Error> {
        let Some(map) = self.resource(primary_key) else {
            return Ok(None);
        };
        let slot = {
            let entries = map.entries.lock().expect("failed to lock entry map");
            entries.get(vary_key).map(Arc::clone)
        };
        Ok(slot.map(|slot| slot.snapshot()))
    }

    async fn get_entries(&self, primary_key: &PrimaryKey) -> Result<Vec<Entry>, Error> {
        let Some(map) = self.resource(primary_key) else {
            return Ok(Vec::new());
        };
        let slots: Vec<Arc<EntrySlot>> = {
            let entries = map.entries.lock().expect("failed to lock entry map");
            entries.values().map(Arc::clone).collect()
        };
        Ok(slots.iter().map(|slot| slot.snapshot()).collect())
    }

    async fn get_content(
        &self,
        primary_key: &PrimaryKey,
        variant_key: &VariantKey,
    ) -> Result<Option<StoredItem>, Error> {
        let Some(map) = self.resource(primary_key) else {
            return Ok(None);
        };
        let slot = {
            let entries = map.entries.lock().expect("failed to lock entry map");
            entries.get(variant_key.vary()).map(Arc::clone)
        };
        let Some(slot) = slot else {
            return Ok(None);
        };
        let items = slot.items.lock().expect("failed to lock cache entry");
        Ok(items.get(variant_key).cloned())
    }

    async fn upsert(&self, item: StoredItem) -> Result<(), Error> {
        let map = self.resource_or_create(&item.primary_key);
        let slot = {
            let mut entries = map.entries.lock().expect("failed to lock entry map");
            // File the entry under the item's own vary-key portion: for a
            // wildcard policy every stored response is its own entry.
            Arc::clone(entries.entry(item.variant_key.vary().clone()).or_insert_with(|| {
                Arc::new(EntrySlot {
                    primary_key: item.primary_key.clone(),
                    vary_axes: canonical_axes(item.response.vary_axes()),
                    items: Mutex::new(HashMap::new()),
                })
            }))
        };
        let mut items = slot.items.lock().expect("failed to lock cache entry");
        debug!(key = %item.primary_key, "upsert variant");
        items.insert(item.variant_key.clone(), item);
        Ok(())
    }
}
