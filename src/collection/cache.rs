use std::collections::HashMap;
use std::sync::Arc;
use crate::collection::collection::Collection;
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::memory::cache_manager::CacheManager;

/// Name under which the cache negotiates with its [`CacheManager`]
pub const CACHE_NAME: &str = "collections";

/// Side effects of evicting a collection
pub trait EvictionHooks: Send + Sync {
    /// Drop cached configuration derived from the collection
    fn invalidate_configuration(&self, _name: &str) {}

    /// Write the collection back before it leaves memory
    fn sync(&self, _collection: &Collection) -> Result<()> {
        Ok(())
    }
}

pub struct NoHooks;

impl EvictionHooks for NoHooks {}

/// Fixed-size cache of collection objects evicting by reference density.
///
/// Density is `ref_count / (total_references - timestamp)`; the resident
/// collection with the lowest density is replaced. Collections whose lock is
/// busy or which refuse to unload are skipped for that round.
///
/// Not synchronized: callers hold their own lock around every call (see
/// [`CollectionStore`](crate::collection::store::CollectionStore)).
pub struct CollectionCache {
    items: Vec<Option<Arc<Collection>>>,
    map: HashMap<u64, usize>,       // Key -> slot
    names: HashMap<String, u64>,    // Name -> key

    total_references: u64,
    replacements: usize,
    growth_threshold: usize,

    hooks: Arc<dyn EvictionHooks>,
    cache_manager: Option<Arc<dyn CacheManager>>,
}

impl CollectionCache {
    pub fn new(size: usize, growth_threshold: usize) -> Self {
        CollectionCache {
            items: vec![None; size],
            map: HashMap::with_capacity(size),
            names: HashMap::with_capacity(size),
            total_references: 0,
            replacements: 0,
            growth_threshold,
            hooks: Arc::new(NoHooks),
            cache_manager: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.collection_cache_size, config.collection_cache_growth_threshold)
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn EvictionHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_cache_manager(mut self, manager: Arc<dyn CacheManager>) -> Self {
        manager.register(CACHE_NAME, self.items.len());
        self.cache_manager = Some(manager);
        self
    }

    pub fn capacity(&self) -> usize {
        self.items.len()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn total_references(&self) -> u64 {
        self.total_references
    }

    pub fn replacements(&self) -> usize {
        self.replacements
    }

    /// Insert a collection, evicting one if the cache is full.
    ///
    /// Adding a key that is already resident only counts a reference.
    /// Returns the evicted collection, or [`ErrorKind::CacheFull`] when every
    /// resident collection is locked or pinned.
    pub fn add(&mut self, collection: Arc<Collection>, initial_ref_count: u32) -> Result<Option<Arc<Collection>>> {
        self.total_references += 1;
        let key = collection.key();
        if let Some(existing) = self.get(key) {
            existing.increment_ref_count();
            existing.set_timestamp(self.total_references);
            return Ok(None);
        }
        // same name under another key: write the old one back before it goes
        if let Some(slot) = self.names.get(collection.name()).and_then(|stale| self.map.get(stale)).copied() {
            self.evict(slot)?;
        }

        collection.set_ref_count(initial_ref_count);
        collection.set_timestamp(self.total_references);

        let (slot, evicted) = match self.items.iter().position(Option::is_none) {
            Some(slot) => (slot, None),
            None => {
                let slot = self.select_victim()?;
                (slot, self.evict(slot)?)
            }
        };
        self.names.insert(collection.name().to_string(), key);
        self.map.insert(key, slot);
        self.items[slot] = Some(collection);

        if evicted.is_some() {
            self.replacements += 1;
            self.request_growth()?;
        }
        Ok(evicted)
    }

    pub fn get(&self, key: u64) -> Option<Arc<Collection>> {
        self.map.get(&key).and_then(|&slot| self.items[slot].clone())
    }

    pub fn get_by_name(&self, name: &str) -> Option<Arc<Collection>> {
        self.names.get(name).and_then(|&key| self.get(key))
    }

    /// Count an access to a resident collection
    pub fn touch(&mut self, key: u64) -> bool {
        let Some(collection) = self.get(key) else { return false };
        self.total_references += 1;
        collection.increment_ref_count();
        collection.set_timestamp(self.total_references);
        true
    }

    pub fn remove(&mut self, key: u64) -> Option<Arc<Collection>> {
        let slot = self.map.remove(&key)?;
        let collection = self.items[slot].take()?;
        if self.names.get(collection.name()) == Some(&key) {
            self.names.remove(collection.name());
        }
        self.hooks.invalidate_configuration(collection.name());
        Some(collection)
    }

    fn select_victim(&self) -> Result<usize> {
        let mut victim: Option<(usize, f64)> = None;
        for (slot, item) in self.items.iter().enumerate() {
            let Some(collection) = item else { return Ok(slot) };
            // Busy collections are skipped, never waited for
            let Some(_guard) = collection.lock().try_read() else { continue };
            if !collection.allow_unload() {
                continue;
            }
            let age = self.total_references.saturating_sub(collection.timestamp()).max(1);
            let density = collection.ref_count() as f64 / age as f64;
            if victim.is_none_or(|(_, min)| density < min) {
                victim = Some((slot, density));
            }
        }
        victim.map(|(slot, _)| slot).ok_or_else(|| {
            tracing::warn!(capacity = self.items.len(), "no collection can be evicted");
            Error::new(
                ErrorKind::CacheFull,
                format!("all {} cached collections are locked or pinned", self.items.len()),
            )
        })
    }

    fn evict(&mut self, slot: usize) -> Result<Option<Arc<Collection>>> {
        let Some(victim) = self.items[slot].clone() else { return Ok(None) };
        self.hooks.invalidate_configuration(victim.name());
        if let Err(e) = self.hooks.sync(&victim) {
            tracing::error!(collection = victim.name(), error = %e, "failed to sync evicted collection");
            return Err(e);
        }
        self.items[slot] = None;
        self.map.remove(&victim.key());
        self.names.remove(victim.name());
        tracing::debug!(collection = victim.name(), refs = victim.ref_count(), "evicted collection");
        Ok(Some(victim))
    }

    fn request_growth(&mut self) -> Result<()> {
        if self.replacements <= self.growth_threshold {
            return Ok(());
        }
        let granted = self.cache_manager.as_ref()
            .and_then(|manager| manager.request_memory(CACHE_NAME, self.items.len()));
        match granted {
            Some(size) => self.resize(size),
            None => {
                self.replacements = 0;
                Ok(())
            }
        }
    }

    /// Change the number of slots.
    ///
    /// Shrinking keeps the first `new_size` resident collections and evicts
    /// the rest; growing keeps everything. Both rebuild the maps.
    pub fn resize(&mut self, new_size: usize) -> Result<()> {
        let live: Vec<Arc<Collection>> = self.items.iter().flatten().cloned().collect();
        let keep = new_size.min(live.len());
        for victim in &live[keep..] {
            self.hooks.invalidate_configuration(victim.name());
            self.hooks.sync(victim)?;
        }
        tracing::debug!(from = self.items.len(), to = new_size, evicted = live.len() - keep, "resizing collection cache");

        let mut items: Vec<Option<Arc<Collection>>> = live.into_iter().take(keep).map(Some).collect();
        items.resize(new_size, None);
        self.map = HashMap::with_capacity(new_size);
        self.names = HashMap::with_capacity(new_size);
        for (slot, collection) in items.iter().enumerate() {
            if let Some(collection) = collection {
                self.map.insert(collection.key(), slot);
                self.names.insert(collection.name().to_string(), collection.key());
            }
        }
        self.items = items;
        self.replacements = 0;
        Ok(())
    }

    /// Verify that key map, name map and slots agree
    pub fn check_consistency(&self) -> Result<()> {
        let inconsistent = |msg: String| Error::new(ErrorKind::Internal, msg);
        let resident = self.items.iter().flatten().count();
        if resident != self.map.len() || resident != self.names.len() {
            return Err(inconsistent(format!(
                "{} resident collections, {} keys, {} names",
                resident, self.map.len(), self.names.len()
            )));
        }
        for (&key, &slot) in &self.map {
            let collection = self.items.get(slot).and_then(Option::as_ref)
                .ok_or_else(|| inconsistent(format!("key {} points at empty slot {}", key, slot)))?;
            if collection.key() != key {
                return Err(inconsistent(format!("slot {} holds key {}, expected {}", slot, collection.key(), key)));
            }
            if self.names.get(collection.name()) != Some(&key) {
                return Err(inconsistent(format!("name '{}' does not map to key {}", collection.name(), key)));
            }
        }
        for (name, key) in &self.names {
            if !self.map.contains_key(key) {
                return Err(inconsistent(format!("name '{}' maps to unknown key {}", name, key)));
            }
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Collection>> {
        self.items.iter().flatten()
    }
}
