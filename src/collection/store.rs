use std::sync::Arc;
use parking_lot::Mutex;
use crate::collection::cache::{CollectionCache, EvictionHooks};
use crate::collection::collection::{Collection, CollectionMetadata};
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::CollectionId;
use crate::memory::cache_manager::CacheManager;
use crate::storage::store::KeyValueStore;

const METADATA_KEY_PREFIX: u8 = 0xf0;

fn metadata_key(name: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(name.len() + 1);
    key.push(METADATA_KEY_PREFIX);
    key.extend_from_slice(name.as_bytes());
    key
}

fn write_metadata(store: &dyn KeyValueStore, collection: &Collection) -> Result<()> {
    let bytes = bincode::serialize(&collection.metadata())?;
    let lock = store.lock();
    let token = lock.write()?;
    store.put(&token, &metadata_key(collection.name()), &bytes)?;
    collection.mark_clean();
    Ok(())
}

/// Writes dirty collections back when the cache lets them go
struct WriteBack {
    store: Arc<dyn KeyValueStore>,
}

impl EvictionHooks for WriteBack {
    fn invalidate_configuration(&self, name: &str) {
        tracing::debug!(collection = name, "invalidating collection configuration");
    }

    fn sync(&self, collection: &Collection) -> Result<()> {
        if collection.is_dirty() {
            write_metadata(self.store.as_ref(), collection)?;
        }
        Ok(())
    }
}

/// Collection metadata persisted in a key/value store, fronted by a
/// [`CollectionCache`] behind one mutex
pub struct CollectionStore {
    store: Arc<dyn KeyValueStore>,
    cache: Mutex<CollectionCache>,
}

impl CollectionStore {
    pub fn new(store: Arc<dyn KeyValueStore>, config: &Config, cache_manager: Option<Arc<dyn CacheManager>>) -> Self {
        let hooks = Arc::new(WriteBack { store: store.clone() });
        let mut cache = CollectionCache::from_config(config).with_hooks(hooks);
        if let Some(manager) = cache_manager {
            cache = cache.with_cache_manager(manager);
        }
        CollectionStore {
            store,
            cache: Mutex::new(cache),
        }
    }

    /// Create and persist a new collection
    pub fn create(&self, id: CollectionId, name: &str) -> Result<Arc<Collection>> {
        let mut cache = self.cache.lock();
        if cache.get_by_name(name).is_some() || self.load(name)?.is_some() {
            return Err(Error::new(ErrorKind::InvalidArgument, format!("collection '{}' already exists", name)));
        }
        let collection = Arc::new(Collection::new(CollectionMetadata::new(id, name)));
        write_metadata(self.store.as_ref(), &collection)?;
        cache.add(collection.clone(), 1)?;
        tracing::debug!(collection = name, %id, "created collection");
        Ok(collection)
    }

    /// Cached collection or the one loaded from the store, `None` if unknown
    pub fn open(&self, name: &str) -> Result<Option<Arc<Collection>>> {
        let mut cache = self.cache.lock();
        if let Some(collection) = cache.get_by_name(name) {
            cache.touch(collection.key());
            return Ok(Some(collection));
        }
        let Some(metadata) = self.load(name)? else { return Ok(None) };
        let collection = Arc::new(Collection::new(metadata));
        cache.add(collection.clone(), 1)?;
        Ok(Some(collection))
    }

    // Read token is released before the caller touches the cache again
    fn load(&self, name: &str) -> Result<Option<CollectionMetadata>> {
        let lock = self.store.lock();
        let token = lock.read()?;
        match self.store.get(&token, &metadata_key(name))? {
            Some(value) => Ok(Some(bincode::deserialize(&value.data)?)),
            None => Ok(None),
        }
    }

    pub fn save(&self, collection: &Collection) -> Result<()> {
        write_metadata(self.store.as_ref(), collection)
    }

    pub fn remove(&self, name: &str) -> Result<bool> {
        let mut cache = self.cache.lock();
        if let Some(collection) = cache.get_by_name(name) {
            cache.remove(collection.key());
        }
        let lock = self.store.lock();
        let token = lock.write()?;
        self.store.remove(&token, &metadata_key(name))
    }

    /// Write back every dirty cached collection
    pub fn sync_all(&self) -> Result<usize> {
        let cache = self.cache.lock();
        let mut written = 0;
        for collection in cache.iter().filter(|c| c.is_dirty()) {
            write_metadata(self.store.as_ref(), collection)?;
            written += 1;
        }
        Ok(written)
    }

    pub fn cached(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn check_consistency(&self) -> Result<()> {
        self.cache.lock().check_consistency()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory_store::MemoryStore;

    fn collections(cache_size: usize) -> CollectionStore {
        let config = Config { collection_cache_size: cache_size, ..Config::default() };
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new("collections", &config));
        CollectionStore::new(store, &config, None)
    }

    #[test]
    fn open_hits_cache_and_counts_reference() {
        let store = collections(4);
        let created = store.create(CollectionId(1), "/db/books").unwrap();
        let opened = store.open("/db/books").unwrap().unwrap();
        assert!(Arc::ptr_eq(&created, &opened));
        assert_eq!(opened.ref_count(), 2);
        assert!(store.open("/db/missing").unwrap().is_none());
    }

    #[test]
    fn evicted_changes_are_written_back() {
        let store = collections(1);
        let books = store.create(CollectionId(1), "/db/books").unwrap();
        books.add_document("a.xml");
        assert!(books.is_dirty());

        store.create(CollectionId(2), "/db/music").unwrap();
        assert!(!books.is_dirty());
        assert_eq!(store.cached(), 1);

        let reopened = store.open("/db/books").unwrap().unwrap();
        assert!(!Arc::ptr_eq(&books, &reopened));
        assert_eq!(reopened.metadata().documents, ["a.xml"]);
        store.check_consistency().unwrap();
    }

    #[test]
    fn duplicate_and_removed_collections() {
        let store = collections(4);
        store.create(CollectionId(1), "/db/books").unwrap();
        let err = store.create(CollectionId(9), "/db/books").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
        assert!(store.remove("/db/books").unwrap());
        assert!(store.open("/db/books").unwrap().is_none());
        assert_eq!(store.cached(), 0);
    }

    #[test]
    fn sync_all_writes_dirty_only() {
        let store = collections(4);
        let books = store.create(CollectionId(1), "/db/books").unwrap();
        store.create(CollectionId(2), "/db/music").unwrap();
        books.add_document("b.xml");
        assert_eq!(store.sync_all().unwrap(), 1);
        assert_eq!(store.sync_all().unwrap(), 0);
    }
}
