use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use crate::core::types::CollectionId;

/// Persisted part of a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionMetadata {
    pub id: CollectionId,
    pub name: String,               // Full path, e.g. /db/books
    pub created: DateTime<Utc>,
    pub documents: Vec<String>,     // Document names
    pub sub_collections: Vec<String>,
}

impl CollectionMetadata {
    pub fn new(id: CollectionId, name: &str) -> Self {
        CollectionMetadata {
            id,
            name: name.to_string(),
            created: Utc::now(),
            documents: Vec::new(),
            sub_collections: Vec::new(),
        }
    }
}

/// A cached collection object.
///
/// Reference count and timestamp drive the cache's density eviction; `lock`
/// is the advisory lock eviction probes without blocking.
#[derive(Debug)]
pub struct Collection {
    key: u64,
    name: String,
    metadata: RwLock<CollectionMetadata>,

    ref_count: AtomicU32,
    timestamp: AtomicU64,
    lock: RwLock<()>,
    pinned: AtomicBool,
    dirty: AtomicBool,
}

impl Collection {
    pub fn new(metadata: CollectionMetadata) -> Self {
        Collection {
            key: metadata.id.0 as u64,
            name: metadata.name.clone(),
            metadata: RwLock::new(metadata),
            ref_count: AtomicU32::new(0),
            timestamp: AtomicU64::new(0),
            lock: RwLock::new(()),
            pinned: AtomicBool::new(false),
            dirty: AtomicBool::new(false),
        }
    }

    pub fn key(&self) -> u64 {
        self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> CollectionId {
        self.metadata.read().id
    }

    pub fn metadata(&self) -> CollectionMetadata {
        self.metadata.read().clone()
    }

    /// Change the metadata; the collection is written back on eviction
    pub fn update<F: FnOnce(&mut CollectionMetadata)>(&self, f: F) {
        f(&mut self.metadata.write());
        self.dirty.store(true, Ordering::Release);
    }

    pub fn add_document(&self, name: &str) {
        self.update(|m| m.documents.push(name.to_string()));
    }

    pub fn ref_count(&self) -> u32 {
        self.ref_count.load(Ordering::Acquire)
    }

    pub fn set_ref_count(&self, count: u32) {
        self.ref_count.store(count, Ordering::Release);
    }

    pub fn increment_ref_count(&self) {
        self.ref_count.fetch_add(1, Ordering::AcqRel);
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp.load(Ordering::Acquire)
    }

    pub fn set_timestamp(&self, timestamp: u64) {
        self.timestamp.store(timestamp, Ordering::Release);
    }

    pub fn lock(&self) -> &RwLock<()> {
        &self.lock
    }

    /// Keep the collection resident regardless of its density
    pub fn pin(&self) {
        self.pinned.store(true, Ordering::Release);
    }

    pub fn unpin(&self) {
        self.pinned.store(false, Ordering::Release);
    }

    pub fn allow_unload(&self) -> bool {
        !self.pinned.load(Ordering::Acquire)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub fn mark_clean(&self) {
        self.dirty.store(false, Ordering::Release);
    }
}
