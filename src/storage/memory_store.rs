use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use bytes::Bytes;
use crc32fast::Hasher;
use parking_lot::Mutex;
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::storage::store::{KeyValueStore, LockToken, RangeQuery, StoreLock, StoredValue, ValueAddress};

struct Slot {
    address: ValueAddress,
    data: Vec<u8>,
}

/// Ordered in-memory key/value store with append support.
/// Optionally backed by a checksummed snapshot file written on `flush`.
pub struct MemoryStore {
    lock: StoreLock,
    entries: Mutex<BTreeMap<Vec<u8>, Slot>>,
    next_address: AtomicU64,
    read_only: AtomicBool,
    snapshot_path: Option<PathBuf>,
}

// [ crc32 (u32 LE) ][ payload length (u64 LE) ][ bincode payload ]
const SNAPSHOT_HEADER: usize = 12;

impl MemoryStore {
    pub fn new(name: &str, config: &Config) -> Self {
        MemoryStore {
            lock: StoreLock::new(name, config.lock_timeout()),
            entries: Mutex::new(BTreeMap::new()),
            next_address: AtomicU64::new(1),
            read_only: AtomicBool::new(false),
            snapshot_path: None,
        }
    }

    /// Store persisted at `config.snapshot_path(name)`, loading an existing snapshot
    pub fn persistent(name: &str, config: &Config) -> Result<Self> {
        let path = config.snapshot_path(name);
        let mut store = MemoryStore::new(name, config);
        if path.exists() {
            store.load_snapshot(&path)?;
        }
        store.snapshot_path = Some(path);
        Ok(store)
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn allocate_address(&self) -> ValueAddress {
        ValueAddress(self.next_address.fetch_add(1, Ordering::Relaxed))
    }

    fn check_writable(&self, token: &LockToken<'_>, operation: &str) -> Result<()> {
        token.require_write(operation)?;
        if self.read_only.load(Ordering::SeqCst) {
            return Err(Error::new(
                ErrorKind::ReadOnly,
                format!("{} on read-only store '{}'", operation, self.lock.name()),
            ));
        }
        Ok(())
    }

    fn range<'a>(
        entries: &'a BTreeMap<Vec<u8>, Slot>,
        query: &'a RangeQuery,
    ) -> impl Iterator<Item = (&'a Vec<u8>, &'a Slot)> + 'a {
        entries
            .range::<[u8], _>((Bound::Included(query.lower_bound()), Bound::Unbounded))
            .take_while(move |(key, _)| match query {
                RangeQuery::TruncRight(prefix) => key.starts_with(prefix),
                RangeQuery::Range { end, .. } => key.as_slice() < end.as_slice(),
            })
    }

    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        let pairs: Vec<(Vec<u8>, Vec<u8>)> = self.entries.lock()
            .iter()
            .map(|(key, slot)| (key.clone(), slot.data.clone()))
            .collect();
        let payload = bincode::serialize(&pairs)?;

        let mut hasher = Hasher::new();
        hasher.update(&payload);

        let mut file = File::create(path)?;
        file.write_all(&hasher.finalize().to_le_bytes())?;
        file.write_all(&(payload.len() as u64).to_le_bytes())?;
        file.write_all(&payload)?;
        file.sync_all()?;
        Ok(())
    }

    pub fn load_snapshot(&mut self, path: &Path) -> Result<()> {
        let mut data = Vec::new();
        File::open(path)?.read_to_end(&mut data)?;
        if data.len() < SNAPSHOT_HEADER {
            return Err(Error::new(ErrorKind::Corrupted, format!("snapshot {} too short", path.display())));
        }
        let checksum = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let mut len_buf = [0u8; 8];
        len_buf.copy_from_slice(&data[4..SNAPSHOT_HEADER]);
        let len = u64::from_le_bytes(len_buf) as usize;
        let payload = data.get(SNAPSHOT_HEADER..SNAPSHOT_HEADER + len)
            .ok_or_else(|| Error::new(ErrorKind::Corrupted, format!("snapshot {} truncated", path.display())))?;

        let mut hasher = Hasher::new();
        hasher.update(payload);
        if hasher.finalize() != checksum {
            return Err(Error::new(ErrorKind::Corrupted, format!("snapshot {} checksum mismatch", path.display())));
        }

        let pairs: Vec<(Vec<u8>, Vec<u8>)> = bincode::deserialize(payload)?;
        let mut entries = self.entries.lock();
        entries.clear();
        for (key, value) in pairs {
            let address = self.allocate_address();
            entries.insert(key, Slot { address, data: value });
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn lock(&self) -> &StoreLock {
        &self.lock
    }

    fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::SeqCst)
    }

    fn get(&self, _token: &LockToken<'_>, key: &[u8]) -> Result<Option<StoredValue>> {
        Ok(self.entries.lock().get(key).map(|slot| StoredValue {
            address: slot.address,
            data: Bytes::copy_from_slice(&slot.data),
        }))
    }

    fn put(&self, token: &LockToken<'_>, key: &[u8], value: &[u8]) -> Result<ValueAddress> {
        self.check_writable(token, "put")?;
        let address = self.allocate_address();
        self.entries.lock().insert(key.to_vec(), Slot { address, data: value.to_vec() });
        Ok(address)
    }

    fn update(&self, token: &LockToken<'_>, address: ValueAddress, key: &[u8], value: &[u8]) -> Result<ValueAddress> {
        self.check_writable(token, "update")?;
        let mut entries = self.entries.lock();
        match entries.get_mut(key) {
            Some(slot) if slot.address == address => {
                slot.data.clear();
                slot.data.extend_from_slice(value);
                Ok(address)
            }
            Some(slot) => Err(Error::new(
                ErrorKind::InvalidState,
                format!("stale address {:?}, key now lives at {:?}", address, slot.address),
            )),
            None => Err(Error::new(ErrorKind::NotFound, "update of a missing key".to_string())),
        }
    }

    fn append(&self, token: &LockToken<'_>, key: &[u8], fragment: &[u8]) -> Result<ValueAddress> {
        self.check_writable(token, "append")?;
        let mut entries = self.entries.lock();
        if let Some(slot) = entries.get_mut(key) {
            slot.data.extend_from_slice(fragment);
            return Ok(slot.address);
        }
        let address = self.allocate_address();
        entries.insert(key.to_vec(), Slot { address, data: fragment.to_vec() });
        Ok(address)
    }

    fn find_keys(&self, _token: &LockToken<'_>, query: &RangeQuery) -> Result<Vec<Bytes>> {
        let entries = self.entries.lock();
        Ok(Self::range(&entries, query)
            .map(|(key, _)| Bytes::copy_from_slice(key))
            .collect())
    }

    fn find_entries(&self, _token: &LockToken<'_>, query: &RangeQuery) -> Result<Vec<(Bytes, Bytes)>> {
        let entries = self.entries.lock();
        Ok(Self::range(&entries, query)
            .map(|(key, slot)| (Bytes::copy_from_slice(key), Bytes::copy_from_slice(&slot.data)))
            .collect())
    }

    fn remove_all(&self, token: &LockToken<'_>, query: &RangeQuery) -> Result<usize> {
        self.check_writable(token, "remove_all")?;
        let mut entries = self.entries.lock();
        let doomed: Vec<Vec<u8>> = Self::range(&entries, query)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            entries.remove(key);
        }
        Ok(doomed.len())
    }

    fn remove(&self, token: &LockToken<'_>, key: &[u8]) -> Result<bool> {
        self.check_writable(token, "remove")?;
        Ok(self.entries.lock().remove(key).is_some())
    }

    fn flush(&self, token: &LockToken<'_>) -> Result<()> {
        token.require_write("flush")?;
        match &self.snapshot_path {
            Some(path) => self.save_snapshot(path),
            None => Ok(()),
        }
    }
}
