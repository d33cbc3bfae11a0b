use std::time::Duration;
use bytes::Bytes;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use crate::core::error::{Error, ErrorKind, Result};

/// Address of a stored value inside the key/value store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueAddress(pub u64);

/// A value read back from the store together with its address
#[derive(Debug, Clone)]
pub struct StoredValue {
    pub address: ValueAddress,
    pub data: Bytes,
}

/// Key selection for range operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeQuery {
    /// Every key starting with the prefix
    TruncRight(Vec<u8>),
    /// Keys in `[start, end)`
    Range { start: Vec<u8>, end: Vec<u8> },
}

impl RangeQuery {
    pub fn prefix(prefix: impl Into<Vec<u8>>) -> Self {
        RangeQuery::TruncRight(prefix.into())
    }

    pub fn matches(&self, key: &[u8]) -> bool {
        match self {
            RangeQuery::TruncRight(prefix) => key.starts_with(prefix),
            RangeQuery::Range { start, end } => key >= start.as_slice() && key < end.as_slice(),
        }
    }

    /// Smallest key the query can match
    pub fn lower_bound(&self) -> &[u8] {
        match self {
            RangeQuery::TruncRight(prefix) => prefix,
            RangeQuery::Range { start, .. } => start,
        }
    }
}

/// Advisory read/write lock guarding one store file
pub struct StoreLock {
    name: String,
    inner: RwLock<()>,
    timeout: Duration,
}

/// Proof that the caller holds the store lock
pub enum LockToken<'a> {
    Read(RwLockReadGuard<'a, ()>),
    Write(RwLockWriteGuard<'a, ()>),
}

impl LockToken<'_> {
    pub fn is_write(&self) -> bool {
        matches!(self, LockToken::Write(_))
    }

    pub fn require_write(&self, operation: &str) -> Result<()> {
        if self.is_write() {
            Ok(())
        } else {
            Err(Error::new(ErrorKind::InvalidState, format!("{} requires a write lock", operation)))
        }
    }
}

impl StoreLock {
    pub fn new(name: &str, timeout: Duration) -> Self {
        StoreLock {
            name: name.to_string(),
            inner: RwLock::new(()),
            timeout,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared access, bounded by the lock timeout
    pub fn read(&self) -> Result<LockToken<'_>> {
        self.inner.try_read_for(self.timeout)
            .map(LockToken::Read)
            .ok_or_else(|| self.unavailable("read"))
    }

    /// Exclusive access, bounded by the lock timeout
    pub fn write(&self) -> Result<LockToken<'_>> {
        self.inner.try_write_for(self.timeout)
            .map(LockToken::Write)
            .ok_or_else(|| self.unavailable("write"))
    }

    fn unavailable(&self, mode: &str) -> Error {
        tracing::warn!(file = %self.name, mode, "failed to acquire lock");
        Error::new(
            ErrorKind::LockUnavailable,
            format!("failed to acquire {} lock for '{}' within {:?}", mode, self.name, self.timeout),
        )
    }
}

/// Ordered byte-keyed store the structural index is kept in.
///
/// Values under one key may be built up by repeated [`append`](KeyValueStore::append)
/// calls and are read back as the concatenation of the fragments.
pub trait KeyValueStore: Send + Sync {
    fn lock(&self) -> &StoreLock;

    fn is_read_only(&self) -> bool;

    fn get(&self, token: &LockToken<'_>, key: &[u8]) -> Result<Option<StoredValue>>;

    /// Store `value` under `key`, replacing whatever was there
    fn put(&self, token: &LockToken<'_>, key: &[u8], value: &[u8]) -> Result<ValueAddress>;

    /// Replace the value previously read at `address`
    fn update(&self, token: &LockToken<'_>, address: ValueAddress, key: &[u8], value: &[u8]) -> Result<ValueAddress>;

    /// Add a fragment to the end of the value under `key`
    fn append(&self, token: &LockToken<'_>, key: &[u8], fragment: &[u8]) -> Result<ValueAddress>;

    fn find_keys(&self, token: &LockToken<'_>, query: &RangeQuery) -> Result<Vec<Bytes>>;

    fn find_entries(&self, token: &LockToken<'_>, query: &RangeQuery) -> Result<Vec<(Bytes, Bytes)>>;

    /// Remove every matching key, returns how many went away
    fn remove_all(&self, token: &LockToken<'_>, query: &RangeQuery) -> Result<usize>;

    fn remove(&self, token: &LockToken<'_>, key: &[u8]) -> Result<bool>;

    fn flush(&self, token: &LockToken<'_>) -> Result<()>;
}
