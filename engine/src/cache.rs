//! Durable cache port and the snapshot adapter on top of it.
//!
//! The port is a plain synchronous key-value boundary so that installing a
//! tentative snapshot never suspends. [`SnapshotCache`] owns the encoding and
//! is deliberately forgiving on read: anything it cannot trust is evicted and
//! reported as absent.

use crate::{
    error::{CacheError, SnapshotError},
    CollectionKind, CollectionSnapshot,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Version of the cache envelope format.
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Key-value persistence that survives restarts.
pub trait DurableCache: Send + Sync {
    /// Read the bytes stored under `key`, `None` if absent.
    fn read(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Replace the bytes stored under `key`.
    fn write(&self, key: &str, bytes: &[u8]) -> CacheResult<()>;

    /// Delete `key`. Deleting an absent key is not an error.
    fn remove(&self, key: &str) -> CacheResult<()>;
}

impl<T: DurableCache + ?Sized> DurableCache for Arc<T> {
    fn read(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        (**self).read(key)
    }

    fn write(&self, key: &str, bytes: &[u8]) -> CacheResult<()> {
        (**self).write(key, bytes)
    }

    fn remove(&self, key: &str) -> CacheResult<()> {
        (**self).remove(key)
    }
}

/// In-memory [`DurableCache`], for tests and hosts without persistent storage.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw bytes under `key`.
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().get(key).cloned()
    }

    /// Store raw bytes, bypassing any encoding.
    pub fn insert_raw(&self, key: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.lock().insert(key.into(), bytes.into());
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DurableCache for MemoryCache {
    fn read(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        Ok(self.raw(key))
    }

    fn write(&self, key: &str, bytes: &[u8]) -> CacheResult<()> {
        self.insert_raw(key, bytes);
        Ok(())
    }

    fn remove(&self, key: &str) -> CacheResult<()> {
        self.lock().remove(key);
        Ok(())
    }
}

/// Envelope written to the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheRecord {
    format_version: u32,
    collection: CollectionKind,
    snapshot: CollectionSnapshot,
}

/// Why a stored entry was discarded.
#[derive(Debug)]
enum Corruption {
    Decode(serde_json::Error),
    UnsupportedFormat(u32),
    WrongCollection(CollectionKind),
    Invalid(SnapshotError),
}

impl std::fmt::Display for Corruption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Corruption::Decode(e) => write!(f, "undecodable entry: {e}"),
            Corruption::UnsupportedFormat(v) => write!(f, "unsupported format version {v}"),
            Corruption::WrongCollection(c) => write!(f, "entry belongs to {c}"),
            Corruption::Invalid(e) => write!(f, "invalid snapshot: {e}"),
        }
    }
}

/// Serializes collection snapshots to a [`DurableCache`].
#[derive(Debug, Clone)]
pub struct SnapshotCache<C> {
    cache: C,
    namespace: String,
}

impl<C: DurableCache> SnapshotCache<C> {
    pub fn new(cache: C, namespace: impl Into<String>) -> Self {
        Self {
            cache,
            namespace: namespace.into(),
        }
    }

    /// Cache key for `collection`, e.g. `basket:cart`.
    pub fn key(&self, collection: CollectionKind) -> String {
        format!("{}:{}", self.namespace, collection)
    }

    /// The underlying port.
    pub fn inner(&self) -> &C {
        &self.cache
    }

    /// Load the cached snapshot of `collection`.
    ///
    /// Returns `None` when nothing usable is stored. Corrupted entries are
    /// evicted on the way.
    pub fn load(&self, collection: CollectionKind) -> Option<CollectionSnapshot> {
        let key = self.key(collection);
        let bytes = match self.cache.read(&key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(%collection, error = %e, "cache read failed, treating as absent");
                return None;
            }
        };

        match decode(collection, &bytes) {
            Ok(snapshot) => Some(snapshot),
            Err(corruption) => {
                tracing::warn!(%collection, reason = %corruption, "evicting corrupted cache entry");
                if let Err(e) = self.cache.remove(&key) {
                    tracing::warn!(%collection, error = %e, "failed to evict cache entry");
                }
                None
            }
        }
    }

    /// Load, falling back to the empty snapshot.
    pub fn load_or_empty(&self, collection: CollectionKind) -> CollectionSnapshot {
        self.load(collection).unwrap_or_default()
    }

    /// Persist `snapshot` as the cached state of `collection`.
    pub fn save(&self, collection: CollectionKind, snapshot: &CollectionSnapshot) -> CacheResult<()> {
        let record = CacheRecord {
            format_version: CACHE_FORMAT_VERSION,
            collection,
            snapshot: snapshot.clone(),
        };
        let bytes = serde_json::to_vec(&record).map_err(|e| CacheError::Encode(e.to_string()))?;
        self.cache.write(&self.key(collection), &bytes)
    }

    /// Remove the cached state of `collection`.
    pub fn evict(&self, collection: CollectionKind) -> CacheResult<()> {
        self.cache.remove(&self.key(collection))
    }
}

fn decode(collection: CollectionKind, bytes: &[u8]) -> Result<CollectionSnapshot, Corruption> {
    let record: CacheRecord = serde_json::from_slice(bytes).map_err(Corruption::Decode)?;
    if record.format_version > CACHE_FORMAT_VERSION {
        return Err(Corruption::UnsupportedFormat(record.format_version));
    }
    if record.collection != collection {
        return Err(Corruption::WrongCollection(record.collection));
    }
    record
        .snapshot
        .validate(collection)
        .map_err(Corruption::Invalid)?;
    Ok(record.snapshot)
}
