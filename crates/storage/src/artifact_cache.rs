//! Persistent, priority-evicting cache for computed artifacts.
//!
//! Values are opaque byte blobs keyed by a deterministic encoding of the
//! parameters that produced them, so an entry never needs invalidation by
//! content; it only leaves the cache under capacity pressure or on `clear`.
//!
//! ## Eviction
//!
//! Each entry carries an integer priority (higher = evict later). After a
//! write pushes usage over the byte budget or the entry cap, entries are
//! removed in ascending `(priority, write sequence)` order until the cache is
//! back within bounds. The entry just written is a candidate like any other.
//!
//! ## Tiers
//!
//! - Disk: one object per entry under `<path>/entries/`, via `object_store`
//! - Hot: optional in-memory LRU of recently used values
//!
//! ## Degraded mode
//!
//! If the backing store cannot be opened the cache logs one error and then
//! behaves as "always miss on get, drop on put".

use bytes::Bytes;
use futures::TryStreamExt;
use lru::LruCache;
use metrics::{counter, gauge};
use object_store::{local::LocalFileSystem, memory::InMemory, path::Path, ObjectStore};
use std::collections::{BTreeSet, HashMap};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::codec::{decode_f64s, encode_f64s};
use crate::entry::{
    decode_entry, decode_header, encode_entry, object_path, EntryMeta, ENTRY_PREFIX, HEADER_LEN,
};
use crate::{CacheConfig, CacheError, CacheResult};

/// Statistics for the artifact cache.
///
/// All fields are atomic so accounting accessors never take the index lock.
#[derive(Default, Debug)]
pub struct ArtifactCacheStats {
    /// Lookups served from either tier
    pub hits: AtomicU64,
    /// Lookups that found nothing (or an unreadable entry)
    pub misses: AtomicU64,
    /// Lookups served from the in-memory tier
    pub hot_hits: AtomicU64,
    /// Successful writes
    pub writes: AtomicU64,
    /// Writes dropped (degraded mode, oversize value, backend failure)
    pub dropped_writes: AtomicU64,
    /// Entries removed by eviction
    pub evictions: AtomicU64,
    /// Current usage in bytes (key + value of every entry)
    pub used_bytes: AtomicU64,
    /// Current number of entries
    pub entry_count: AtomicU64,
}

impl ArtifactCacheStats {
    /// Cache hit rate as a percentage (0-100).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            (hits as f64 / total as f64) * 100.0
        }
    }

    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        counter!("cubeview_artifact_cache_hits_total").increment(1);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        counter!("cubeview_artifact_cache_misses_total").increment(1);
    }
}

#[derive(Debug, Clone, Copy)]
struct IndexedEntry {
    size: u64,
    meta: EntryMeta,
}

/// Eviction index: every live entry, ordered by `(priority, seq)`.
#[derive(Default)]
struct CacheIndex {
    entries: HashMap<Vec<u8>, IndexedEntry>,
    order: BTreeSet<(i64, u64, Vec<u8>)>,
    used: u64,
    next_seq: u64,
}

impl CacheIndex {
    fn insert(&mut self, key: Vec<u8>, entry: IndexedEntry) {
        if let Some(old) = self.entries.insert(key.clone(), entry) {
            self.order.remove(&(old.meta.priority, old.meta.seq, key.clone()));
            self.used -= old.size;
        }
        self.order.insert((entry.meta.priority, entry.meta.seq, key));
        self.used += entry.size;
        self.next_seq = self.next_seq.max(entry.meta.seq + 1);
    }

    fn remove(&mut self, key: &[u8]) -> Option<IndexedEntry> {
        let old = self.entries.remove(key)?;
        self.order
            .remove(&(old.meta.priority, old.meta.seq, key.to_vec()));
        self.used -= old.size;
        Some(old)
    }

    fn lowest(&self) -> Option<Vec<u8>> {
        self.order.iter().next().map(|(_, _, key)| key.clone())
    }

    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

/// Persistent key→bytes cache with priority eviction.
pub struct ArtifactCache {
    backend: Option<Arc<dyn ObjectStore>>,
    index: Mutex<CacheIndex>,
    hot: Option<Mutex<LruCache<Vec<u8>, Bytes>>>,
    max_bytes: u64,
    max_entries: Option<usize>,
    stats: Arc<ArtifactCacheStats>,
}

impl std::fmt::Debug for ArtifactCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactCache")
            .field("enabled", &self.is_enabled())
            .field("max_bytes", &self.max_bytes)
            .field("max_entries", &self.max_entries)
            .field("used_bytes", &self.used_storage())
            .finish()
    }
}

impl ArtifactCache {
    /// Open (or create) the on-disk cache described by `config`.
    ///
    /// Never fails: if the directory cannot be created or the index cannot be
    /// rebuilt, an error is logged once and a degraded cache is returned.
    pub async fn open(config: &CacheConfig) -> Self {
        match Self::try_open(config).await {
            Ok(cache) => cache,
            Err(e) => {
                error!(
                    path = %config.path.display(),
                    error = %e,
                    "Artifact cache unavailable, caching disabled"
                );
                Self::degraded(config)
            }
        }
    }

    async fn try_open(config: &CacheConfig) -> CacheResult<Self> {
        config.validate().map_err(CacheError::Config)?;
        std::fs::create_dir_all(&config.path)?;
        let store = LocalFileSystem::new_with_prefix(&config.path)
            .map_err(|e| CacheError::OpenFailed(e.to_string()))?;
        let cache = Self::with_store(Arc::new(store), config).await?;

        info!(
            path = %config.path.display(),
            entries = cache.entry_count(),
            used_mb = format!("{:.2}", cache.used_storage() as f64 / (1024.0 * 1024.0)),
            max_mb = format!("{:.2}", cache.max_storage() as f64 / (1024.0 * 1024.0)),
            "Artifact cache opened"
        );
        Ok(cache)
    }

    /// Build a cache on an arbitrary object store, rebuilding the index from
    /// whatever entries it already holds.
    pub async fn with_store(store: Arc<dyn ObjectStore>, config: &CacheConfig) -> CacheResult<Self> {
        config.validate().map_err(CacheError::Config)?;

        let cache = Self {
            backend: Some(store),
            index: Mutex::new(CacheIndex::default()),
            hot: NonZeroUsize::new(config.hot_entries).map(|n| Mutex::new(LruCache::new(n))),
            max_bytes: config.max_storage_bytes,
            max_entries: config.max_entries,
            stats: Arc::new(ArtifactCacheStats::default()),
        };
        cache.rebuild_index().await?;
        Ok(cache)
    }

    /// Volatile cache backed by memory only.
    pub async fn in_memory(config: &CacheConfig) -> CacheResult<Self> {
        Self::with_store(Arc::new(InMemory::new()), config).await
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self::degraded(&CacheConfig::default())
    }

    fn degraded(config: &CacheConfig) -> Self {
        Self {
            backend: None,
            index: Mutex::new(CacheIndex::default()),
            hot: None,
            max_bytes: config.max_storage_bytes,
            max_entries: config.max_entries,
            stats: Arc::new(ArtifactCacheStats::default()),
        }
    }

    /// Whether a backing store is available.
    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Look up `key`. A missing or unreadable entry is a miss, not an error.
    pub async fn get(&self, key: &[u8]) -> Option<Bytes> {
        let Some(store) = &self.backend else {
            self.stats.record_miss();
            return None;
        };

        if let Some(hot) = &self.hot {
            if let Some(value) = hot.lock().await.get(key) {
                self.stats.hot_hits.fetch_add(1, Ordering::Relaxed);
                self.stats.record_hit();
                return Some(value.clone());
            }
        }

        let index = self.index.lock().await;
        if !index.entries.contains_key(key) {
            self.stats.record_miss();
            return None;
        }

        match read_entry(store.as_ref(), key).await {
            Ok(value) => {
                drop(index);
                if let Some(hot) = &self.hot {
                    hot.lock().await.put(key.to_vec(), value.clone());
                }
                self.stats.record_hit();
                Some(value)
            }
            Err(e) => {
                warn!(key_len = key.len(), error = %e, "Failed to read cache entry, treating as miss");
                self.stats.record_miss();
                None
            }
        }
    }

    /// Store `value` under `key` with an eviction `priority` (higher = evict later).
    ///
    /// Returns the number of entries evicted to get back within bounds. The
    /// write is dropped if the cache is degraded or the entry alone exceeds
    /// the byte budget.
    pub async fn put(&self, key: &[u8], value: &[u8], priority: i64) -> usize {
        let Some(store) = &self.backend else {
            self.stats.dropped_writes.fetch_add(1, Ordering::Relaxed);
            return 0;
        };

        let size = (key.len() + value.len()) as u64;
        if size > self.max_bytes {
            warn!(
                size = size,
                max_bytes = self.max_bytes,
                "Artifact larger than cache budget, not stored"
            );
            self.stats.dropped_writes.fetch_add(1, Ordering::Relaxed);
            return 0;
        }

        let mut index = self.index.lock().await;
        let meta = EntryMeta {
            priority,
            seq: index.take_seq(),
        };

        let path = object_path(key);
        if let Err(e) = store.put(&path, encode_entry(key, value, meta)).await {
            warn!(path = %path, error = %e, "Failed to write cache entry");
            self.stats.dropped_writes.fetch_add(1, Ordering::Relaxed);
            return 0;
        }

        index.insert(key.to_vec(), IndexedEntry { size, meta });
        if let Some(hot) = &self.hot {
            hot.lock().await.put(key.to_vec(), Bytes::copy_from_slice(value));
        }
        self.stats.writes.fetch_add(1, Ordering::Relaxed);

        let evicted = self.evict_locked(store.as_ref(), &mut index).await;
        self.publish_usage(&index);

        debug!(
            key_len = key.len(),
            value_len = value.len(),
            priority = priority,
            evicted = evicted,
            "Stored cache entry"
        );
        evicted
    }

    /// Decode the entry under `key` as a sequence of doubles.
    ///
    /// A blob with a length that is not a multiple of 8 is logged and treated as a miss.
    pub async fn get_f64s(&self, key: &[u8]) -> Option<Vec<f64>> {
        let bytes = self.get(key).await?;
        match decode_f64s(&bytes) {
            Ok(values) => Some(values),
            Err(e) => {
                warn!(key_len = key.len(), error = %e, "Undecodable cache entry, treating as miss");
                None
            }
        }
    }

    /// Store a sequence of doubles under `key`.
    pub async fn put_f64s(&self, key: &[u8], values: &[f64], priority: i64) -> usize {
        self.put(key, &encode_f64s(values), priority).await
    }

    /// Bytes currently used (key + value of every entry).
    pub fn used_storage(&self) -> u64 {
        self.stats.used_bytes.load(Ordering::Relaxed)
    }

    /// Byte budget.
    pub fn max_storage(&self) -> u64 {
        self.max_bytes
    }

    /// Number of live entries.
    pub fn entry_count(&self) -> usize {
        self.stats.entry_count.load(Ordering::Relaxed) as usize
    }

    /// Shared statistics handle.
    pub fn stats(&self) -> Arc<ArtifactCacheStats> {
        self.stats.clone()
    }

    /// Remove every entry from both tiers.
    pub async fn clear(&self) -> CacheResult<()> {
        let Some(store) = &self.backend else {
            return Ok(());
        };

        let mut index = self.index.lock().await;
        let prefix = Path::from(ENTRY_PREFIX);
        let locations: Vec<Path> = store
            .list(Some(&prefix))
            .map_ok(|meta| meta.location)
            .try_collect()
            .await?;

        for location in &locations {
            match store.delete(location).await {
                Ok(()) | Err(object_store::Error::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }

        *index = CacheIndex {
            next_seq: index.next_seq,
            ..CacheIndex::default()
        };
        if let Some(hot) = &self.hot {
            hot.lock().await.clear();
        }
        self.publish_usage(&index);

        info!(removed = locations.len(), "Artifact cache cleared");
        Ok(())
    }

    async fn evict_locked(&self, store: &dyn ObjectStore, index: &mut CacheIndex) -> usize {
        let mut evicted = 0usize;
        let mut bytes_freed = 0u64;

        while index.used > self.max_bytes
            || self
                .max_entries
                .is_some_and(|max| index.entries.len() > max)
        {
            let Some(key) = index.lowest() else {
                break;
            };

            let path = object_path(&key);
            match store.delete(&path).await {
                Ok(()) | Err(object_store::Error::NotFound { .. }) => {}
                Err(e) => warn!(path = %path, error = %e, "Failed to delete evicted entry"),
            }

            if let Some(old) = index.remove(&key) {
                bytes_freed += old.size;
            }
            if let Some(hot) = &self.hot {
                hot.lock().await.pop(&key);
            }
            evicted += 1;
        }

        if evicted > 0 {
            self.stats
                .evictions
                .fetch_add(evicted as u64, Ordering::Relaxed);
            counter!("cubeview_artifact_cache_evictions_total").increment(evicted as u64);
            info!(
                entries_evicted = evicted,
                bytes_freed = bytes_freed,
                used_bytes = index.used,
                max_bytes = self.max_bytes,
                "Artifact cache eviction completed"
            );
        }
        evicted
    }

    async fn rebuild_index(&self) -> CacheResult<()> {
        let Some(store) = &self.backend else {
            return Ok(());
        };

        let prefix = Path::from(ENTRY_PREFIX);
        let objects: Vec<_> = store.list(Some(&prefix)).try_collect().await?;

        let mut index = self.index.lock().await;
        let mut corrupt = 0usize;
        for object in objects {
            match read_index_entry(store.as_ref(), &object.location, object.size).await {
                Ok((key, entry)) => index.insert(key, entry),
                Err(e) => {
                    warn!(path = %object.location, error = %e, "Dropping unreadable cache entry");
                    let _ = store.delete(&object.location).await;
                    corrupt += 1;
                }
            }
        }

        if corrupt > 0 {
            warn!(count = corrupt, "Removed corrupt cache entries on open");
        }

        // Budget may have shrunk since the entries were written.
        self.evict_locked(store.as_ref(), &mut index).await;
        self.publish_usage(&index);
        Ok(())
    }

    fn publish_usage(&self, index: &CacheIndex) {
        self.stats.used_bytes.store(index.used, Ordering::Relaxed);
        self.stats
            .entry_count
            .store(index.entries.len() as u64, Ordering::Relaxed);
        gauge!("cubeview_artifact_cache_used_bytes").set(index.used as f64);
    }
}

async fn read_entry(store: &dyn ObjectStore, key: &[u8]) -> CacheResult<Bytes> {
    let bytes = store.get(&object_path(key)).await?.bytes().await?;
    let entry = decode_entry(bytes)?;
    if entry.key != key {
        return Err(CacheError::corrupt("stored key does not match lookup key"));
    }
    Ok(entry.value)
}

async fn read_index_entry(
    store: &dyn ObjectStore,
    location: &Path,
    object_size: usize,
) -> CacheResult<(Vec<u8>, IndexedEntry)> {
    if object_size < HEADER_LEN {
        return Err(CacheError::corrupt("object shorter than header"));
    }
    let header = store.get_range(location, 0..HEADER_LEN).await?;
    let (meta, key_len) = decode_header(&header)?;
    if object_size < HEADER_LEN + key_len {
        return Err(CacheError::corrupt("key extends past end of object"));
    }
    let key = store
        .get_range(location, HEADER_LEN..HEADER_LEN + key_len)
        .await?
        .to_vec();
    if object_path(&key) != *location {
        return Err(CacheError::corrupt("object name does not match stored key"));
    }

    let size = (object_size - HEADER_LEN) as u64;
    Ok((key, IndexedEntry { size, meta }))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_cache(max_bytes: u64, max_entries: Option<usize>) -> ArtifactCache {
        ArtifactCache::in_memory(&CacheConfig::with_limits(max_bytes, max_entries))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let cache = memory_cache(1024, None).await;
        assert!(cache.get(b"missing").await.is_none());

        cache.put(b"k1", b"hello", 0).await;
        assert_eq!(cache.get(b"k1").await.unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(cache.entry_count(), 1);
        assert_eq!(cache.used_storage(), 2 + 5);

        let stats = cache.stats();
        assert_eq!(stats.hits.load(Ordering::Relaxed), 1);
        assert_eq!(stats.misses.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_usage() {
        let cache = memory_cache(1024, None).await;
        cache.put(b"k", b"12345", 0).await;
        cache.put(b"k", b"12", 0).await;
        assert_eq!(cache.entry_count(), 1);
        assert_eq!(cache.used_storage(), 3);
        assert_eq!(cache.get(b"k").await.unwrap(), Bytes::from_static(b"12"));
    }

    #[tokio::test]
    async fn test_read_bypasses_hot_tier() {
        let config = CacheConfig {
            hot_entries: 0,
            ..CacheConfig::with_limits(1024, None)
        };
        let cache = ArtifactCache::in_memory(&config).await.unwrap();
        cache.put(b"k", b"v", 0).await;
        assert_eq!(cache.get(b"k").await.unwrap(), Bytes::from_static(b"v"));
        assert_eq!(cache.stats().hot_hits.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_oversize_value_is_dropped() {
        let cache = memory_cache(8, None).await;
        assert_eq!(cache.put(b"k", &[0u8; 16], 0).await, 0);
        assert!(cache.get(b"k").await.is_none());
        assert_eq!(cache.used_storage(), 0);
    }

    #[tokio::test]
    async fn test_disabled_cache_always_misses() {
        let cache = ArtifactCache::disabled();
        assert!(!cache.is_enabled());
        assert_eq!(cache.put(b"k", b"v", 1).await, 0);
        assert!(cache.get(b"k").await.is_none());
        assert_eq!(cache.entry_count(), 0);
        assert!(cache.clear().await.is_ok());
    }

    #[tokio::test]
    async fn test_bad_blob_reads_as_miss() {
        let cache = memory_cache(1024, None).await;
        cache.put(b"k", &[1, 2, 3], 0).await;
        assert!(cache.get_f64s(b"k").await.is_none());

        cache.put_f64s(b"d", &[1.5, -2.0], 0).await;
        assert_eq!(cache.get_f64s(b"d").await.unwrap(), vec![1.5, -2.0]);
    }
}
