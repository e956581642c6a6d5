//! Configuration for the artifact cache.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the artifact cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding the cache objects.
    pub path: PathBuf,

    /// Storage budget in bytes (key + value bytes of all entries).
    pub max_storage_bytes: u64,

    /// Optional cap on the number of entries.
    pub max_entries: Option<usize>,

    /// Entries kept in the in-memory LRU in front of the disk store (0 disables it).
    pub hot_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./cache/artifacts"),
            max_storage_bytes: 512 * 1024 * 1024,
            max_entries: None,
            hot_entries: 256,
        }
    }
}

impl CacheConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("ARTIFACT_CACHE_DIR") {
            config.path = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("ARTIFACT_CACHE_MAX_MB") {
            if let Ok(mb) = val.parse::<u64>() {
                config.max_storage_bytes = mb * 1024 * 1024;
            }
        }

        if let Ok(val) = std::env::var("ARTIFACT_CACHE_MAX_ENTRIES") {
            if let Ok(n) = val.parse::<usize>() {
                config.max_entries = if n == 0 { None } else { Some(n) };
            }
        }

        if let Ok(val) = std::env::var("ARTIFACT_CACHE_HOT_ENTRIES") {
            if let Ok(n) = val.parse() {
                config.hot_entries = n;
            }
        }

        config
    }

    /// Budget-only config, handy for in-memory caches.
    pub fn with_limits(max_storage_bytes: u64, max_entries: Option<usize>) -> Self {
        Self {
            max_storage_bytes,
            max_entries,
            ..Self::default()
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_storage_bytes == 0 {
            return Err("max_storage_bytes must be > 0".to_string());
        }

        if self.max_entries == Some(0) {
            return Err("max_entries must be > 0 when set".to_string());
        }

        if self.path.as_os_str().is_empty() {
            return Err("cache path must not be empty".to_string());
        }

        Ok(())
    }
}
