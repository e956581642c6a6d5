//! Common fixtures: temporary directories and cache configurations.

use std::path::Path;

use storage::CacheConfig;

/// Creates a temporary directory for test output.
///
/// The directory is automatically cleaned up when the returned `TempDir` is dropped.
pub fn temp_test_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temporary test directory")
}

/// Cache configuration rooted in `dir` with a generous budget.
pub fn cache_config_in(dir: &Path) -> CacheConfig {
    CacheConfig {
        path: dir.join("artifacts"),
        max_storage_bytes: 64 * 1024 * 1024,
        max_entries: None,
        hot_entries: 16,
    }
}
