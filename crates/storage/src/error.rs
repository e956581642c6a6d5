//! Error types for the artifact cache.

use thiserror::Error;

/// Result type for cache operations that can fail internally.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Errors raised inside the storage crate.
///
/// None of these escape the public `ArtifactCache` get/put surface: there
/// they are logged and turned into a miss or a dropped write.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Blob length is not a multiple of the element width.
    #[error("cannot decode {len} bytes as {width}-byte elements")]
    Decode { len: usize, width: usize },

    /// The backing store could not be opened or created.
    #[error("failed to open cache store: {0}")]
    OpenFailed(String),

    /// A read, write or delete against the backing store failed.
    #[error("cache backend error: {0}")]
    Backend(String),

    /// A stored object does not have the expected layout.
    #[error("corrupt cache entry: {0}")]
    Corrupt(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl CacheError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }
}

impl From<object_store::Error> for CacheError {
    fn from(err: object_store::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        Self::OpenFailed(err.to_string())
    }
}
