//! Artifact storage for cubeview.
//!
//! Provides a persistent key→bytes cache for results that are expensive to
//! recompute (histograms, per-frame intensity tables):
//! - Local-disk persistence through `object_store`
//! - Priority-ordered eviction under a byte/entry budget
//! - A small in-memory LRU in front of the disk store
//! - Fixed-width encoding for `f64` sequences

pub mod artifact_cache;
pub mod codec;
pub mod config;
pub mod error;
mod entry;

pub use artifact_cache::{ArtifactCache, ArtifactCacheStats};
pub use codec::{decode_f64s, encode_f64s, F64_WIDTH};
pub use config::CacheConfig;
pub use error::{CacheError, CacheResult};
