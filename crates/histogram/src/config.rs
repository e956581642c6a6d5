//! Configuration for the histogram pipeline.

use serde::{Deserialize, Serialize};

/// Configuration for the histogram pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Eviction priority of cached histograms (higher = kept longer).
    pub cache_priority: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { cache_priority: 10 }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("HISTOGRAM_CACHE_PRIORITY") {
            if let Ok(priority) = val.parse() {
                config.cache_priority = priority;
            }
        }

        config
    }
}
