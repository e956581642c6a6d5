//! Asynchronous histogram computation for cubeview.
//!
//! - [`binning`]: the pure computation (channel selection, range, bin counts)
//! - [`pipeline`]: the single-flight pipeline that runs binning in the
//!   background, consults the artifact cache and publishes completions
//! - [`codec`]: the `f64` blob layout used to cache results

pub mod binning;
pub mod codec;
pub mod config;
pub mod error;
pub mod pipeline;

pub use binning::{compute_histogram, select_channels};
pub use config::PipelineConfig;
pub use error::HistogramError;
pub use pipeline::{ComputeRequest, HistogramPipeline, JobId, PipelineEvent, PipelineState};
