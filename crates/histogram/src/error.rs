//! Error types for histogram computation.

use thiserror::Error;
use view_common::ViewError;

/// Errors that can occur while computing a histogram.
#[derive(Error, Debug)]
pub enum HistogramError {
    /// The parameter tuple does not describe a valid job.
    #[error("invalid histogram parameters: {0}")]
    InvalidParameters(#[source] ViewError),

    /// A plane could not be read from the source.
    #[error("failed to read channel {channel}: {source}")]
    ReadFailed {
        channel: usize,
        #[source]
        source: ViewError,
    },

    /// No channel of the range falls inside the frequency window.
    #[error("no channel in {low}..={high} lies inside the frequency range")]
    EmptySelection { low: usize, high: usize },

    /// The selected data holds no finite samples, so no range can be derived.
    #[error("selection contains no finite samples")]
    NoData,

    /// A cached blob does not have the expected layout.
    #[error("cached histogram is malformed: {0}")]
    Malformed(String),

    /// The background task died before reporting.
    #[error("background job failed: {0}")]
    JobFailed(String),
}
