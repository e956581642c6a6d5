//! Error types for cubeview crates.

use thiserror::Error;

/// Result type alias using ViewError.
pub type ViewResult<T> = Result<T, ViewError>;

/// Primary error type for value construction and data access.
#[derive(Debug, Error)]
pub enum ViewError {
    // === Request Errors ===
    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    #[error("Unknown coordinate system: {0}")]
    UnknownCoordinateSystem(String),

    // === Data Errors ===
    #[error("Data source closed: {0}")]
    SourceClosed(String),

    #[error("Channel {channel} out of range for source with {channels} channels")]
    ChannelOutOfRange { channel: usize, channels: usize },

    #[error("Failed to read data: {0}")]
    DataReadError(String),

    // === Rendering Errors ===
    #[error("Rendering failed: {0}")]
    RenderError(String),
}

impl ViewError {
    /// Create an InvalidParameter error.
    pub fn invalid_parameter(param: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            param: param.into(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for ViewError {
    fn from(err: std::io::Error) -> Self {
        ViewError::DataReadError(err.to_string())
    }
}
