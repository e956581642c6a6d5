//! Error types for layer rendering.

use thiserror::Error;
use view_common::{LayerId, ViewError};

/// Errors a layer can report for one render request.
#[derive(Error, Debug)]
pub enum RenderError {
    /// The layer could not produce output for this request.
    #[error("layer {layer} failed: {message}")]
    LayerFailed { layer: LayerId, message: String },

    /// Reading or mapping the underlying data failed.
    #[error(transparent)]
    View(#[from] ViewError),

    /// Render work panicked or was cancelled.
    #[error("render task aborted: {0}")]
    TaskAborted(String),
}

impl RenderError {
    /// Wrap the payload of a caught panic.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic".to_string());
        Self::TaskAborted(message)
    }

    pub fn layer_failed(layer: &LayerId, message: impl Into<String>) -> Self {
        Self::LayerFailed {
            layer: layer.clone(),
            message: message.into(),
        }
    }
}

impl From<tokio::task::JoinError> for RenderError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskAborted(err.to_string())
    }
}
