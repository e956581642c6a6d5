//! The layer seam between the coordinator and whatever draws a layer.

use async_trait::async_trait;
use view_common::{LayerId, RenderRequest, RenderResponse};

use crate::RenderError;

/// Something that can render itself for a [`RenderRequest`].
///
/// Implementations must copy `request.generation()` into the response; the
/// coordinator uses it to drop stale output. Layers that finish work later
/// can also push a response through
/// [`CoordinatorHandle::deliver_response`](crate::CoordinatorHandle::deliver_response).
#[async_trait]
pub trait Layer: Send + Sync {
    /// Stable identity of the layer within its stack.
    fn id(&self) -> &LayerId;

    /// Render the layer for one request.
    async fn render(&self, request: &RenderRequest) -> Result<RenderResponse, RenderError>;
}
