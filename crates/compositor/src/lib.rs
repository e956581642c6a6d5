//! Layer coordination and compositing for cubeview.
//!
//! - [`Layer`]: the async seam a layer renders through
//! - [`RenderCoordinator`]: coalesces layer changes into repaint passes and
//!   publishes composites in generation order
//! - [`CoordinatorHandle`]: event-channel access to a spawned coordinator
//! - [`ImageLayer`] and [`ContourLayer`]: stock layers over an `ImageSource`

pub mod contour_layer;
pub mod coordinator;
pub mod error;
pub mod event_loop;
pub mod image_layer;
pub mod layer;

pub use contour_layer::{ContourLayer, ContourLevels};
pub use coordinator::{Composite, RenderCoordinator, ViewState};
pub use error::RenderError;
pub use event_loop::{CoordinatorEvent, CoordinatorHandle};
pub use image_layer::{ClipRange, ImageLayer};
pub use layer::Layer;
