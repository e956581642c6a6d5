//! Per-layer pixel work for cubeview.
//!
//! Everything a layer needs to turn a data plane into output:
//! - Color maps and plane → RGBA mapping
//! - Resampling of planes to the view size
//! - Compositing of layer rasters (blend modes, opacity, mask tint)
//! - Contour tracing (marching squares) into vector graphics
//! - PNG export

pub mod colormap;
pub mod compose;
pub mod contour;
pub mod png;
pub mod render;

pub use colormap::{Color, ColorMap, ColorMapRegistry};
pub use compose::{composite_onto, Compositor};
pub use contour::{generate_levels, trace_contours, ContourConfig};
pub use png::{create_png, create_png_auto};
pub use render::{render_plane, resample_plane, PlaneStyle, ViewTransform};
