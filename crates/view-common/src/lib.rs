//! Common types shared across the cubeview crates.
//!
//! Everything here is a plain value: render requests and responses, the
//! raster and vector-graphics payloads they carry, histogram parameters and
//! results, and the `ImageSource` seam through which cube data is read.

pub mod coords;
pub mod error;
pub mod geometry;
pub mod graphics;
pub mod histogram;
pub mod layer;
pub mod raster;
pub mod request;
pub mod response;
pub mod source;

pub use coords::SkyCoordinateSystem;
pub use error::{ViewError, ViewResult};
pub use geometry::{PixelSize, Point};
pub use graphics::{Pen, Polyline, VectorGraphics};
pub use histogram::{HistogramParameters, HistogramResult};
pub use layer::{CompositionMode, LayerId, LayerStyle};
pub use raster::Raster;
pub use request::{RenderRequest, RenderRequestBuilder};
pub use response::{LayerOutput, RenderResponse};
pub use source::{CubeShape, ImageSource};
