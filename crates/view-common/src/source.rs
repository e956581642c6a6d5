//! The seam through which cube data is read.
//!
//! Loading cubes from disk is outside this workspace; anything that can hand
//! out 2-D planes of a cube implements [`ImageSource`].

use serde::{Deserialize, Serialize};

use crate::ViewResult;

/// Dimensions of an image cube.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CubeShape {
    pub width: usize,
    pub height: usize,
    /// Number of planes along the spectral axis
    pub channels: usize,
}

impl CubeShape {
    pub fn new(width: usize, height: usize, channels: usize) -> Self {
        Self {
            width,
            height,
            channels,
        }
    }

    pub fn plane_len(&self) -> usize {
        self.width * self.height
    }
}

/// A readable image cube.
pub trait ImageSource: Send + Sync + std::fmt::Debug {
    /// Stable identifier, used in cache keys.
    fn id(&self) -> &str;

    fn shape(&self) -> CubeShape;

    /// Closed sources refuse new work.
    fn is_open(&self) -> bool {
        true
    }

    /// Read one plane (row-major, `width * height` values). NaN marks blanked pixels.
    fn read_plane(&self, channel: usize) -> ViewResult<Vec<f32>>;

    /// Spectral coordinate of a channel, when the cube has one.
    fn frequency(&self, _channel: usize) -> Option<f64> {
        None
    }

    /// Unit of the pixel values, e.g. "Jy/beam".
    fn pixel_unit(&self) -> &str {
        ""
    }
}
