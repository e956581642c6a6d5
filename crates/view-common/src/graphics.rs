//! Vector graphics produced by layers (contours, overlays).

use serde::{Deserialize, Serialize};

use crate::Point;

/// Stroke description for a polyline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pen {
    /// RGBA color
    pub color: [u8; 4],
    /// Line width in output pixels
    pub width: f32,
}

impl Default for Pen {
    fn default() -> Self {
        Self {
            color: [0, 0, 0, 255],
            width: 1.0,
        }
    }
}

/// An open or closed polyline in output pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    pub points: Vec<Point>,
    pub closed: bool,
    pub pen: Pen,
    /// Data level the line was traced at, for contours
    pub level: Option<f64>,
}

/// An ordered list of vector primitives, drawn first to last.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorGraphics {
    items: Vec<Polyline>,
}

impl VectorGraphics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: Polyline) {
        self.items.push(line);
    }

    /// Append all primitives of `other` after ours.
    pub fn append(&mut self, other: &VectorGraphics) {
        self.items.extend(other.items.iter().cloned());
    }

    pub fn items(&self) -> &[Polyline] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl FromIterator<Polyline> for VectorGraphics {
    fn from_iter<T: IntoIterator<Item = Polyline>>(iter: T) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}
