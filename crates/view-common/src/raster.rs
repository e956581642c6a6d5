//! RGBA raster image passed between layers and the compositor.

use crate::{PixelSize, ViewError, ViewResult};

/// An 8-bit RGBA image with straight (non-premultiplied) alpha, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    size: PixelSize,
    pixels: Vec<u8>,
}

impl Raster {
    /// Create a fully transparent raster.
    pub fn transparent(size: PixelSize) -> Self {
        Self {
            size,
            pixels: vec![0u8; size.pixel_count() * 4],
        }
    }

    /// Wrap existing RGBA pixel data.
    ///
    /// Fails when `pixels` does not hold exactly `width * height * 4` bytes.
    pub fn from_rgba(size: PixelSize, pixels: Vec<u8>) -> ViewResult<Self> {
        let expected = size.pixel_count() * 4;
        if pixels.len() != expected {
            return Err(ViewError::invalid_parameter(
                "pixels",
                format!(
                    "expected {} bytes for {} raster, got {}",
                    expected,
                    size,
                    pixels.len()
                ),
            ));
        }
        Ok(Self { size, pixels })
    }

    pub fn size(&self) -> PixelSize {
        self.size
    }

    pub fn width(&self) -> usize {
        self.size.width as usize
    }

    pub fn height(&self) -> usize {
        self.size.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.size.is_empty()
    }

    pub fn as_rgba(&self) -> &[u8] {
        &self.pixels
    }

    pub fn as_rgba_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    pub fn into_rgba(self) -> Vec<u8> {
        self.pixels
    }

    /// Pixel at (x, y), or `None` outside the raster.
    pub fn pixel(&self, x: usize, y: usize) -> Option<[u8; 4]> {
        if x >= self.width() || y >= self.height() {
            return None;
        }
        let idx = (y * self.width() + x) * 4;
        Some([
            self.pixels[idx],
            self.pixels[idx + 1],
            self.pixels[idx + 2],
            self.pixels[idx + 3],
        ])
    }

    pub fn set_pixel(&mut self, x: usize, y: usize, rgba: [u8; 4]) {
        if x >= self.width() || y >= self.height() {
            return;
        }
        let idx = (y * self.width() + x) * 4;
        self.pixels[idx..idx + 4].copy_from_slice(&rgba);
    }
}
