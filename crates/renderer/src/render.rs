//! Plane → raster mapping.
//!
//! A layer renders in two steps: the data plane is resampled into the view
//! (pan/zoom applied), then every sample is normalized against the clip range
//! and pushed through a color map. NaN samples and samples outside the image
//! become transparent pixels.

use rayon::prelude::*;
use view_common::{PixelSize, Point, Raster, ViewError, ViewResult};

use crate::colormap::ColorMap;

/// Rows processed per rayon task.
const ROWS_PER_TASK: usize = 16;

/// Intensity window and orientation applied when coloring a plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneStyle {
    pub clip_min: f64,
    pub clip_max: f64,
    pub inverted: bool,
}

impl PlaneStyle {
    pub fn new(clip_min: f64, clip_max: f64) -> Self {
        Self {
            clip_min,
            clip_max,
            inverted: false,
        }
    }

    pub fn inverted(mut self, inverted: bool) -> Self {
        self.inverted = inverted;
        self
    }

    /// Normalize `value` into [0, 1]; a degenerate window maps everything to 0.
    fn normalize(&self, value: f32) -> f32 {
        let range = self.clip_max - self.clip_min;
        if !(range.is_finite() && range > 0.0) {
            return 0.0;
        }
        ((value as f64 - self.clip_min) / range).clamp(0.0, 1.0) as f32
    }
}

/// Color a plane of `size.width * size.height` samples.
pub fn render_plane(
    data: &[f32],
    size: PixelSize,
    cmap: &ColorMap,
    style: &PlaneStyle,
) -> ViewResult<Raster> {
    if data.len() != size.pixel_count() {
        return Err(ViewError::RenderError(format!(
            "plane has {} samples, expected {} for {}",
            data.len(),
            size.pixel_count(),
            size
        )));
    }

    let width = size.width as usize;
    let lut = cmap.lookup_table(256, style.inverted);
    let mut pixels = vec![0u8; size.pixel_count() * 4];
    let row_bytes = width * 4;
    if row_bytes == 0 {
        return Raster::from_rgba(size, pixels);
    }

    pixels
        .par_chunks_mut(row_bytes * ROWS_PER_TASK)
        .enumerate()
        .for_each(|(chunk_idx, chunk)| {
            let first_sample = chunk_idx * ROWS_PER_TASK * width;
            for (i, px) in chunk.chunks_exact_mut(4).enumerate() {
                let value = data[first_sample + i];
                if value.is_nan() {
                    continue;
                }
                let idx = (style.normalize(value) * 255.0).round() as usize;
                px.copy_from_slice(&lut[idx.min(255)].to_array());
            }
        });

    Raster::from_rgba(size, pixels)
}

/// Mapping between image coordinates and output pixels for one view.
///
/// `zoom` is output pixels per image pixel (default: fit the whole image);
/// `center` is the image coordinate shown at the middle of the output
/// (default: image center).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    pub center: Point,
    pub zoom: f64,
    output_center: Point,
}

impl ViewTransform {
    pub fn new(
        src_width: usize,
        src_height: usize,
        output: PixelSize,
        center: Option<Point>,
        zoom: Option<f64>,
    ) -> Self {
        let fit = (output.width as f64 / src_width.max(1) as f64)
            .min(output.height as f64 / src_height.max(1) as f64);
        let fit = if fit > 0.0 { fit } else { 1.0 };
        Self {
            center: center.filter(Point::is_finite).unwrap_or(Point::new(
                (src_width as f64 - 1.0) / 2.0,
                (src_height as f64 - 1.0) / 2.0,
            )),
            zoom: zoom.filter(|z| z.is_finite() && *z > 0.0).unwrap_or(fit),
            output_center: Point::new(
                (output.width as f64 - 1.0) / 2.0,
                (output.height as f64 - 1.0) / 2.0,
            ),
        }
    }

    pub fn to_image(&self, output: Point) -> Point {
        Point::new(
            self.center.x + (output.x - self.output_center.x) / self.zoom,
            self.center.y + (output.y - self.output_center.y) / self.zoom,
        )
    }

    pub fn to_output(&self, image: Point) -> Point {
        Point::new(
            self.output_center.x + (image.x - self.center.x) * self.zoom,
            self.output_center.y + (image.y - self.center.y) * self.zoom,
        )
    }
}

/// Resample a `src_width x src_height` plane into the view described by
/// [`ViewTransform`]. Samples falling outside the image are NaN.
pub fn resample_plane(
    data: &[f32],
    src_width: usize,
    src_height: usize,
    output: PixelSize,
    center: Option<Point>,
    zoom: Option<f64>,
) -> Vec<f32> {
    let mut out = vec![f32::NAN; output.pixel_count()];
    if src_width == 0 || src_height == 0 || output.is_empty() || data.len() != src_width * src_height
    {
        return out;
    }

    let out_width = output.width as usize;
    let transform = ViewTransform::new(src_width, src_height, output, center, zoom);

    out.par_chunks_mut(out_width)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, sample) in row.iter_mut().enumerate() {
                let src = transform.to_image(Point::new(x as f64, y as f64));
                *sample = bilinear(data, src_width, src_height, src.x, src.y);
            }
        });

    out
}

fn bilinear(data: &[f32], width: usize, height: usize, x: f64, y: f64) -> f32 {
    if x < -0.5 || y < -0.5 || x > width as f64 - 0.5 || y > height as f64 - 0.5 {
        return f32::NAN;
    }

    let x = x.clamp(0.0, (width - 1) as f64);
    let y = y.clamp(0.0, (height - 1) as f64);
    let x1 = x.floor() as usize;
    let y1 = y.floor() as usize;
    let x2 = (x1 + 1).min(width - 1);
    let y2 = (y1 + 1).min(height - 1);
    let dx = (x - x1 as f64) as f32;
    let dy = (y - y1 as f64) as f32;

    let v11 = data[y1 * width + x1];
    let v21 = data[y1 * width + x2];
    let v12 = data[y2 * width + x1];
    let v22 = data[y2 * width + x2];

    let v1 = v11 * (1.0 - dx) + v21 * dx;
    let v2 = v12 * (1.0 - dx) + v22 * dx;
    v1 * (1.0 - dy) + v2 * dy
}
