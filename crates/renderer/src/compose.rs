//! Layer compositing.
//!
//! Rasters are straight-alpha RGBA. Blending is done per pixel in
//! premultiplied float space and converted back, so a fully transparent
//! destination never darkens the source.

use rayon::prelude::*;
use tracing::warn;
use view_common::{
    CompositionMode, LayerOutput, LayerStyle, PixelSize, Raster, VectorGraphics, ViewError,
    ViewResult,
};

/// Pixels processed per rayon task.
const PIXELS_PER_TASK: usize = 4096;

/// Blend `src` onto `dest` using the layer's composition mode, opacity and
/// optional mask tint.
pub fn composite_onto(dest: &mut Raster, src: &Raster, style: &LayerStyle) -> ViewResult<()> {
    if dest.size() != src.size() {
        return Err(ViewError::RenderError(format!(
            "layer raster is {}, composite is {}",
            src.size(),
            dest.size()
        )));
    }
    if style.opacity == 0 {
        return Ok(());
    }

    let opacity = style.opacity as f32 / 255.0;
    let tint = style.mask_color;
    let mode = style.composition;

    dest.as_rgba_mut()
        .par_chunks_mut(PIXELS_PER_TASK * 4)
        .zip(src.as_rgba().par_chunks(PIXELS_PER_TASK * 4))
        .for_each(|(d_chunk, s_chunk)| {
            for (d, s) in d_chunk.chunks_exact_mut(4).zip(s_chunk.chunks_exact(4)) {
                if s[3] == 0 {
                    continue;
                }
                let rgb = match tint {
                    Some(t) => t,
                    None => [s[0], s[1], s[2]],
                };
                let out = blend_pixel([d[0], d[1], d[2], d[3]], rgb, s[3], opacity, mode);
                d.copy_from_slice(&out);
            }
        });

    Ok(())
}

fn blend_pixel(dst: [u8; 4], src_rgb: [u8; 3], src_a: u8, opacity: f32, mode: CompositionMode) -> [u8; 4] {
    let sa = src_a as f32 / 255.0 * opacity;
    let da = dst[3] as f32 / 255.0;

    let out_a = match mode {
        CompositionMode::SourceOver | CompositionMode::Multiply => sa + da * (1.0 - sa),
        CompositionMode::Plus => (sa + da).min(1.0),
    };
    if out_a <= 0.0 {
        return [0, 0, 0, 0];
    }

    let mut out = [0u8; 4];
    for c in 0..3 {
        let sc = src_rgb[c] as f32 / 255.0;
        let dc = dst[c] as f32 / 255.0;
        let premultiplied = match mode {
            CompositionMode::SourceOver => sc * sa + dc * da * (1.0 - sa),
            CompositionMode::Plus => (sc * sa + dc * da).min(1.0),
            CompositionMode::Multiply => {
                sc * sa * (1.0 - da) + dc * da * (1.0 - sa) + sc * sa * dc * da
            }
        };
        out[c] = to_byte(premultiplied / out_a);
    }
    out[3] = to_byte(out_a);
    out
}

fn to_byte(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Accumulates layer outputs, bottom layer first, into one raster plus one
/// vector-graphics list.
#[derive(Debug)]
pub struct Compositor {
    raster: Raster,
    graphics: VectorGraphics,
    layers: usize,
}

impl Compositor {
    pub fn new(size: PixelSize) -> Self {
        Self {
            raster: Raster::transparent(size),
            graphics: VectorGraphics::new(),
            layers: 0,
        }
    }

    /// Add one layer's output. A raster of the wrong size is skipped with a
    /// warning; its vector graphics are still kept.
    pub fn add(&mut self, output: &LayerOutput, style: &LayerStyle) {
        if !style.visible {
            return;
        }
        if let Some(raster) = &output.raster {
            if let Err(e) = composite_onto(&mut self.raster, raster, style) {
                warn!(error = %e, "Skipping layer raster");
            }
        }
        self.graphics.append(&output.graphics);
        self.layers += 1;
    }

    /// Number of layers added so far.
    pub fn layer_count(&self) -> usize {
        self.layers
    }

    pub fn finish(self) -> (Raster, VectorGraphics) {
        (self.raster, self.graphics)
    }
}
