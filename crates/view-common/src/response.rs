//! Render responses returned by layers.

use crate::{LayerId, Raster, VectorGraphics};

/// What a layer produced for one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerOutput {
    pub raster: Option<Raster>,
    pub graphics: VectorGraphics,
}

impl LayerOutput {
    pub fn from_raster(raster: Raster) -> Self {
        Self {
            raster: Some(raster),
            graphics: VectorGraphics::new(),
        }
    }

    pub fn from_graphics(graphics: VectorGraphics) -> Self {
        Self {
            raster: None,
            graphics,
        }
    }

    /// True when there is nothing to draw.
    pub fn is_empty(&self) -> bool {
        self.raster.as_ref().map_or(true, |r| r.is_empty()) && self.graphics.is_empty()
    }
}

/// Immutable result of rendering one layer for one request.
///
/// `generation` is copied from the request that produced it and is used by
/// the compositor to drop results that arrive after a newer composite has
/// already been published.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderResponse {
    layer_id: LayerId,
    generation: u64,
    output: LayerOutput,
}

impl RenderResponse {
    pub fn new(layer_id: LayerId, generation: u64, output: LayerOutput) -> Self {
        Self {
            layer_id,
            generation,
            output,
        }
    }

    pub fn layer_id(&self) -> &LayerId {
        &self.layer_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn output(&self) -> &LayerOutput {
        &self.output
    }

    pub fn is_empty(&self) -> bool {
        self.output.is_empty()
    }
}
