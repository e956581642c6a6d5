//! Vector layer: iso-contours of one cube channel.

use std::sync::Arc;

use async_trait::async_trait;
use renderer::{generate_levels, trace_contours, ContourConfig, ViewTransform};
use tracing::instrument;
use view_common::{
    ImageSource, LayerId, LayerOutput, Pen, RenderRequest, RenderResponse, ViewError,
};

use crate::{Layer, RenderError};

/// Where contour levels come from.
#[derive(Debug, Clone, PartialEq)]
pub enum ContourLevels {
    /// Explicit levels in data units.
    Fixed(Vec<f64>),
    /// `count` evenly spaced levels between the channel's min and max.
    Auto(usize),
}

/// Traces contours of the request's channel and returns them as polylines in
/// output pixel coordinates.
pub struct ContourLayer {
    id: LayerId,
    source: Arc<dyn ImageSource>,
    levels: ContourLevels,
    pen: Pen,
    smoothing_passes: u32,
}

impl ContourLayer {
    pub fn new(id: impl Into<LayerId>, source: Arc<dyn ImageSource>, levels: ContourLevels) -> Self {
        Self {
            id: id.into(),
            source,
            levels,
            pen: Pen::default(),
            smoothing_passes: 0,
        }
    }

    pub fn with_pen(mut self, pen: Pen) -> Self {
        self.pen = pen;
        self
    }

    pub fn with_smoothing(mut self, passes: u32) -> Self {
        self.smoothing_passes = passes;
        self
    }
}

fn levels_for(plane: &[f32], levels: &ContourLevels) -> Vec<f64> {
    match levels {
        ContourLevels::Fixed(levels) => levels.clone(),
        ContourLevels::Auto(count) => {
            let (min, max) = plane
                .iter()
                .filter(|v| v.is_finite())
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                    (lo.min(v as f64), hi.max(v as f64))
                });
            generate_levels(min, max, *count)
        }
    }
}

#[async_trait]
impl Layer for ContourLayer {
    fn id(&self) -> &LayerId {
        &self.id
    }

    #[instrument(skip(self, request), fields(layer = %self.id, generation = request.generation()))]
    async fn render(&self, request: &RenderRequest) -> Result<RenderResponse, RenderError> {
        let shape = self.source.shape();
        let channel = request.channel();
        if channel >= shape.channels {
            return Err(ViewError::ChannelOutOfRange {
                channel,
                channels: shape.channels,
            }
            .into());
        }

        let source = self.source.clone();
        let levels = self.levels.clone();
        let (pen, smoothing_passes) = (self.pen, self.smoothing_passes);
        let transform = ViewTransform::new(
            shape.width,
            shape.height,
            request.output_size(),
            request.pan(),
            request.zoom(),
        );

        let graphics = tokio::task::spawn_blocking(move || -> Result<_, ViewError> {
            let plane = source.read_plane(channel)?;
            let config = ContourConfig {
                levels: levels_for(&plane, &levels),
                pen,
                smoothing_passes,
            };
            Ok(trace_contours(
                &plane,
                shape.width,
                shape.height,
                &config,
                |p| transform.to_output(p),
            ))
        })
        .await??;

        Ok(RenderResponse::new(
            self.id.clone(),
            request.generation(),
            LayerOutput::from_graphics(graphics),
        ))
    }
}
