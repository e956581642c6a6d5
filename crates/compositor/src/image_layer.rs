//! Raster layer: one cube channel, resampled into the view and colored.

use std::sync::Arc;

use async_trait::async_trait;
use histogram::compute_histogram;
use renderer::{render_plane, resample_plane, ColorMap, PlaneStyle};
use storage::ArtifactCache;
use tracing::{debug, instrument};
use view_common::{
    HistogramParameters, ImageSource, LayerId, LayerOutput, RenderRequest, RenderResponse,
    ViewError,
};

use crate::{Layer, RenderError};

/// Bins used when deriving clip levels from percentiles.
const CLIP_HISTOGRAM_BINS: usize = 1024;

/// Default eviction priority of cached intensity tables.
const INTENSITY_CACHE_PRIORITY: i64 = 5;

/// How the color map's range is chosen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClipRange {
    /// Fixed data values.
    Fixed { min: f64, max: f64 },
    /// Percentiles (0.0..=1.0) of the displayed channel.
    Percentile { low: f64, high: f64 },
}

impl Default for ClipRange {
    fn default() -> Self {
        ClipRange::Percentile {
            low: 0.005,
            high: 0.995,
        }
    }
}

/// Renders the request's channel of an [`ImageSource`] through a color map.
///
/// Percentile clip levels are computed per channel from a histogram and
/// kept in the artifact cache as two-value intensity tables.
pub struct ImageLayer {
    id: LayerId,
    source: Arc<dyn ImageSource>,
    colormap: ColorMap,
    inverted: bool,
    clip: ClipRange,
    cache: Arc<ArtifactCache>,
    cache_priority: i64,
}

impl ImageLayer {
    pub fn new(
        id: impl Into<LayerId>,
        source: Arc<dyn ImageSource>,
        colormap: ColorMap,
        cache: Arc<ArtifactCache>,
    ) -> Self {
        Self {
            id: id.into(),
            source,
            colormap,
            inverted: false,
            clip: ClipRange::default(),
            cache,
            cache_priority: INTENSITY_CACHE_PRIORITY,
        }
    }

    pub fn with_clip(mut self, clip: ClipRange) -> Self {
        self.clip = clip;
        self
    }

    pub fn inverted(mut self, inverted: bool) -> Self {
        self.inverted = inverted;
        self
    }

    pub fn with_cache_priority(mut self, priority: i64) -> Self {
        self.cache_priority = priority;
        self
    }

    pub fn source(&self) -> &Arc<dyn ImageSource> {
        &self.source
    }

    fn intensity_key(&self, channel: usize, low: f64, high: f64) -> Vec<u8> {
        format!(
            "intensity:v1:{}:{}:{}:{:016x}-{:016x}",
            self.source.id(),
            channel,
            CLIP_HISTOGRAM_BINS,
            low.to_bits(),
            high.to_bits()
        )
        .into_bytes()
    }

    /// Clip levels for `channel`.
    #[instrument(skip(self), fields(layer = %self.id))]
    pub async fn clip_for_channel(&self, channel: usize) -> Result<(f64, f64), RenderError> {
        let (low, high) = match self.clip {
            ClipRange::Fixed { min, max } => return Ok((min, max)),
            ClipRange::Percentile { low, high } => (low, high),
        };

        let key = self.intensity_key(channel, low, high);
        if let Some(table) = self.cache.get_f64s(&key).await {
            if let [min, max] = table[..] {
                debug!(channel, min, max, "Intensity table from cache");
                return Ok((min, max));
            }
            debug!(channel, len = table.len(), "Ignoring cached intensity table");
        }

        let params = HistogramParameters::new(self.source.clone(), CLIP_HISTOGRAM_BINS, (channel, channel));
        let histogram = tokio::task::spawn_blocking(move || compute_histogram(&params))
            .await?
            .map_err(|e| RenderError::layer_failed(&self.id, e.to_string()))?;

        let (Some(min), Some(max)) = (
            histogram.intensity_at_percentile(low),
            histogram.intensity_at_percentile(high),
        ) else {
            return Err(RenderError::layer_failed(&self.id, "channel has no samples"));
        };

        self.cache.put_f64s(&key, &[min, max], self.cache_priority).await;
        Ok((min, max))
    }
}

#[async_trait]
impl Layer for ImageLayer {
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

        let (clip_min, clip_max) = self.clip_for_channel(channel).await?;
        let style = PlaneStyle::new(clip_min, clip_max).inverted(self.inverted);
        let source = self.source.clone();
        let colormap = self.colormap.clone();
        let output = request.output_size();
        let (pan, zoom) = (request.pan(), request.zoom());

        let raster = tokio::task::spawn_blocking(move || {
            let plane = source.read_plane(channel)?;
            let view = resample_plane(&plane, shape.width, shape.height, output, pan, zoom);
            render_plane(&view, output, &colormap, &style)
        })
        .await??;

        Ok(RenderResponse::new(
            self.id.clone(),
            request.generation(),
            LayerOutput::from_raster(raster),
        ))
    }
}
