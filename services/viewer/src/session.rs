//! Headless session runner.
//!
//! Builds the layer stack a session describes, then applies its steps in
//! order: view changes are coalesced by the coordinator and painted before
//! the next `save` or at the end of the session, histogram steps go through
//! the single-flight pipeline.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use compositor::{
    ClipRange, Composite, ContourLayer, ContourLevels, ImageLayer, Layer, RenderCoordinator,
};
use histogram::{ComputeRequest, HistogramPipeline, PipelineConfig, PipelineEvent};
use metrics::counter;
use renderer::{create_png_auto, ColorMapRegistry};
use serde::Serialize;
use storage::ArtifactCache;
use tracing::{info, instrument, warn};
use view_common::{
    HistogramParameters, ImageSource, LayerId, Pen, PixelSize, Point,
};

use crate::config::{HistogramStep, LayerConfig, LayerKind, SessionConfig, Step};
use crate::source::CubeSource;

/// Default color map for image layers.
const DEFAULT_COLORMAP: &str = "gray";

/// Summary of one histogram step.
#[derive(Debug, Clone, Serialize)]
pub struct HistogramSummary {
    pub source: String,
    pub bins: usize,
    pub total: u64,
    pub min: f64,
    pub max: f64,
    pub median: Option<f64>,
    pub reused: bool,
}

/// What a session did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionReport {
    pub repaints: u64,
    pub layer_renders: u64,
    pub partial_composites: usize,
    pub saved: Vec<PathBuf>,
    pub histograms: Vec<HistogramSummary>,
    pub failed_histograms: usize,
}

pub struct Session {
    coordinator: RenderCoordinator,
    pipeline: HistogramPipeline,
    sources: HashMap<String, Arc<dyn ImageSource>>,
    output_dir: PathBuf,
    report: SessionReport,
}

impl Session {
    /// Load sources and build the layer stack. Relative raw cube paths are
    /// resolved against `base_dir`; outputs go to `output_dir`.
    pub fn build(
        config: &SessionConfig,
        cache: Arc<ArtifactCache>,
        pipeline_config: PipelineConfig,
        base_dir: &Path,
        output_dir: &Path,
    ) -> Result<Self> {
        let mut sources: HashMap<String, Arc<dyn ImageSource>> = HashMap::new();
        for source in &config.sources {
            let cube = CubeSource::from_config(source, base_dir)?;
            sources.insert(source.id.clone(), Arc::new(cube));
        }

        let view = &config.view;
        let mut coordinator = RenderCoordinator::new(PixelSize::new(view.width, view.height));
        coordinator.set_frames(vec![view.frame]);
        coordinator.set_coordinate_system(view.coordinate_system);
        coordinator.set_zoom(view.zoom)?;
        coordinator.set_pan(view.pan.map(|[x, y]| Point::new(x, y)))?;

        let colormaps = ColorMapRegistry::builtin();
        for layer in &config.layers {
            let source = sources
                .get(&layer.source)
                .cloned()
                .ok_or_else(|| anyhow!("layer '{}' uses unknown source '{}'", layer.id, layer.source))?;
            let built = build_layer(layer, source, &colormaps, cache.clone())?;
            if !coordinator.add_layer(built, layer.style()) {
                return Err(anyhow!("duplicate layer id '{}'", layer.id));
            }
        }

        std::fs::create_dir_all(output_dir)
            .with_context(|| format!("failed to create {}", output_dir.display()))?;

        Ok(Self {
            coordinator,
            pipeline: HistogramPipeline::new(cache, pipeline_config),
            sources,
            output_dir: output_dir.to_path_buf(),
            report: SessionReport::default(),
        })
    }

    pub fn coordinator(&self) -> &RenderCoordinator {
        &self.coordinator
    }

    /// Run every step, then paint whatever is still pending.
    pub async fn run(mut self, steps: &[Step]) -> Result<SessionReport> {
        for (i, step) in steps.iter().enumerate() {
            self.apply(step)
                .await
                .with_context(|| format!("step {} failed", i + 1))?;
        }
        self.paint_if_queued().await;

        self.report.repaints = self.coordinator.redraw_count();
        self.report.layer_renders = self.coordinator.render_count();
        Ok(self.report)
    }

    #[instrument(skip(self, step))]
    async fn apply(&mut self, step: &Step) -> Result<()> {
        if let Some(frame) = step.frame {
            self.coordinator.set_frames(vec![frame]);
        }
        if let Some(zoom) = step.zoom {
            self.coordinator.set_zoom(Some(zoom))?;
        }
        if step.fit.is_some() {
            self.coordinator.set_zoom(None)?;
        }
        if let Some([x, y]) = step.pan {
            self.coordinator.set_pan(Some(Point::new(x, y)))?;
        }
        if step.center.is_some() {
            self.coordinator.set_pan(None)?;
        }
        if let Some([width, height]) = step.resize {
            self.coordinator
                .set_client_view_size(PixelSize::new(width, height));
        }
        if let Some(system) = step.coordinate_system {
            self.coordinator.set_coordinate_system(system);
        }
        if let Some(id) = &step.show {
            self.set_visible(id, true)?;
        }
        if let Some(id) = &step.hide {
            self.set_visible(id, false)?;
        }
        if let Some(histogram) = &step.histogram {
            self.histogram(histogram).await?;
        }
        if let Some(name) = &step.save {
            self.save(name).await?;
        }
        Ok(())
    }

    fn set_visible(&mut self, id: &str, visible: bool) -> Result<()> {
        let id = LayerId::new(id);
        let mut style = self
            .coordinator
            .layer_style(&id)
            .ok_or_else(|| anyhow!("unknown layer '{}'", id))?;
        style.visible = visible;
        self.coordinator.set_layer_style(&id, style);
        Ok(())
    }

    async fn paint_if_queued(&mut self) -> Option<Arc<Composite>> {
        if !self.coordinator.is_repaint_queued() {
            return self.coordinator.latest_composite();
        }
        let composite = self.coordinator.repaint_now().await;
        if composite.partial {
            self.report.partial_composites += 1;
            warn!(generation = composite.generation, "Composite is partial");
        }
        Some(composite)
    }

    async fn save(&mut self, name: &str) -> Result<()> {
        let composite = self
            .paint_if_queued()
            .await
            .ok_or_else(|| anyhow!("nothing has been painted yet"))?;
        let png = create_png_auto(&composite.raster)?;
        let path = self.output_dir.join(name);
        tokio::fs::write(&path, &png)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;

        counter!("cubeview_composites_saved_total").increment(1);
        info!(
            path = %path.display(),
            generation = composite.generation,
            bytes = png.len(),
            polylines = composite.graphics.len(),
            "Saved composite"
        );
        self.report.saved.push(path);
        Ok(())
    }

    async fn histogram(&mut self, step: &HistogramStep) -> Result<()> {
        let source = self
            .sources
            .get(&step.source)
            .cloned()
            .ok_or_else(|| anyhow!("unknown source '{}'", step.source))?;
        let unit = source.pixel_unit().to_string();
        let mut params =
            HistogramParameters::new(source, step.bins, (step.channels[0], step.channels[1]));
        if let Some([min, max]) = step.intensity {
            params = params.with_intensity_range(min, max);
        }
        if let Some([min, max]) = step.frequency {
            params = params.with_frequency_range(min, max, unit);
        }
        if let Some(output) = &step.output {
            params = params.with_output_file(self.output_dir.join(output));
        }

        match self.pipeline.request_compute(params) {
            ComputeRequest::Dispatched(_) | ComputeRequest::Reused => {}
            ComputeRequest::Ignored => {
                warn!(source = %step.source, "Histogram request ignored");
                return Ok(());
            }
            ComputeRequest::Invalid => {
                self.report.failed_histograms += 1;
                warn!(source = %step.source, "Histogram request invalid");
                return Ok(());
            }
        }

        let event = self
            .pipeline
            .next_completion()
            .await
            .ok_or_else(|| anyhow!("histogram pipeline closed"))?;
        let reused = matches!(event, PipelineEvent::Reused(_));
        match event.result() {
            Some(result) => {
                let edges = result.edges();
                self.report.histograms.push(HistogramSummary {
                    source: step.source.clone(),
                    bins: result.bin_count(),
                    total: result.total(),
                    min: edges.first().copied().unwrap_or(f64::NAN),
                    max: edges.last().copied().unwrap_or(f64::NAN),
                    median: result.intensity_at_percentile(0.5),
                    reused,
                });
            }
            None => self.report.failed_histograms += 1,
        }
        Ok(())
    }
}

fn build_layer(
    config: &LayerConfig,
    source: Arc<dyn ImageSource>,
    colormaps: &ColorMapRegistry,
    cache: Arc<ArtifactCache>,
) -> Result<Arc<dyn Layer>> {
    let id = LayerId::new(config.id.as_str());
    let layer: Arc<dyn Layer> = match config.kind {
        LayerKind::Image => {
            let name = config.colormap.as_deref().unwrap_or(DEFAULT_COLORMAP);
            let colormap = colormaps
                .by_name(name)
                .cloned()
                .ok_or_else(|| anyhow!("unknown colormap '{}'", name))?;
            let clip = match (config.clip_fixed, config.clip_percentile) {
                (Some([min, max]), _) => ClipRange::Fixed { min, max },
                (None, Some([low, high])) => ClipRange::Percentile { low, high },
                (None, None) => ClipRange::default(),
            };
            Arc::new(
                ImageLayer::new(id, source, colormap, cache)
                    .with_clip(clip)
                    .inverted(config.inverted),
            )
        }
        LayerKind::Contour => {
            let levels = match (&config.levels, config.auto_levels) {
                (Some(levels), _) => ContourLevels::Fixed(levels.clone()),
                (None, Some(count)) => ContourLevels::Auto(count),
                (None, None) => ContourLevels::Auto(5),
            };
            let mut pen = Pen::default();
            if let Some(color) = config.line_color {
                pen.color = color;
            }
            if let Some(width) = config.line_width {
                pen.width = width;
            }
            Arc::new(
                ContourLayer::new(id, source, levels)
                    .with_pen(pen)
                    .with_smoothing(config.smoothing),
            )
        }
    };
    Ok(layer)
}
