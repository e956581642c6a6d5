//! Session description loaded from YAML.
//!
//! A session names the data sources, the layer stack and the initial view,
//! followed by a list of steps that are applied in order:
//!
//! ```yaml
//! view:
//!   width: 512
//!   height: 512
//!   frame: 0
//! sources:
//!   - id: m31
//!     gaussian: { width: 128, height: 128, channels: 8, amplitude: 40.0, sigma: 12.0 }
//! layers:
//!   - id: m31-image
//!     kind: image
//!     source: m31
//!     colormap: heat
//!   - id: m31-contours
//!     kind: contour
//!     source: m31
//!     auto_levels: 5
//! steps:
//!   - frame: 3
//!   - save: frame3.png
//!   - histogram: { source: m31, bins: 64, channels: [0, 7], output: m31.hist }
//! ```

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use view_common::{CompositionMode, LayerStyle, SkyCoordinateSystem};

/// Top-level session file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    #[serde(default)]
    pub view: ViewConfig,
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub layers: Vec<LayerConfig>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// Initial view.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ViewConfig {
    pub width: u32,
    pub height: u32,
    pub frame: usize,
    pub coordinate_system: SkyCoordinateSystem,
    pub zoom: Option<f64>,
    pub pan: Option<[f64; 2]>,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            width: 512,
            height: 512,
            frame: 0,
            coordinate_system: SkyCoordinateSystem::default(),
            zoom: None,
            pan: None,
        }
    }
}

/// One data cube. Exactly one of `gaussian` or `raw` must be given.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    pub id: String,
    pub gaussian: Option<GaussianConfig>,
    pub raw: Option<RawConfig>,
    pub frequency: Option<FrequencyAxis>,
    pub unit: Option<String>,
}

/// Synthetic cube: a Gaussian blob on a unit background whose peak grows
/// with the channel index.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GaussianConfig {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    pub amplitude: f32,
    pub sigma: f32,
}

/// Headerless little-endian `f32` cube, channel-major then row-major.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    pub path: String,
    pub width: usize,
    pub height: usize,
    pub channels: usize,
}

/// Linear frequency axis: channel `c` is at `start + c * step`.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FrequencyAxis {
    pub start: f64,
    pub step: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Image,
    Contour,
}

/// One entry of the layer stack, bottom first.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerConfig {
    pub id: String,
    pub kind: LayerKind,
    pub source: String,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default = "default_opacity")]
    pub opacity: u8,
    pub mask_color: Option<[u8; 3]>,
    #[serde(default)]
    pub composition: CompositionMode,

    // image layers
    pub colormap: Option<String>,
    #[serde(default)]
    pub inverted: bool,
    /// Clip range as percentiles in 0.0..=1.0
    pub clip_percentile: Option<[f64; 2]>,
    /// Clip range in data units
    pub clip_fixed: Option<[f64; 2]>,

    // contour layers
    pub levels: Option<Vec<f64>>,
    pub auto_levels: Option<usize>,
    pub line_color: Option<[u8; 4]>,
    pub line_width: Option<f32>,
    #[serde(default)]
    pub smoothing: u32,
}

fn default_true() -> bool {
    true
}

fn default_opacity() -> u8 {
    255
}

impl LayerConfig {
    pub fn style(&self) -> LayerStyle {
        LayerStyle {
            visible: self.visible,
            opacity: self.opacity,
            mask_color: self.mask_color,
            composition: self.composition,
        }
    }
}

/// Histogram request issued by a step.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistogramStep {
    pub source: String,
    pub bins: usize,
    pub channels: [usize; 2],
    pub intensity: Option<[f64; 2]>,
    pub frequency: Option<[f64; 2]>,
    /// Table file, relative to the output directory
    pub output: Option<String>,
}

/// One session step. Exactly one field must be set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Step {
    pub frame: Option<usize>,
    pub zoom: Option<f64>,
    pub fit: Option<bool>,
    pub pan: Option<[f64; 2]>,
    pub center: Option<bool>,
    pub resize: Option<[u32; 2]>,
    pub coordinate_system: Option<SkyCoordinateSystem>,
    pub show: Option<String>,
    pub hide: Option<String>,
    pub histogram: Option<HistogramStep>,
    /// PNG file, relative to the output directory
    pub save: Option<String>,
}

impl Step {
    fn field_count(&self) -> usize {
        [
            self.frame.is_some(),
            self.zoom.is_some(),
            self.fit.is_some(),
            self.pan.is_some(),
            self.center.is_some(),
            self.resize.is_some(),
            self.coordinate_system.is_some(),
            self.show.is_some(),
            self.hide.is_some(),
            self.histogram.is_some(),
            self.save.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }
}

impl SessionConfig {
    /// Parse a session from YAML text and check cross references.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: SessionConfig = serde_yaml::from_str(text).context("invalid session YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read session file {}", path.display()))?;
        Self::from_yaml(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.view.width == 0 || self.view.height == 0 {
            bail!("view size must be non-zero");
        }
        for source in &self.sources {
            match (&source.gaussian, &source.raw) {
                (Some(_), None) | (None, Some(_)) => {}
                _ => bail!("source '{}' needs exactly one of gaussian or raw", source.id),
            }
        }
        for layer in &self.layers {
            if !self.sources.iter().any(|s| s.id == layer.source) {
                bail!("layer '{}' uses unknown source '{}'", layer.id, layer.source);
            }
            if layer.clip_percentile.is_some() && layer.clip_fixed.is_some() {
                bail!("layer '{}' sets both clip_percentile and clip_fixed", layer.id);
            }
        }
        for (i, step) in self.steps.iter().enumerate() {
            if step.field_count() != 1 {
                bail!("step {} must set exactly one action", i + 1);
            }
            if let Some(h) = &step.histogram {
                if !self.sources.iter().any(|s| s.id == h.source) {
                    bail!("step {} uses unknown source '{}'", i + 1, h.source);
                }
            }
            for id in step.show.iter().chain(step.hide.iter()) {
                if !self.layers.iter().any(|l| &l.id == id) {
                    bail!("step {} names unknown layer '{}'", i + 1, id);
                }
            }
        }
        Ok(())
    }
}
