//! In-memory cubes built from session sources.

use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::info;
use view_common::{CubeShape, ImageSource, ViewError, ViewResult};

use crate::config::{FrequencyAxis, GaussianConfig, RawConfig, SourceConfig};

/// A cube held fully in memory.
#[derive(Debug)]
pub struct CubeSource {
    id: String,
    shape: CubeShape,
    planes: Vec<Vec<f32>>,
    frequency: Option<FrequencyAxis>,
    unit: String,
}

impl CubeSource {
    /// Build the cube a session source describes; raw paths are resolved
    /// against `base_dir`.
    pub fn from_config(config: &SourceConfig, base_dir: &Path) -> Result<Self> {
        let mut source = match (&config.gaussian, &config.raw) {
            (Some(gaussian), None) => Self::gaussian(&config.id, gaussian),
            (None, Some(raw)) => Self::from_raw_file(&config.id, raw, base_dir)?,
            _ => bail!("source '{}' needs exactly one of gaussian or raw", config.id),
        };
        source.frequency = config.frequency;
        if let Some(unit) = &config.unit {
            source.unit = unit.clone();
        }
        info!(
            source = %source.id,
            width = source.shape.width,
            height = source.shape.height,
            channels = source.shape.channels,
            "Loaded cube"
        );
        Ok(source)
    }

    pub fn gaussian(id: &str, config: &GaussianConfig) -> Self {
        let (width, height) = (config.width, config.height);
        let cx = (width as f32 - 1.0) / 2.0;
        let cy = (height as f32 - 1.0) / 2.0;
        let two_sigma_sq = 2.0 * config.sigma * config.sigma;

        let planes = (0..config.channels)
            .map(|c| {
                let peak = config.amplitude * (1 + c) as f32;
                (0..width * height)
                    .map(|i| {
                        let (x, y) = ((i % width) as f32, (i / width) as f32);
                        let d2 = (x - cx).powi(2) + (y - cy).powi(2);
                        1.0 + peak * (-d2 / two_sigma_sq).exp()
                    })
                    .collect()
            })
            .collect();

        Self {
            id: id.to_string(),
            shape: CubeShape::new(width, height, config.channels),
            planes,
            frequency: None,
            unit: "Jy/beam".to_string(),
        }
    }

    pub fn from_raw_file(id: &str, config: &RawConfig, base_dir: &Path) -> Result<Self> {
        let path = base_dir.join(&config.path);
        let bytes = std::fs::read(&path)
            .with_context(|| format!("failed to read cube {}", path.display()))?;

        let shape = CubeShape::new(config.width, config.height, config.channels);
        let expected = shape.plane_len() * shape.channels * 4;
        if bytes.len() != expected {
            bail!(
                "cube {} has {} bytes, expected {} for {}x{}x{}",
                path.display(),
                bytes.len(),
                expected,
                shape.width,
                shape.height,
                shape.channels
            );
        }

        let samples: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        let planes = samples
            .chunks(shape.plane_len().max(1))
            .take(shape.channels)
            .map(<[f32]>::to_vec)
            .collect();

        Ok(Self {
            id: id.to_string(),
            shape,
            planes,
            frequency: None,
            unit: String::new(),
        })
    }
}

impl ImageSource for CubeSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn shape(&self) -> CubeShape {
        self.shape
    }

    fn read_plane(&self, channel: usize) -> ViewResult<Vec<f32>> {
        self.planes
            .get(channel)
            .cloned()
            .ok_or(ViewError::ChannelOutOfRange {
                channel,
                channels: self.shape.channels,
            })
    }

    fn frequency(&self, channel: usize) -> Option<f64> {
        self.frequency
            .filter(|_| channel < self.shape.channels)
            .map(|axis| axis.start + channel as f64 * axis.step)
    }

    fn pixel_unit(&self) -> &str {
        &self.unit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gaussian_peak_grows_with_channel() {
        let config = GaussianConfig {
            width: 5,
            height: 5,
            channels: 2,
            amplitude: 10.0,
            sigma: 1.0,
        };
        let source = CubeSource::gaussian("g", &config);
        let c0 = source.read_plane(0).unwrap();
        let c1 = source.read_plane(1).unwrap();
        assert_eq!(c0[12], 11.0);
        assert_eq!(c1[12], 21.0);
        assert!(c0[0] < 1.2);
        assert!(source.read_plane(2).is_err());
    }

    #[test]
    fn test_raw_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let values: Vec<f32> = (0..12).map(|v| v as f32).collect();
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        std::fs::write(dir.path().join("cube.f32"), bytes).unwrap();

        let config = RawConfig {
            path: "cube.f32".into(),
            width: 3,
            height: 2,
            channels: 2,
        };
        let source = CubeSource::from_raw_file("raw", &config, dir.path()).unwrap();
        assert_eq!(source.read_plane(1).unwrap(), vec![6.0, 7.0, 8.0, 9.0, 10.0, 11.0]);

        let wrong = RawConfig { channels: 3, ..config };
        assert!(CubeSource::from_raw_file("raw", &wrong, dir.path()).is_err());
    }

    #[test]
    fn test_frequency_axis() {
        let config = SourceConfig {
            id: "g".into(),
            gaussian: Some(GaussianConfig {
                width: 2,
                height: 2,
                channels: 3,
                amplitude: 1.0,
                sigma: 1.0,
            }),
            raw: None,
            frequency: Some(FrequencyAxis {
                start: 100.0,
                step: 5.0,
            }),
            unit: Some("K".into()),
        };
        let source = CubeSource::from_config(&config, Path::new(".")).unwrap();
        assert_eq!(source.frequency(2), Some(110.0));
        assert_eq!(source.frequency(3), None);
        assert_eq!(source.pixel_unit(), "K");
    }
}
