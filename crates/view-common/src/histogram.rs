//! Histogram parameter tuples and results.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::{ImageSource, ViewError, ViewResult};

/// Everything that determines a histogram.
///
/// Two parameter sets are equal when every field is equal: the data source is
/// compared by handle identity, floating-point fields bit for bit (so a NaN
/// "auto" range equals another NaN "auto" range).
#[derive(Clone)]
pub struct HistogramParameters {
    pub source: Arc<dyn ImageSource>,
    pub bin_count: usize,
    /// Inclusive channel range [low, high]
    pub channel_range: (usize, usize),
    pub frequency_range: (f64, f64),
    pub unit: String,
    /// Intensity range [min, max]; non-finite bounds mean "use the data range"
    pub intensity_range: (f64, f64),
    /// Where to write the histogram table after computing it
    pub output_file: Option<PathBuf>,
}

impl HistogramParameters {
    pub fn new(source: Arc<dyn ImageSource>, bin_count: usize, channel_range: (usize, usize)) -> Self {
        Self {
            source,
            bin_count,
            channel_range,
            frequency_range: (f64::NAN, f64::NAN),
            unit: String::new(),
            intensity_range: (f64::NAN, f64::NAN),
            output_file: None,
        }
    }

    pub fn with_intensity_range(mut self, min: f64, max: f64) -> Self {
        self.intensity_range = (min, max);
        self
    }

    pub fn with_frequency_range(mut self, min: f64, max: f64, unit: impl Into<String>) -> Self {
        self.frequency_range = (min, max);
        self.unit = unit.into();
        self
    }

    pub fn with_output_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_file = Some(path.into());
        self
    }

    /// Whether the intensity range should be taken from the data.
    pub fn is_auto_intensity(&self) -> bool {
        !(self.intensity_range.0.is_finite() && self.intensity_range.1.is_finite())
    }

    /// Check the tuple against the source it names.
    pub fn validate(&self) -> ViewResult<()> {
        if !self.source.is_open() {
            return Err(ViewError::SourceClosed(self.source.id().to_string()));
        }
        if self.bin_count == 0 {
            return Err(ViewError::invalid_parameter("bin_count", "must be > 0"));
        }
        let (low, high) = self.channel_range;
        if low > high {
            return Err(ViewError::invalid_parameter(
                "channel_range",
                format!("low channel {} is above high channel {}", low, high),
            ));
        }
        let channels = self.source.shape().channels;
        if high >= channels {
            return Err(ViewError::ChannelOutOfRange {
                channel: high,
                channels,
            });
        }
        if !self.is_auto_intensity() && self.intensity_range.0 >= self.intensity_range.1 {
            return Err(ViewError::invalid_parameter(
                "intensity_range",
                format!(
                    "min {} must be below max {}",
                    self.intensity_range.0, self.intensity_range.1
                ),
            ));
        }
        Ok(())
    }

    /// Deterministic encoding of the fields that affect the computed bins.
    ///
    /// The output file name is left out: it changes where the result is
    /// written, not what it is.
    pub fn cache_key(&self) -> Vec<u8> {
        format!(
            "histogram:v1:{}:{}:{}-{}:{:016x}-{:016x}:{}:{:016x}-{:016x}",
            self.source.id(),
            self.bin_count,
            self.channel_range.0,
            self.channel_range.1,
            self.frequency_range.0.to_bits(),
            self.frequency_range.1.to_bits(),
            self.unit,
            self.intensity_range.0.to_bits(),
            self.intensity_range.1.to_bits(),
        )
        .into_bytes()
    }

    fn same_source(&self, other: &Self) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.source) as *const (),
            Arc::as_ptr(&other.source) as *const (),
        )
    }
}

impl PartialEq for HistogramParameters {
    fn eq(&self, other: &Self) -> bool {
        self.same_source(other)
            && self.bin_count == other.bin_count
            && self.channel_range == other.channel_range
            && self.frequency_range.0.to_bits() == other.frequency_range.0.to_bits()
            && self.frequency_range.1.to_bits() == other.frequency_range.1.to_bits()
            && self.unit == other.unit
            && self.intensity_range.0.to_bits() == other.intensity_range.0.to_bits()
            && self.intensity_range.1.to_bits() == other.intensity_range.1.to_bits()
            && self.output_file == other.output_file
    }
}

impl fmt::Debug for HistogramParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistogramParameters")
            .field("source", &self.source.id())
            .field("bin_count", &self.bin_count)
            .field("channel_range", &self.channel_range)
            .field("frequency_range", &self.frequency_range)
            .field("unit", &self.unit)
            .field("intensity_range", &self.intensity_range)
            .field("output_file", &self.output_file)
            .finish()
    }
}

/// Bin edges and counts for one parameter tuple.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramResult {
    params: HistogramParameters,
    edges: Vec<f64>,
    counts: Vec<u64>,
}

impl HistogramResult {
    /// `edges` must hold exactly one more value than `counts` and be non-decreasing.
    pub fn new(params: HistogramParameters, edges: Vec<f64>, counts: Vec<u64>) -> ViewResult<Self> {
        if counts.is_empty() || edges.len() != counts.len() + 1 {
            return Err(ViewError::invalid_parameter(
                "edges",
                format!(
                    "{} edges cannot bound {} bins",
                    edges.len(),
                    counts.len()
                ),
            ));
        }
        if edges.windows(2).any(|w| !(w[0] <= w[1])) {
            return Err(ViewError::invalid_parameter(
                "edges",
                "bin edges must be finite and non-decreasing",
            ));
        }
        Ok(Self {
            params,
            edges,
            counts,
        })
    }

    pub fn params(&self) -> &HistogramParameters {
        &self.params
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn bin_count(&self) -> usize {
        self.counts.len()
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Intensity below which `percentile` (0.0..=1.0) of the samples fall.
    ///
    /// Interpolates linearly inside the bin that crosses the threshold.
    pub fn intensity_at_percentile(&self, percentile: f64) -> Option<f64> {
        let total = self.total();
        if total == 0 || !percentile.is_finite() {
            return None;
        }
        let target = percentile.clamp(0.0, 1.0) * total as f64;
        let mut cumulative = 0.0;
        for (i, &count) in self.counts.iter().enumerate() {
            let next = cumulative + count as f64;
            if next >= target && count > 0 {
                let fraction = ((target - cumulative) / count as f64).clamp(0.0, 1.0);
                return Some(self.edges[i] + fraction * (self.edges[i + 1] - self.edges[i]));
            }
            cumulative = next;
        }
        self.edges.last().copied()
    }

    /// Fraction of samples (0.0..=1.0) at or below `intensity`.
    pub fn percentile_of_intensity(&self, intensity: f64) -> Option<f64> {
        let total = self.total();
        if total == 0 || intensity.is_nan() {
            return None;
        }
        let mut below = 0.0;
        for (i, &count) in self.counts.iter().enumerate() {
            let (lo, hi) = (self.edges[i], self.edges[i + 1]);
            if intensity >= hi {
                below += count as f64;
            } else if intensity > lo {
                below += count as f64 * (intensity - lo) / (hi - lo);
            }
        }
        Some((below / total as f64).clamp(0.0, 1.0))
    }

    /// Two-column text table: bin center and count, one bin per line.
    pub fn to_table(&self) -> String {
        let mut out = format!("# histogram {} bins, source {}\n", self.bin_count(), self.params.source.id());
        for (i, count) in self.counts.iter().enumerate() {
            let center = 0.5 * (self.edges[i] + self.edges[i + 1]);
            out.push_str(&format!("{}\t{}\n", center, count));
        }
        out
    }
}
