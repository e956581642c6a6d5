//! Histogram binning over a channel range of a cube.
//!
//! Runs on the calling thread and fans out over channels with rayon; the
//! pipeline calls it from `spawn_blocking`. NaN and infinite samples are
//! ignored, as are samples outside an explicit intensity range.

use rayon::prelude::*;
use tracing::debug;
use view_common::{HistogramParameters, HistogramResult, ImageSource};

use crate::HistogramError;

/// Channels of `params.channel_range` that fall inside the frequency window.
///
/// Without a finite frequency window (or without a frequency axis on the
/// source) the whole channel range is selected.
pub fn select_channels(params: &HistogramParameters) -> Result<Vec<usize>, HistogramError> {
    let (low, high) = params.channel_range;
    let (f_min, f_max) = params.frequency_range;
    let windowed = f_min.is_finite() && f_max.is_finite();
    let (f_lo, f_hi) = if f_min <= f_max { (f_min, f_max) } else { (f_max, f_min) };

    let channels: Vec<usize> = (low..=high)
        .filter(|&c| {
            if !windowed {
                return true;
            }
            match params.source.frequency(c) {
                Some(f) => f >= f_lo && f <= f_hi,
                None => true,
            }
        })
        .collect();

    if channels.is_empty() {
        return Err(HistogramError::EmptySelection { low, high });
    }
    Ok(channels)
}

/// Bin index of `value` in `n` equal bins over `[lo, hi]`.
///
/// `hi` itself lands in the last bin; anything outside the range, or
/// non-finite, has no bin.
pub fn bin_index(value: f64, lo: f64, hi: f64, n: usize) -> Option<usize> {
    if !value.is_finite() || value < lo || value > hi || n == 0 {
        return None;
    }
    let width = hi - lo;
    if width <= 0.0 {
        return Some(0);
    }
    let idx = ((value - lo) / width * n as f64).floor() as usize;
    Some(idx.min(n - 1))
}

/// Bin edges for `n` equal bins over `[lo, hi]`; the last edge is exactly `hi`.
pub fn bin_edges(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    let step = (hi - lo) / n as f64;
    let mut edges: Vec<f64> = (0..n).map(|i| lo + step * i as f64).collect();
    edges.push(hi);
    edges
}

/// Compute the histogram described by `params`.
pub fn compute_histogram(params: &HistogramParameters) -> Result<HistogramResult, HistogramError> {
    params
        .validate()
        .map_err(HistogramError::InvalidParameters)?;
    let channels = select_channels(params)?;
    let source = params.source.as_ref();

    let (lo, hi) = if params.is_auto_intensity() {
        data_range(source, &channels)?
    } else {
        params.intensity_range
    };

    let n = params.bin_count;
    let counts = channels
        .par_iter()
        .map(|&channel| {
            let plane = read(source, channel)?;
            let mut counts = vec![0u64; n];
            for &v in &plane {
                if let Some(i) = bin_index(v as f64, lo, hi, n) {
                    counts[i] += 1;
                }
            }
            Ok(counts)
        })
        .try_reduce(
            || vec![0u64; n],
            |mut acc, part| {
                for (a, p) in acc.iter_mut().zip(part) {
                    *a += p;
                }
                Ok(acc)
            },
        )?;

    debug!(
        source = source.id(),
        channels = channels.len(),
        bins = n,
        lo = lo,
        hi = hi,
        samples = counts.iter().sum::<u64>(),
        "Computed histogram"
    );

    HistogramResult::new(params.clone(), bin_edges(lo, hi, n), counts)
        .map_err(HistogramError::InvalidParameters)
}

fn read(source: &dyn ImageSource, channel: usize) -> Result<Vec<f32>, HistogramError> {
    source
        .read_plane(channel)
        .map_err(|e| HistogramError::ReadFailed { channel, source: e })
}

/// Finite min/max over the selected channels, widened when degenerate.
fn data_range(source: &dyn ImageSource, channels: &[usize]) -> Result<(f64, f64), HistogramError> {
    let (lo, hi) = channels
        .par_iter()
        .map(|&channel| {
            let plane = read(source, channel)?;
            Ok(plane
                .iter()
                .filter(|v| v.is_finite())
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                    (lo.min(v as f64), hi.max(v as f64))
                }))
        })
        .try_reduce(
            || (f64::INFINITY, f64::NEG_INFINITY),
            |a, b| Ok((a.0.min(b.0), a.1.max(b.1))),
        )?;

    if lo > hi {
        return Err(HistogramError::NoData);
    }
    if lo == hi {
        return Ok((lo - 0.5, hi + 0.5));
    }
    Ok((lo, hi))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::{
        assert_slice_approx_eq, create_channel_index_cube, create_plane_with_nans, MemorySource,
    };

    #[test]
    fn test_bin_index() {
        assert_eq!(bin_index(0.0, 0.0, 10.0, 10), Some(0));
        assert_eq!(bin_index(9.99, 0.0, 10.0, 10), Some(9));
        assert_eq!(bin_index(10.0, 0.0, 10.0, 10), Some(9));
        assert_eq!(bin_index(10.01, 0.0, 10.0, 10), None);
        assert_eq!(bin_index(-0.01, 0.0, 10.0, 10), None);
        assert_eq!(bin_index(f64::NAN, 0.0, 10.0, 10), None);
    }

    #[test]
    fn test_bin_edges() {
        assert_slice_approx_eq!(&bin_edges(0.0, 1.0, 4), &[0.0, 0.25, 0.5, 0.75, 1.0], 1e-12);
        assert_eq!(bin_edges(0.1, 0.7, 3).last(), Some(&0.7));
    }

    #[test]
    fn test_channel_range_is_inclusive() {
        let source = MemorySource::new("cube", 2, 2, create_channel_index_cube(2, 2, 5)).into_arc();
        let params = HistogramParameters::new(source, 5, (1, 3)).with_intensity_range(0.0, 5.0);
        let result = compute_histogram(&params).unwrap();
        assert_eq!(result.counts(), &[0, 4, 4, 4, 0]);
    }

    #[test]
    fn test_frequency_window_selects_channels() {
        let source = MemorySource::new("cube", 1, 1, create_channel_index_cube(1, 1, 5))
            .with_frequencies(100.0, 10.0)
            .into_arc();
        let params = HistogramParameters::new(source.clone(), 5, (0, 4))
            .with_frequency_range(115.0, 135.0, "Hz");
        assert_eq!(select_channels(&params).unwrap(), vec![2, 3]);

        let empty = HistogramParameters::new(source, 5, (0, 4)).with_frequency_range(1.0, 2.0, "Hz");
        assert!(matches!(
            select_channels(&empty),
            Err(HistogramError::EmptySelection { .. })
        ));
    }

    #[test]
    fn test_auto_range_ignores_nan() {
        let mut plane = create_plane_with_nans(3, 1, &[(1, 0)]);
        plane[0] = -2.0;
        plane[2] = 6.0;
        let source = MemorySource::new("cube", 3, 1, vec![plane]).into_arc();
        let result = compute_histogram(&HistogramParameters::new(source, 2, (0, 0))).unwrap();
        assert_slice_approx_eq!(result.edges(), &[-2.0, 2.0, 6.0], 1e-12);
        assert_eq!(result.counts(), &[1, 1]);
    }

    #[test]
    fn test_constant_data_gets_unit_range() {
        let source = MemorySource::new("cube", 2, 1, vec![vec![3.0, 3.0]]).into_arc();
        let result = compute_histogram(&HistogramParameters::new(source, 1, (0, 0))).unwrap();
        assert_eq!(result.edges(), &[2.5, 3.5]);
        assert_eq!(result.total(), 2);
    }

    #[test]
    fn test_all_nan_is_no_data() {
        let source = MemorySource::new("cube", 1, 1, vec![vec![f32::NAN]]).into_arc();
        assert!(matches!(
            compute_histogram(&HistogramParameters::new(source, 4, (0, 0))),
            Err(HistogramError::NoData)
        ));
    }

    #[test]
    fn test_read_failure_is_reported() {
        let source = MemorySource::new("cube", 1, 1, create_channel_index_cube(1, 1, 3))
            .fail_channel(1)
            .into_arc();
        let params = HistogramParameters::new(source, 4, (0, 2)).with_intensity_range(0.0, 3.0);
        assert!(matches!(
            compute_histogram(&params),
            Err(HistogramError::ReadFailed { channel: 1, .. })
        ));
    }
}
