//! Cached layout of a histogram result.
//!
//! Stored as one `f64` sequence: `[n, edge_0 .. edge_n, count_0 .. count_{n-1}]`,
//! so a result with `n` bins is `2n + 2` doubles. Counts are exact up to 2^53.

use view_common::{HistogramParameters, HistogramResult};

use crate::HistogramError;

/// Flatten a result for the artifact cache.
pub fn encode_result(result: &HistogramResult) -> Vec<f64> {
    let mut values = Vec::with_capacity(2 * result.bin_count() + 2);
    values.push(result.bin_count() as f64);
    values.extend_from_slice(result.edges());
    values.extend(result.counts().iter().map(|&c| c as f64));
    values
}

/// Rebuild a result for `params` from its cached form.
pub fn decode_result(
    params: HistogramParameters,
    values: &[f64],
) -> Result<HistogramResult, HistogramError> {
    let Some(&n) = values.first() else {
        return Err(HistogramError::Malformed("empty blob".into()));
    };
    if !(n.is_finite() && n >= 1.0 && n.fract() == 0.0) {
        return Err(HistogramError::Malformed(format!("bad bin count {}", n)));
    }
    let n = n as usize;
    if n != params.bin_count || values.len() != 2 * n + 2 {
        return Err(HistogramError::Malformed(format!(
            "{} values cannot hold {} bins (expected {})",
            values.len(),
            n,
            params.bin_count
        )));
    }

    let edges = values[1..n + 2].to_vec();
    let counts = values[n + 2..]
        .iter()
        .map(|&c| {
            if c.is_finite() && c >= 0.0 && c.fract() == 0.0 {
                Ok(c as u64)
            } else {
                Err(HistogramError::Malformed(format!("bad count {}", c)))
            }
        })
        .collect::<Result<Vec<u64>, _>>()?;

    HistogramResult::new(params, edges, counts).map_err(|e| HistogramError::Malformed(e.to_string()))
}
