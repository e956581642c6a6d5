//! Synthetic cube data.
//!
//! Planes are row-major `f32`, one per channel. Values are deterministic so
//! tests can assert on exact histogram counts or pixel colors.

/// A cube whose channel `c` is filled with the constant `c`.
///
/// Handy for histogram tests: binning channels `[lo, hi]` gives exactly one
/// populated value per channel.
pub fn create_channel_index_cube(width: usize, height: usize, channels: usize) -> Vec<Vec<f32>> {
    (0..channels)
        .map(|c| vec![c as f32; width * height])
        .collect()
}

/// A cube with a Gaussian source at the plane center whose peak brightness
/// moves with the channel, on a background of 1.0.
///
/// Peak amplitude is `amplitude * (1 + channel)`; `sigma` is in pixels.
pub fn create_gaussian_cube(
    width: usize,
    height: usize,
    channels: usize,
    amplitude: f32,
    sigma: f32,
) -> Vec<Vec<f32>> {
    let cx = (width as f32 - 1.0) / 2.0;
    let cy = (height as f32 - 1.0) / 2.0;
    let two_sigma_sq = 2.0 * sigma * sigma;

    (0..channels)
        .map(|c| {
            let peak = amplitude * (1 + c) as f32;
            let mut plane = Vec::with_capacity(width * height);
            for y in 0..height {
                for x in 0..width {
                    let d2 = (x as f32 - cx).powi(2) + (y as f32 - cy).powi(2);
                    plane.push(1.0 + peak * (-d2 / two_sigma_sq).exp());
                }
            }
            plane
        })
        .collect()
}

/// A plane of zeros with NaN at the given `(col, row)` positions.
pub fn create_plane_with_nans(
    width: usize,
    height: usize,
    nan_positions: &[(usize, usize)],
) -> Vec<f32> {
    let mut data = vec![0.0f32; width * height];
    for &(col, row) in nan_positions {
        if col < width && row < height {
            data[row * width + col] = f32::NAN;
        }
    }
    data
}
