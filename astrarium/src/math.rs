//! Small statistics helpers shared by detection, calibration and fitting.

/// MAD (Median Absolute Deviation) to standard deviation conversion factor.
///
/// For a normal distribution, σ ≈ 1.4826 × MAD.
/// This is the exact value: 1 / Φ⁻¹(3/4) where Φ⁻¹ is the inverse CDF.
pub const MAD_TO_SIGMA: f32 = 1.4826022;

/// Calculate the median of f32 values, reordering the slice in place.
///
/// Even-length slices return the average of the two middle values.
pub fn median_f32_mut(values: &mut [f32]) -> f32 {
    debug_assert!(!values.is_empty());

    values.sort_unstable_by(|a, b| a.total_cmp(b));

    let len = values.len();
    if len % 2 == 0 {
        (values[len / 2 - 1] + values[len / 2]) / 2.0
    } else {
        values[len / 2]
    }
}

/// Calculate median and MAD-derived sigma, reordering the slice in place.
pub fn median_and_mad_sigma_f32_mut(values: &mut [f32]) -> (f32, f32) {
    let median = median_f32_mut(values);

    let mut deviations: Vec<f32> = values.iter().map(|v| (v - median).abs()).collect();
    let mad = median_f32_mut(&mut deviations);

    (median, mad * MAD_TO_SIGMA)
}

/// Calculate the mean of f64 values.
pub fn mean_f64(values: &[f64]) -> f64 {
    debug_assert!(!values.is_empty());
    values.iter().sum::<f64>() / values.len() as f64
}

/// Calculate the population standard deviation of f64 values.
pub fn std_dev_f64(values: &[f64], mean: f64) -> f64 {
    debug_assert!(!values.is_empty());
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}
