//! Sample statistics shared by the drift algorithms and the health scorer

use crate::models::SampleStats;

/// Drop NaN and infinite values
pub fn finite_values(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| v.is_finite()).collect()
}

/// Arithmetic mean, `None` for an empty slice
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population variance (divides by n), computed in two passes for stability
pub fn variance(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let sum_sq: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some(sum_sq / values.len() as f64)
}

/// Population standard deviation
pub fn std_dev(values: &[f64]) -> Option<f64> {
    variance(values).map(f64::sqrt)
}

/// Mean, standard deviation and size of a sample; zeros for an empty one
pub fn summarize(values: &[f64]) -> SampleStats {
    SampleStats {
        mean: mean(values).unwrap_or(0.0),
        std: std_dev(values).unwrap_or(0.0),
        n: values.len(),
    }
}

/// Standardized mean difference between two samples
///
/// `|mean(a) - mean(b)| / sqrt((var(a) + var(b)) / 2)`, or 0 when the pooled
/// standard deviation is 0. NaN when the pooled standard deviation overflows,
/// so callers can reject the result instead of reading it as "no effect".
pub fn effect_size(reference: &[f64], current: &[f64]) -> f64 {
    let (Some(ref_mean), Some(cur_mean)) = (mean(reference), mean(current)) else {
        return 0.0;
    };
    let ref_var = variance(reference).unwrap_or(0.0);
    let cur_var = variance(current).unwrap_or(0.0);

    let pooled_std = ((ref_var + cur_var) / 2.0).sqrt();
    if !pooled_std.is_finite() {
        return f64::NAN;
    }
    if pooled_std <= 0.0 {
        return 0.0;
    }
    (ref_mean - cur_mean).abs() / pooled_std
}

/// Pearson correlation between sample index and value
///
/// Returns 0 for fewer than three points or a constant series.
pub fn index_correlation(values: &[f64]) -> f64 {
    let n = values.len();
    if n <= 2 {
        return 0.0;
    }

    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = mean(values).unwrap_or(0.0);

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        let dy = y - y_mean;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denom = (var_x * var_y).sqrt();
    if denom < f64::EPSILON {
        return 0.0;
    }
    cov / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_population_variance() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((mean(&values).unwrap() - 5.0).abs() < 1e-12);
        assert!((variance(&values).unwrap() - 4.0).abs() < 1e-12);
        assert!((std_dev(&values).unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_sample() {
        assert!(mean(&[]).is_none());
        let stats = summarize(&[]);
        assert_eq!(stats.n, 0);
        assert_eq!(stats.mean, 0.0);
    }

    #[test]
    fn test_finite_values_filters_nan_and_inf() {
        let cleaned = finite_values(&[1.0, f64::NAN, 2.0, f64::INFINITY, f64::NEG_INFINITY]);
        assert_eq!(cleaned, vec![1.0, 2.0]);
    }

    #[test]
    fn test_effect_size_zero_pooled_std() {
        // Two constant samples: pooled std is 0, effect size must not be NaN
        let a = [1.0; 20];
        let b = [2.0; 20];
        assert_eq!(effect_size(&a, &b), 0.0);
    }

    #[test]
    fn test_effect_size_known_value() {
        // Both samples have population variance 1, means differ by 2
        let a = [-1.0, 1.0, -1.0, 1.0];
        let b = [1.0, 3.0, 1.0, 3.0];
        assert!((effect_size(&a, &b) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_effect_size_overflowing_spread_is_nan() {
        // Finite values whose squared deviations overflow
        let a: Vec<f64> = (0..20).map(|i| if i % 2 == 0 { 1e308 } else { -1e308 }).collect();
        let b = [0.0; 20];
        assert!(effect_size(&a, &b).is_nan());
    }

    #[test]
    fn test_index_correlation() {
        let rising: Vec<f64> = (0..10).map(|i| i as f64 * 0.5).collect();
        assert!((index_correlation(&rising) - 1.0).abs() < 1e-9);

        let falling: Vec<f64> = (0..10).map(|i| -(i as f64)).collect();
        assert!((index_correlation(&falling) + 1.0).abs() < 1e-9);

        assert_eq!(index_correlation(&[1.0, 1.0, 1.0, 1.0]), 0.0);
        assert_eq!(index_correlation(&[1.0, 2.0]), 0.0);
    }
}
