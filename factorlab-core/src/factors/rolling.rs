//! Trailing-window helpers shared by the windowed indicators.
//!
//! Each window is summed fresh from its own elements. That keeps a value
//! computed over the full table bit-identical to one computed over just the
//! trailing window, which is what streaming recomputation relies on.

/// Trailing sum over `periods` values; NaN until the window fills or while
/// any element in it is NaN.
pub fn rolling_sum(values: &[f64], periods: usize) -> Vec<f64> {
    let mut result = vec![f64::NAN; values.len()];
    if periods == 0 {
        return result;
    }
    for end in periods..=values.len() {
        let window = &values[end - periods..end];
        if window.iter().all(|v| !v.is_nan()) {
            result[end - 1] = window.iter().sum();
        }
    }
    result
}

/// Trailing arithmetic mean over `periods` values.
pub fn rolling_mean(values: &[f64], periods: usize) -> Vec<f64> {
    let divisor = periods as f64;
    rolling_sum(values, periods)
        .into_iter()
        .map(|sum| sum / divisor)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::{assert_approx, DEFAULT_EPSILON};

    #[test]
    fn sum_fills_after_window() {
        let result = rolling_sum(&[1.0, 2.0, 3.0, 4.0], 2);
        assert!(result[0].is_nan());
        assert_approx(result[1], 3.0, DEFAULT_EPSILON);
        assert_approx(result[3], 7.0, DEFAULT_EPSILON);
    }

    #[test]
    fn nan_poisons_its_windows_only() {
        let result = rolling_mean(&[1.0, f64::NAN, 3.0, 4.0, 5.0], 2);
        assert!(result[1].is_nan());
        assert!(result[2].is_nan());
        assert_approx(result[3], 3.5, DEFAULT_EPSILON);
        assert_approx(result[4], 4.5, DEFAULT_EPSILON);
    }

    #[test]
    fn short_input_is_all_nan() {
        assert!(rolling_mean(&[1.0, 2.0], 3).iter().all(|v| v.is_nan()));
        assert!(rolling_mean(&[], 3).is_empty());
    }

    #[test]
    fn tail_window_matches_full_series() {
        let values: Vec<f64> = (0..50).map(|i| (i as f64 * 0.37).sin() * 100.0).collect();
        let full = rolling_mean(&values, 7);
        let tail = rolling_mean(&values[40..], 7);
        assert_eq!(full[49].to_bits(), tail[9].to_bits());
    }
}
