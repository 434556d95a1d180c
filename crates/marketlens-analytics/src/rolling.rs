//! Rolling-window statistics shared by both pipelines.
//!
//! Windows over optional columns are defined only when every value in the
//! window is present, so an undefined input poisons every window that
//! covers it.

/// Simple returns `close[t]/close[t-1] - 1`; one element shorter than input.
pub fn simple_returns(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .map(|pair| pair[1] / pair[0] - 1.0)
        .collect()
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Variance with the given delta degrees of freedom (1 = sample, 0 = population).
pub fn variance(values: &[f64], ddof: usize) -> f64 {
    if values.len() <= ddof {
        return f64::NAN;
    }
    let center = mean(values);
    let sum_sq: f64 = values.iter().map(|v| (v - center).powi(2)).sum();
    sum_sq / (values.len() - ddof) as f64
}

pub fn std_dev(values: &[f64], ddof: usize) -> f64 {
    variance(values, ddof).sqrt()
}

/// Rolling mean over an optional column; `None` until the window is complete.
pub fn rolling_mean(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    rolling_apply(values, window, mean)
}

/// Rolling sample standard deviation (ddof = 1) over an optional column.
pub fn rolling_std(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    rolling_apply(values, window, |slice| std_dev(slice, 1))
}

fn rolling_apply(
    values: &[Option<f64>],
    window: usize,
    stat: impl Fn(&[f64]) -> f64,
) -> Vec<Option<f64>> {
    debug_assert!(window > 0);
    let mut out = vec![None; values.len()];
    if window == 0 || values.len() < window {
        return out;
    }

    let mut buffer = Vec::with_capacity(window);
    for end in (window - 1)..values.len() {
        buffer.clear();
        let complete = values[end + 1 - window..=end]
            .iter()
            .all(|value| match value {
                Some(v) => {
                    buffer.push(*v);
                    true
                }
                None => false,
            });
        if complete {
            out[end] = Some(stat(&buffer));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_shrink_by_one() {
        let returns = simple_returns(&[100.0, 110.0, 99.0]);
        assert_eq!(returns.len(), 2);
        assert!((returns[0] - 0.10).abs() < 1e-12);
        assert!((returns[1] + 0.10).abs() < 1e-12);
    }

    #[test]
    fn sample_std_matches_known_value() {
        // std of [2, 4, 4, 4, 5, 5, 7, 9] with ddof=1
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((std_dev(&values, 1) - 2.138_089_935).abs() < 1e-8);
    }

    #[test]
    fn rolling_window_fills_after_warmup() {
        let column: Vec<Option<f64>> = vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)];
        let means = rolling_mean(&column, 3);
        assert_eq!(means, vec![None, None, Some(2.0), Some(3.0)]);
    }

    #[test]
    fn gaps_propagate_through_windows() {
        let column: Vec<Option<f64>> = vec![None, Some(2.0), Some(3.0), Some(4.0)];
        let means = rolling_mean(&column, 3);
        assert_eq!(means, vec![None, None, None, Some(3.0)]);
    }
}
