//! Technical-feature engineering over OHLCV bars.
//!
//! The feature set is fixed; rows whose rolling windows are incomplete are
//! dropped, which discards the earliest bars of the series.

use marketlens_core::serialize::nullable_f64;
use marketlens_core::{BarTimestamp, PriceBar};
use serde::Serialize;

use crate::rolling::{mean, rolling_mean, rolling_std, std_dev};

/// Price bar extended with engineered features. Created once per detection
/// call and discarded with it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRow {
    pub ts: BarTimestamp,
    #[serde(serialize_with = "nullable_f64")]
    pub open: f64,
    #[serde(serialize_with = "nullable_f64")]
    pub high: f64,
    #[serde(serialize_with = "nullable_f64")]
    pub low: f64,
    #[serde(serialize_with = "nullable_f64")]
    pub close: f64,
    pub volume: u64,
    #[serde(serialize_with = "nullable_f64")]
    pub returns: f64,
    #[serde(serialize_with = "nullable_f64")]
    pub volatility_5: f64,
    #[serde(serialize_with = "nullable_f64")]
    pub volatility_21: f64,
    #[serde(serialize_with = "nullable_f64")]
    pub volatility_63: f64,
    #[serde(serialize_with = "nullable_f64")]
    pub price_range: f64,
    #[serde(serialize_with = "nullable_f64")]
    pub volume_norm: f64,
    #[serde(serialize_with = "nullable_f64")]
    pub atr_14: f64,
}

/// Engineer the fixed feature set, dropping warm-up rows.
pub(crate) fn engineer_features(bars: &[PriceBar]) -> Vec<FeatureRow> {
    let n = bars.len();

    let mut returns: Vec<Option<f64>> = vec![None; n];
    for i in 1..n {
        returns[i] = Some(bars[i].close / bars[i - 1].close - 1.0);
    }

    let volatility_5 = rolling_std(&returns, 5);
    let volatility_21 = rolling_std(&returns, 21);
    let volatility_63 = rolling_std(&returns, 63);

    let volumes: Vec<Option<f64>> = bars.iter().map(|bar| Some(bar.volume as f64)).collect();
    let volume_mean_21 = rolling_mean(&volumes, 21);

    // True range needs the previous close, so the first bar has none.
    let mut true_range: Vec<Option<f64>> = vec![None; n];
    for i in 1..n {
        let prev_close = bars[i - 1].close;
        let bar = &bars[i];
        true_range[i] = Some(
            (bar.high - bar.low)
                .max((bar.high - prev_close).abs())
                .max((bar.low - prev_close).abs()),
        );
    }
    let atr_14 = rolling_mean(&true_range, 14);

    let mut rows = Vec::new();
    for (i, bar) in bars.iter().enumerate() {
        let (Some(ret), Some(vol5), Some(vol21), Some(vol63), Some(mean_volume), Some(atr)) = (
            returns[i],
            volatility_5[i],
            volatility_21[i],
            volatility_63[i],
            volume_mean_21[i],
            atr_14[i],
        ) else {
            continue;
        };

        // 0/0 volume is undefined and drops the row like any other gap;
        // positive volume over a zero mean stays as infinity and is nulled
        // at the serialization boundary.
        let volume_norm = bar.volume as f64 / mean_volume;
        if volume_norm.is_nan() {
            continue;
        }

        rows.push(FeatureRow {
            ts: bar.ts,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            returns: ret,
            volatility_5: vol5,
            volatility_21: vol21,
            volatility_63: vol63,
            price_range: (bar.high - bar.low) / bar.close,
            volume_norm,
            atr_14: atr,
        });
    }
    rows
}

/// Columns fed to the latent-state model, in fixed order.
pub(crate) fn model_features(row: &FeatureRow) -> [f64; 3] {
    [row.volatility_21, row.price_range, row.atr_14]
}

/// Zero-mean / unit-variance standardization fit on the data it transforms.
/// Fresh per detection call; never shared across invocations.
#[derive(Debug, Clone)]
pub(crate) struct StandardScaler {
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl StandardScaler {
    pub(crate) fn fit(matrix: &[[f64; 3]]) -> Self {
        let dims = 3;
        let mut means = Vec::with_capacity(dims);
        let mut stds = Vec::with_capacity(dims);
        for d in 0..dims {
            let column: Vec<f64> = matrix.iter().map(|row| row[d]).collect();
            means.push(mean(&column));
            // Population standard deviation; a constant column passes through
            // unscaled instead of dividing by zero.
            let sd = std_dev(&column, 0);
            stds.push(if sd > 0.0 { sd } else { 1.0 });
        }
        Self { means, stds }
    }

    pub(crate) fn transform(&self, row: &[f64; 3]) -> [f64; 3] {
        [
            (row[0] - self.means[0]) / self.stds[0],
            (row[1] - self.means[1]) / self.stds[1],
            (row[2] - self.means[2]) / self.stds[2],
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marketlens_core::IsoDate;
    use time::Duration;

    pub(crate) fn synthetic_bars(n: usize) -> Vec<PriceBar> {
        let start = IsoDate::parse("2023-01-02").expect("date").into_date();
        (0..n)
            .map(|i| {
                let phase = (i as f64 * 0.37).sin();
                let close = 100.0 + 8.0 * phase + (i as f64) * 0.05;
                let open = close - 0.4 * phase;
                let high = open.max(close) + 0.9 + 0.3 * phase.abs();
                let low = open.min(close) - 0.8;
                let ts = BarTimestamp::Date(IsoDate::from_date(start + Duration::days(i as i64)));
                PriceBar::new(ts, open, high, low, close, 5_000 + (i as u64 % 7) * 800)
                    .expect("bar")
            })
            .collect()
    }

    #[test]
    fn warmup_rows_are_dropped() {
        let bars = synthetic_bars(100);
        let rows = engineer_features(&bars);
        // The 63-return window is the binding constraint: first defined at
        // bar index 63, so 100 - 64 + ... = 37 surviving rows.
        assert_eq!(rows.len(), 37);
        assert_eq!(rows[0].ts, bars[63].ts);
    }

    #[test]
    fn too_short_series_yields_no_rows() {
        let bars = synthetic_bars(63);
        assert!(engineer_features(&bars).is_empty());
    }

    #[test]
    fn feature_engineering_is_deterministic() {
        let bars = synthetic_bars(100);
        let first = engineer_features(&bars);
        let second = engineer_features(&bars);
        assert_eq!(first, second);
    }

    #[test]
    fn scaler_standardizes_to_zero_mean_unit_variance() {
        let matrix = vec![[1.0, 10.0, 5.0], [3.0, 30.0, 5.0], [5.0, 20.0, 5.0]];
        let scaler = StandardScaler::fit(&matrix);
        let transformed: Vec<[f64; 3]> = matrix.iter().map(|row| scaler.transform(row)).collect();

        for d in 0..2 {
            let column: Vec<f64> = transformed.iter().map(|row| row[d]).collect();
            assert!(mean(&column).abs() < 1e-12);
            assert!((std_dev(&column, 0) - 1.0).abs() < 1e-12);
        }
        // Constant column passes through unscaled.
        assert!(transformed.iter().all(|row| row[2] == 0.0));
    }
}
