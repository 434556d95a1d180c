//! Market-regime detection: engineered features, a Gaussian latent-state
//! model, and volatility-ordered canonical regime labels.

mod features;
mod hmm;

use marketlens_core::{AnalysisError, AnalysisRequest, QuoteSeries, QuoteSource};
use nalgebra::DMatrix;
use serde::Serialize;
use tracing::info;

use crate::cancel::CancelFlag;
use crate::regime::hmm::HmmConfig;

pub use features::FeatureRow;

/// Feature row labelled with both the raw latent-state index and the
/// canonical, volatility-ordered regime index.
///
/// Raw indices are arbitrary per fit and kept for diagnostics only; `regime`
/// is the comparable label. Two fields, never an in-place remap.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegimeRow {
    #[serde(flatten)]
    pub features: FeatureRow,
    pub regime_raw: usize,
    pub regime: usize,
}

/// Market-regime detection pipeline.
///
/// Self-contained per invocation: a fresh scaler and model every call, the
/// CPU-bound EM fit on the blocking pool.
pub struct RegimeDetector<S> {
    source: S,
    cancel: CancelFlag,
}

impl<S: QuoteSource> RegimeDetector<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cancel: CancelFlag::new(),
        }
    }

    /// Share a cancellation flag with the caller; the EM loop aborts
    /// best-effort at iteration boundaries.
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn detect(
        &self,
        request: AnalysisRequest,
        n_regimes: usize,
    ) -> Result<Vec<RegimeRow>, AnalysisError> {
        if n_regimes < 2 {
            return Err(AnalysisError::invalid_parameter(
                "regime count must be at least 2",
            ));
        }

        let series = self.source.fetch(&request).await?;
        if series.is_empty() {
            return Err(AnalysisError::insufficient_data(format!(
                "provider returned no {} bars for {} in the requested window",
                request.granularity, request.symbol
            )));
        }

        let cancel = self.cancel.clone();
        let rows =
            tokio::task::spawn_blocking(move || detect_regimes(series, n_regimes, &cancel))
                .await
                .map_err(|e| AnalysisError::model_fit(format!("fit worker aborted: {e}")))??;

        info!(
            symbol = %request.symbol,
            n_regimes,
            rows = rows.len(),
            "market regimes detected"
        );
        Ok(rows)
    }
}

fn detect_regimes(
    series: QuoteSeries,
    n_regimes: usize,
    cancel: &CancelFlag,
) -> Result<Vec<RegimeRow>, AnalysisError> {
    let bars = series.into_bars();
    let rows = features::engineer_features(&bars);
    if rows.is_empty() {
        return Err(AnalysisError::insufficient_data(format!(
            "{} bars leave no complete feature rows after the rolling warm-up",
            bars.len()
        )));
    }

    let raw_matrix: Vec<[f64; 3]> = rows.iter().map(features::model_features).collect();
    let scaler = features::StandardScaler::fit(&raw_matrix);
    let flat: Vec<f64> = raw_matrix
        .iter()
        .flat_map(|row| scaler.transform(row))
        .collect();
    let observations = DMatrix::from_row_slice(rows.len(), 3, &flat);

    let model = hmm::fit(&observations, HmmConfig::new(n_regimes), cancel)?;
    let states = model.predict(&observations)?;

    let mapping = canonical_mapping(&rows, &states, n_regimes);
    Ok(rows
        .into_iter()
        .zip(states)
        .map(|(features, raw)| RegimeRow {
            features,
            regime_raw: raw,
            regime: mapping[raw],
        })
        .collect())
}

/// Order raw states by their mean 21-bar volatility, ascending: the calmest
/// state becomes regime 0. Raw indices are not stable across fits and must
/// never leave the pipeline as the primary label.
fn canonical_mapping(rows: &[FeatureRow], states: &[usize], n_regimes: usize) -> Vec<usize> {
    let mut sums = vec![0.0_f64; n_regimes];
    let mut counts = vec![0_usize; n_regimes];
    for (row, &state) in rows.iter().zip(states.iter()) {
        sums[state] += row.volatility_21;
        counts[state] += 1;
    }

    let mut present: Vec<usize> = (0..n_regimes).filter(|&s| counts[s] > 0).collect();
    present.sort_by(|&a, &b| {
        let mean_a = sums[a] / counts[a] as f64;
        let mean_b = sums[b] / counts[b] as f64;
        mean_a.total_cmp(&mean_b)
    });

    let mut mapping = vec![usize::MAX; n_regimes];
    for (rank, &state) in present.iter().enumerate() {
        mapping[state] = rank;
    }
    mapping
}
