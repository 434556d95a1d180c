//! Volatility level estimation: fit a conditional-variance model to the
//! daily reference series, project symmetric price bands, and align them
//! with the requested intraday series.

mod arch;
mod levels;
mod merge;
mod simplex;

use marketlens_core::{
    AnalysisError, AnalysisRequest, ArchModelKind, DistributionKind, Granularity, IsoDate,
    QuoteSeries, QuoteSource,
};
use tracing::info;

use crate::cancel::CancelFlag;
use crate::rolling::simple_returns;

pub use levels::{LevelPair, LeveledBar};
pub use merge::MergedRow;

/// Fixed lookback opening for the daily reference fetch; the variance model
/// needs a long history regardless of the requested intraday window.
const DAILY_LOOKBACK_START: &str = "2023-01-01";

/// Minimum daily returns required before a variance-model fit is attempted.
const MIN_TRAINING_RETURNS: usize = 20;

/// Returns are scaled into percentage space for optimizer conditioning and
/// rescaled on output.
const RETURN_SCALE: f64 = 100.0;

/// Volatility level estimation pipeline.
///
/// Each invocation is self-contained: fresh model state per call, no partial
/// output. The CPU-bound fit runs on the blocking pool.
pub struct LevelEstimator<S> {
    source: S,
    cancel: CancelFlag,
}

impl<S: QuoteSource> LevelEstimator<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cancel: CancelFlag::new(),
        }
    }

    /// Share a cancellation flag with the caller; fits abort best-effort at
    /// optimizer iteration boundaries.
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn estimate(
        &self,
        request: AnalysisRequest,
        model: ArchModelKind,
        distribution: DistributionKind,
        levels: u32,
    ) -> Result<Vec<MergedRow>, AnalysisError> {
        // Cheap validation first: nothing may reach the network for a
        // request that can never produce output.
        if levels == 0 {
            return Err(AnalysisError::invalid_parameter(
                "levels must be a positive integer",
            ));
        }

        let intraday = self.source.fetch(&request).await?;
        if intraday.is_empty() {
            return Err(AnalysisError::insufficient_data(format!(
                "provider returned no {} bars for {} in the requested window",
                request.granularity, request.symbol
            )));
        }

        let daily_request = request
            .with_granularity(Granularity::OneDay)
            .with_start_date(daily_lookback_start());
        let daily = self.source.fetch(&daily_request).await?;
        if daily.is_empty() {
            return Err(AnalysisError::insufficient_data(format!(
                "provider returned no daily reference bars for {}",
                request.symbol
            )));
        }

        let cancel = self.cancel.clone();
        let leveled = tokio::task::spawn_blocking(move || {
            level_daily_series(daily, model, distribution, levels, &cancel)
        })
        .await
        .map_err(|e| AnalysisError::model_fit(format!("fit worker aborted: {e}")))??;

        let mut rows = merge::merge_by_calendar_date(intraday.into_bars(), leveled, levels);
        merge::round_to_close_precision(&mut rows);

        info!(
            symbol = %request.symbol,
            model = %model,
            distribution = %distribution,
            levels,
            rows = rows.len(),
            "volatility levels estimated"
        );
        Ok(rows)
    }
}

fn daily_lookback_start() -> IsoDate {
    IsoDate::parse(DAILY_LOOKBACK_START).expect("lookback start date is a valid ISO date")
}

/// Fit the variance model on the settled portion of the daily series and
/// attach the level ladder.
///
/// The still-open last bar is excluded from training; the in-sample path
/// covers the settled rows and the one-step-ahead forecast lands on the open
/// bar. The first row has no defined return and is dropped, so the output
/// has one row fewer than the input series.
fn level_daily_series(
    daily: QuoteSeries,
    model: ArchModelKind,
    distribution: DistributionKind,
    levels: u32,
    cancel: &CancelFlag,
) -> Result<Vec<LeveledBar>, AnalysisError> {
    let bars = daily.into_bars();
    let training = &bars[..bars.len() - 1];

    let closes: Vec<f64> = training.iter().map(|bar| bar.close).collect();
    let returns = simple_returns(&closes);
    if returns.len() < MIN_TRAINING_RETURNS {
        return Err(AnalysisError::insufficient_data(format!(
            "{} daily returns available; the variance model needs at least {}",
            returns.len(),
            MIN_TRAINING_RETURNS
        )));
    }

    let scaled: Vec<f64> = returns.iter().map(|r| r * RETURN_SCALE).collect();
    let fitted = arch::fit(model, distribution, &scaled, cancel)?;

    let mut volatility: Vec<f64> = fitted
        .conditional
        .iter()
        .map(|sigma| sigma / RETURN_SCALE)
        .collect();
    volatility.push(fitted.forecast / RETURN_SCALE);

    levels::attach_levels(&bars[1..], &volatility, levels)
}
