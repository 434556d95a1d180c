use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use crate::domain::{AnalysisRequest, BarTimestamp, PriceBar, QuoteSeries, UtcDateTime};
use crate::quotes::http::{HttpClient, HttpRequest};
use crate::quotes::QuoteSource;
use crate::AnalysisError;

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const SECONDS_PER_DAY: i64 = 86_400;

/// Quotation adapter for the provider's chart endpoint.
///
/// All request validation happens before this adapter is reached: an
/// `AnalysisRequest` cannot be constructed with an unknown symbol, a
/// malformed date, or an inverted range, so a fetch never spends a network
/// round trip on invalid input.
#[derive(Clone)]
pub struct ChartQuoteSource {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    timeout_ms: u64,
}

impl ChartQuoteSource {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            base_url: String::from(DEFAULT_BASE_URL),
            timeout_ms: 5_000,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    fn endpoint(&self, request: &AnalysisRequest) -> String {
        // period2 is exclusive on the provider side; push it one day out so
        // the requested end date stays inclusive.
        let period1 = request.start_date.unix_midnight();
        let period2 = request.end_date.unix_midnight() + SECONDS_PER_DAY;
        format!(
            "{}/{}?period1={}&period2={}&interval={}&events=div%7Csplit&includePrePost=false",
            self.base_url,
            request.symbol.as_str(),
            period1,
            period2,
            request.granularity.as_str(),
        )
    }

    async fn fetch_series(&self, request: &AnalysisRequest) -> Result<QuoteSeries, AnalysisError> {
        let http_request = HttpRequest::get(self.endpoint(request))
            .with_header("accept", "application/json")
            .with_timeout_ms(self.timeout_ms);

        let response = self
            .http_client
            .execute(http_request)
            .await
            .map_err(|e| AnalysisError::upstream(e.message()))?;

        let payload: ChartResponse = serde_json::from_str(&response.body).map_err(|e| {
            if response.is_success() {
                AnalysisError::upstream(format!("malformed provider response: {e}"))
            } else {
                AnalysisError::upstream(format!("provider returned status {}", response.status))
            }
        })?;

        if let Some(error) = payload.chart.error {
            return Err(AnalysisError::upstream(error.message()));
        }
        if !response.is_success() {
            return Err(AnalysisError::upstream(format!(
                "provider returned status {}",
                response.status
            )));
        }

        let Some(result) = payload.chart.result.into_iter().flatten().next() else {
            return Err(AnalysisError::upstream("provider response has no result"));
        };

        let series = build_series(request, result)?;
        info!(
            symbol = %request.symbol,
            granularity = %request.granularity,
            rows = series.len(),
            "retrieved quotations"
        );
        Ok(series)
    }
}

impl QuoteSource for ChartQuoteSource {
    fn fetch<'a>(
        &'a self,
        request: &'a AnalysisRequest,
    ) -> Pin<Box<dyn Future<Output = Result<QuoteSeries, AnalysisError>> + Send + 'a>> {
        Box::pin(self.fetch_series(request))
    }
}

fn build_series(request: &AnalysisRequest, result: ChartResult) -> Result<QuoteSeries, AnalysisError> {
    let timestamps = result.timestamp.unwrap_or_default();
    if timestamps.is_empty() {
        // A window with no bars is a valid outcome, not an error.
        return Ok(QuoteSeries::empty(request.symbol, request.granularity));
    }

    let quote = result
        .indicators
        .quote
        .into_iter()
        .next()
        .ok_or_else(|| AnalysisError::upstream("provider response has no quote block"))?;
    let adjclose = result
        .indicators
        .adjclose
        .into_iter()
        .next()
        .map(|block| block.adjclose);

    let events = result.events.unwrap_or_default();
    let mut dropped = 0_usize;
    let mut bars = Vec::with_capacity(timestamps.len());

    for (index, &seconds) in timestamps.iter().enumerate() {
        let (open, high, low, close) = match (
            value_at(&quote.open, index),
            value_at(&quote.high, index),
            value_at(&quote.low, index),
            value_at(&quote.close, index),
        ) {
            (Some(o), Some(h), Some(l), Some(c)) => (o, h, l, c),
            _ => {
                dropped += 1;
                continue;
            }
        };
        let volume = value_at(&quote.volume, index).unwrap_or(0);

        let instant = UtcDateTime::from_unix_timestamp(seconds)?;
        let ts = if request.granularity.is_intraday() {
            BarTimestamp::DateTime(instant)
        } else {
            BarTimestamp::Date(instant.calendar_date())
        };

        let mut bar = PriceBar::new(ts, open, high, low, close, volume)?
            .with_extra("dividends", 0.0)
            .with_extra("splits", 0.0);
        if let Some(adj) = adjclose.as_ref().and_then(|values| value_at(values, index)) {
            bar = bar.with_extra("adj_close", adj);
        }
        if let Some(dividend) = events.dividends.get(&seconds.to_string()) {
            bar = bar.with_extra("dividends", dividend.amount);
        }
        if let Some(split) = events.splits.get(&seconds.to_string()) {
            if split.denominator != 0.0 {
                bar = bar.with_extra("splits", split.numerator / split.denominator);
            }
        }
        bars.push(bar);
    }

    if dropped > 0 {
        warn!(symbol = %request.symbol, dropped, "skipped bars with missing quote values");
    }

    Ok(QuoteSeries::from_bars(request.symbol, request.granularity, bars))
}

fn value_at<T: Copy>(values: &[Option<T>], index: usize) -> Option<T> {
    values.get(index).copied().flatten()
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartEnvelope,
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl ChartError {
    fn message(&self) -> String {
        match (&self.code, &self.description) {
            (Some(code), Some(description)) => format!("{code}: {description}"),
            (_, Some(description)) => description.clone(),
            (Some(code), None) => code.clone(),
            (None, None) => String::from("provider reported an unspecified error"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Option<Vec<i64>>,
    #[serde(default)]
    events: Option<ChartEvents>,
    indicators: ChartIndicators,
}

#[derive(Debug, Default, Deserialize)]
struct ChartEvents {
    #[serde(default)]
    dividends: BTreeMap<String, DividendEvent>,
    #[serde(default)]
    splits: BTreeMap<String, SplitEvent>,
}

#[derive(Debug, Deserialize)]
struct DividendEvent {
    amount: f64,
}

#[derive(Debug, Deserialize)]
struct SplitEvent {
    numerator: f64,
    denominator: f64,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<QuoteBlock>,
    #[serde(default)]
    adjclose: Vec<AdjCloseBlock>,
}

#[derive(Debug, Deserialize)]
struct QuoteBlock {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseBlock {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}
