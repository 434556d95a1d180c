use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::{BarTimestamp, Granularity, TickerSymbol};
use crate::AnalysisError;

/// Single OHLCV observation as returned by the provider.
///
/// `extra` carries provider-specific metadata columns (dividends, splits)
/// through unmodified; pipelines only read the OHLCV fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceBar {
    pub ts: BarTimestamp,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, f64>,
}

impl PriceBar {
    pub fn new(
        ts: BarTimestamp,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: u64,
    ) -> Result<Self, AnalysisError> {
        for (field, value) in [("open", open), ("high", high), ("low", low), ("close", close)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(AnalysisError::upstream(format!(
                    "bar at {ts} has non-positive {field} {value}"
                )));
            }
        }
        if high < low {
            return Err(AnalysisError::upstream(format!(
                "bar at {ts} has high {high} below low {low}"
            )));
        }

        Ok(Self {
            ts,
            open,
            high,
            low,
            close,
            volume,
            extra: BTreeMap::new(),
        })
    }

    pub fn with_extra(mut self, name: impl Into<String>, value: f64) -> Self {
        self.extra.insert(name.into(), value);
        self
    }
}

/// Ordered OHLCV series for one (symbol, granularity) fetch.
///
/// Bars ascend by timestamp and timestamps are unique. An empty series is a
/// valid outcome (the provider found no bars in the window), distinct from
/// any validation failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuoteSeries {
    pub symbol: TickerSymbol,
    pub granularity: Granularity,
    bars: Vec<PriceBar>,
}

impl QuoteSeries {
    pub fn empty(symbol: TickerSymbol, granularity: Granularity) -> Self {
        Self {
            symbol,
            granularity,
            bars: Vec::new(),
        }
    }

    /// Build a series, restoring the ordering invariant if the provider
    /// returned bars out of order or with duplicate timestamps (last wins).
    pub fn from_bars(
        symbol: TickerSymbol,
        granularity: Granularity,
        mut bars: Vec<PriceBar>,
    ) -> Self {
        let sorted = bars.windows(2).all(|pair| pair[0].ts < pair[1].ts);
        if !sorted {
            tracing::warn!(%symbol, %granularity, "provider bars out of order; normalizing");
            bars.sort_by_key(|bar| bar.ts);
            bars.dedup_by_key(|bar| bar.ts);
        }
        Self {
            symbol,
            granularity,
            bars,
        }
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn into_bars(self) -> Vec<PriceBar> {
        self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::IsoDate;

    fn bar(date: &str, close: f64) -> PriceBar {
        let ts = BarTimestamp::Date(IsoDate::parse(date).expect("date"));
        PriceBar::new(ts, close, close + 1.0, close - 1.0, close, 1_000).expect("bar")
    }

    #[test]
    fn rejects_inverted_range() {
        let ts = BarTimestamp::Date(IsoDate::parse("2024-01-02").expect("date"));
        let err = PriceBar::new(ts, 10.0, 9.0, 11.0, 10.0, 0).expect_err("must fail");
        assert!(matches!(err, AnalysisError::UpstreamProviderError { .. }));
    }

    #[test]
    fn normalizes_out_of_order_bars() {
        let series = QuoteSeries::from_bars(
            TickerSymbol::Aapl,
            Granularity::OneDay,
            vec![bar("2024-01-03", 11.0), bar("2024-01-02", 10.0)],
        );
        assert_eq!(series.len(), 2);
        assert!(series.bars()[0].ts < series.bars()[1].ts);
    }

    #[test]
    fn empty_series_is_valid() {
        let series = QuoteSeries::empty(TickerSymbol::Msft, Granularity::FifteenMinutes);
        assert!(series.is_empty());
    }
}
