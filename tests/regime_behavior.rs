//! End-to-end behavior of the regime detector against a scripted quotation
//! source: canonical label ordering, determinism, warm-up accounting, and
//! fail-fast validation.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use marketlens_analytics::{RegimeDetector, RegimeRow};
use marketlens_core::{
    AnalysisError, AnalysisRequest, BarTimestamp, Granularity, IsoDate, PriceBar, QuoteSeries,
    QuoteSource, TickerSymbol,
};
use time::Duration;

struct ScriptedSource {
    series: Result<QuoteSeries, AnalysisError>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedSource {
    fn new(series: Result<QuoteSeries, AnalysisError>) -> Self {
        Self {
            series,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl QuoteSource for ScriptedSource {
    fn fetch<'a>(
        &'a self,
        _request: &'a AnalysisRequest,
    ) -> Pin<Box<dyn Future<Output = Result<QuoteSeries, AnalysisError>> + Send + 'a>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = self.series.clone();
        Box::pin(async move { result })
    }
}

fn tokio_block_on<F: Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
        .block_on(future)
}

/// Daily bars alternating between calm and turbulent stretches of 60 bars.
fn regime_shift_series(n: usize) -> QuoteSeries {
    let start = IsoDate::parse("2023-01-02").expect("date").into_date();
    let mut close = 100.0_f64;
    let bars = (0..n)
        .map(|i| {
            let turbulent = (i / 60) % 2 == 1;
            let amplitude = if turbulent { 4.0 } else { 0.4 };
            let swing = amplitude * ((i as f64) * 1.3).sin();
            let open = close;
            close = (close + swing).max(5.0);
            let high = open.max(close) + amplitude * 0.4;
            let low = (open.min(close) - amplitude * 0.4).max(1.0);
            let volume = if turbulent { 20_000 } else { 6_000 };
            let ts = BarTimestamp::Date(IsoDate::from_date(start + Duration::days(i as i64)));
            PriceBar::new(ts, open, high, low, close, volume).expect("bar")
        })
        .collect();
    QuoteSeries::from_bars(TickerSymbol::Aapl, Granularity::OneDay, bars)
}

fn daily_request() -> AnalysisRequest {
    AnalysisRequest::new("AAPL", "2023-01-02", "2023-10-31", Granularity::OneDay)
        .expect("valid request")
}

fn detect(n_bars: usize, n_regimes: usize) -> Result<Vec<RegimeRow>, AnalysisError> {
    let source = ScriptedSource::new(Ok(regime_shift_series(n_bars)));
    let detector = RegimeDetector::new(source);
    tokio_block_on(detector.detect(daily_request(), n_regimes))
}

#[test]
fn one_row_per_surviving_feature_row() {
    let rows = detect(240, 2).expect("detection succeeds");
    // The 63-bar return window drops the first 63 bars.
    assert_eq!(rows.len(), 240 - 63);
}

#[test]
fn canonical_regimes_are_ordered_by_mean_volatility() {
    let rows = detect(240, 2).expect("detection succeeds");

    let mean_volatility = |regime: usize| {
        let selected: Vec<&RegimeRow> = rows.iter().filter(|r| r.regime == regime).collect();
        assert!(!selected.is_empty(), "regime {regime} never assigned");
        selected.iter().map(|r| r.features.volatility_21).sum::<f64>() / selected.len() as f64
    };

    assert!(mean_volatility(0) < mean_volatility(1));
}

#[test]
fn canonical_labels_stay_in_range_and_raw_labels_are_retained() {
    let n_regimes = 3;
    let rows = detect(300, n_regimes).expect("detection succeeds");
    for row in &rows {
        assert!(row.regime < n_regimes);
        assert!(row.regime_raw < n_regimes);
    }
}

#[test]
fn detection_is_deterministic_across_runs() {
    let first = detect(240, 2).expect("detection succeeds");
    let second = detect(240, 2).expect("detection succeeds");
    assert_eq!(first, second);
}

#[test]
fn regime_count_below_two_fails_before_any_fetch() {
    let source = ScriptedSource::new(Ok(regime_shift_series(240)));
    let calls = source.call_counter();
    let detector = RegimeDetector::new(source);

    let err = tokio_block_on(detector.detect(daily_request(), 1)).expect_err("must fail");
    assert!(matches!(err, AnalysisError::InvalidParameter { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn empty_series_short_circuits_as_insufficient_data() {
    let empty = QuoteSeries::empty(TickerSymbol::Aapl, Granularity::OneDay);
    let source = ScriptedSource::new(Ok(empty));
    let detector = RegimeDetector::new(source);

    let err = tokio_block_on(detector.detect(daily_request(), 2)).expect_err("must fail");
    assert!(matches!(err, AnalysisError::InsufficientData { .. }));
}

#[test]
fn warmup_eats_short_series_into_insufficient_data() {
    let err = detect(50, 2).expect_err("50 bars cannot complete the warm-up");
    assert!(matches!(err, AnalysisError::InsufficientData { .. }));
}

#[test]
fn provider_error_propagates_unchanged() {
    let upstream = AnalysisError::upstream("provider unavailable");
    let source = ScriptedSource::new(Err(upstream.clone()));
    let detector = RegimeDetector::new(source);

    let err = tokio_block_on(detector.detect(daily_request(), 2)).expect_err("must propagate");
    assert_eq!(err, upstream);
}

#[test]
fn serialized_rows_expose_both_label_fields() {
    let rows = detect(240, 2).expect("detection succeeds");
    let value = serde_json::to_value(&rows[0]).expect("serializable");

    assert!(value.get("regime").is_some());
    assert!(value.get("regime_raw").is_some());
    assert!(value.get("volatility_21").is_some());
    assert!(value.get("ts").is_some());
}
