//! Behavioral contract of the quotation source: validation strictly before
//! any transport call, empty windows as success, provider faults as values.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use marketlens_core::{
    AnalysisError, AnalysisRequest, ChartQuoteSource, Granularity, HttpClient, HttpError,
    HttpRequest, HttpResponse, QuoteSource,
};

/// Transport double that counts external calls.
struct CountingTransport {
    body: String,
    status: u16,
    calls: Arc<AtomicUsize>,
}

impl CountingTransport {
    fn new(status: u16, body: impl Into<String>) -> (Arc<Self>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let transport = Arc::new(Self {
            body: body.into(),
            status,
            calls: Arc::clone(&calls),
        });
        (transport, calls)
    }
}

impl HttpClient for CountingTransport {
    fn execute<'a>(
        &'a self,
        _request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = HttpResponse {
            status: self.status,
            body: self.body.clone(),
        };
        Box::pin(async move { Ok(response) })
    }
}

const ONE_BAR_BODY: &str = r#"{
    "chart": {
        "result": [{
            "timestamp": [1704205800],
            "indicators": {"quote": [{
                "open": [187.15], "high": [188.44], "low": [183.89],
                "close": [185.64], "volume": [82488700]
            }]}
        }],
        "error": null
    }
}"#;

#[test]
fn invalid_symbol_fails_without_any_external_call() {
    let (_, calls) = CountingTransport::new(200, ONE_BAR_BODY);

    let err = AnalysisRequest::new("NFLX", "2024-01-02", "2024-01-05", Granularity::OneDay)
        .expect_err("symbol outside the universe must fail");

    assert!(matches!(err, AnalysisError::InvalidSymbol { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn malformed_date_fails_without_any_external_call() {
    let (_, calls) = CountingTransport::new(200, ONE_BAR_BODY);

    let err = AnalysisRequest::new("AAPL", "01/02/2024", "2024-01-05", Granularity::OneDay)
        .expect_err("non-ISO date must fail");

    assert!(matches!(err, AnalysisError::InvalidDateFormat { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn valid_request_issues_exactly_one_provider_call() {
    let (transport, calls) = CountingTransport::new(200, ONE_BAR_BODY);
    let source = ChartQuoteSource::new(transport);

    let request = AnalysisRequest::new("AAPL", "2024-01-02", "2024-01-05", Granularity::OneDay)
        .expect("valid request");
    let series = source.fetch(&request).await.expect("must fetch");

    assert_eq!(series.len(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn empty_window_is_a_valid_success() {
    let body = r#"{"chart":{"result":[{"indicators":{"quote":[{}]}}],"error":null}}"#;
    let (transport, _) = CountingTransport::new(200, body);
    let source = ChartQuoteSource::new(transport);

    let request = AnalysisRequest::new("MSFT", "2024-01-06", "2024-01-07", Granularity::OneDay)
        .expect("valid request");
    let series = source.fetch(&request).await.expect("empty window is success");

    assert!(series.is_empty());
}

#[tokio::test]
async fn provider_fault_surfaces_as_error_value_with_message() {
    let body = r#"{"chart":{"result":null,"error":{"code":"Unprocessable","description":"period out of range"}}}"#;
    let (transport, _) = CountingTransport::new(422, body);
    let source = ChartQuoteSource::new(transport);

    let request = AnalysisRequest::new("TSLA", "2024-01-02", "2024-01-05", Granularity::OneDay)
        .expect("valid request");
    let err = source.fetch(&request).await.expect_err("must surface fault");

    match err {
        AnalysisError::UpstreamProviderError { message } => {
            assert!(message.contains("period out of range"));
        }
        other => panic!("expected upstream provider error, got {other:?}"),
    }
}

#[tokio::test]
async fn transport_failure_never_escapes_as_a_panic() {
    struct FailingTransport;

    impl HttpClient for FailingTransport {
        fn execute<'a>(
            &'a self,
            _request: HttpRequest,
        ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
            Box::pin(async move { Err(HttpError::new("connection refused")) })
        }
    }

    let source = ChartQuoteSource::new(Arc::new(FailingTransport));
    let request = AnalysisRequest::new("AMZN", "2024-01-02", "2024-01-05", Granularity::OneDay)
        .expect("valid request");

    let err = source.fetch(&request).await.expect_err("must be an error value");
    assert!(matches!(err, AnalysisError::UpstreamProviderError { .. }));
    assert!(err.to_string().contains("connection refused"));
}
