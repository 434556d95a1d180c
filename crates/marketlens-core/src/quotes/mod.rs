//! Quotation retrieval: the shared component both analytical pipelines
//! consume.

mod chart;
mod http;

use std::future::Future;
use std::pin::Pin;

use crate::domain::{AnalysisRequest, QuoteSeries};
use crate::AnalysisError;

pub use chart::ChartQuoteSource;
pub use http::{HttpClient, HttpError, HttpRequest, HttpResponse, NoopHttpClient, ReqwestHttpClient};

/// Source of historical OHLCV series.
///
/// Object-safe so pipelines can be exercised against deterministic doubles;
/// the production implementation is [`ChartQuoteSource`].
pub trait QuoteSource: Send + Sync {
    fn fetch<'a>(
        &'a self,
        request: &'a AnalysisRequest,
    ) -> Pin<Box<dyn Future<Output = Result<QuoteSeries, AnalysisError>> + Send + 'a>>;
}
