//! Core contracts for marketlens.
//!
//! This crate contains:
//! - Canonical domain models and validation
//! - The typed analysis-error taxonomy
//! - The quotation source adapter and its HTTP transport seam

pub mod domain;
pub mod error;
pub mod quotes;
pub mod serialize;

pub use domain::{
    AnalysisRequest, ArchModelKind, BarTimestamp, DistributionKind, Granularity, IsoDate,
    PriceBar, QuoteSeries, TickerSymbol, UtcDateTime,
};
pub use error::AnalysisError;
pub use quotes::{
    ChartQuoteSource, HttpClient, HttpError, HttpRequest, HttpResponse, NoopHttpClient,
    QuoteSource, ReqwestHttpClient,
};
