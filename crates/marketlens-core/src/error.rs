use thiserror::Error;

/// Typed outcome taxonomy shared by every marketlens pipeline.
///
/// Every failure crosses the core boundary as one of these values; the
/// calling layer decides the user-visible presentation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("symbol '{symbol}' is not part of the supported universe")]
    InvalidSymbol { symbol: String },

    #[error("date '{value}' is not a valid ISO calendar date (YYYY-MM-DD)")]
    InvalidDateFormat { value: String },

    #[error("invalid parameter: {reason}")]
    InvalidParameter { reason: String },

    #[error("insufficient data: {reason}")]
    InsufficientData { reason: String },

    #[error("model fit failed: {reason}")]
    ModelFitFailure { reason: String },

    #[error("volatility path of length {path_len} does not align with {row_count} reference rows")]
    MergeAlignmentFailure { path_len: usize, row_count: usize },

    #[error("upstream provider error: {message}")]
    UpstreamProviderError { message: String },
}

impl AnalysisError {
    pub fn invalid_parameter(reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            reason: reason.into(),
        }
    }

    pub fn insufficient_data(reason: impl Into<String>) -> Self {
        Self::InsufficientData {
            reason: reason.into(),
        }
    }

    pub fn model_fit(reason: impl Into<String>) -> Self {
        Self::ModelFitFailure {
            reason: reason.into(),
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::UpstreamProviderError {
            message: message.into(),
        }
    }

    /// Stable machine-readable code for transport-level mapping.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidSymbol { .. } => "analysis.invalid_symbol",
            Self::InvalidDateFormat { .. } => "analysis.invalid_date_format",
            Self::InvalidParameter { .. } => "analysis.invalid_parameter",
            Self::InsufficientData { .. } => "analysis.insufficient_data",
            Self::ModelFitFailure { .. } => "analysis.model_fit_failure",
            Self::MergeAlignmentFailure { .. } => "analysis.merge_alignment_failure",
            Self::UpstreamProviderError { .. } => "analysis.upstream_provider_error",
        }
    }

    /// Whether the caller should present this as a request problem (4xx)
    /// rather than a pipeline fault (5xx).
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidSymbol { .. }
                | Self::InvalidDateFormat { .. }
                | Self::InvalidParameter { .. }
        )
    }
}
