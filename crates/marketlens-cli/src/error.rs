use thiserror::Error;

use marketlens_core::AnalysisError;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Analysis(error) => match error {
                AnalysisError::InvalidSymbol { .. }
                | AnalysisError::InvalidDateFormat { .. }
                | AnalysisError::InvalidParameter { .. } => 2,
                AnalysisError::InsufficientData { .. } => 3,
                AnalysisError::ModelFitFailure { .. } => 4,
                AnalysisError::UpstreamProviderError { .. } => 5,
                AnalysisError::MergeAlignmentFailure { .. } => 6,
            },
            Self::Serialization(_) => 6,
            Self::Io(_) => 10,
        }
    }
}
