use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::AnalysisError;

/// Sampling interval of a price series, mapped to the provider's interval code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Granularity {
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1mo")]
    OneMonth,
}

impl Granularity {
    pub const ALL: [Self; 3] = [Self::OneDay, Self::FifteenMinutes, Self::OneMonth];

    /// Provider interval code for the time-series endpoint.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OneDay => "1d",
            Self::FifteenMinutes => "15m",
            Self::OneMonth => "1mo",
        }
    }

    /// Whether bars at this granularity carry an intraday time component.
    pub const fn is_intraday(self) -> bool {
        matches!(self, Self::FifteenMinutes)
    }
}

impl Display for Granularity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = AnalysisError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "1d" => Ok(Self::OneDay),
            "15m" => Ok(Self::FifteenMinutes),
            "1mo" => Ok(Self::OneMonth),
            other => Err(AnalysisError::invalid_parameter(format!(
                "granularity '{other}' is not one of 1d, 15m, 1mo"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_interval_code() {
        assert_eq!(
            Granularity::from_str("15M").expect("must parse"),
            Granularity::FifteenMinutes
        );
    }

    #[test]
    fn rejects_unknown_code() {
        let err = Granularity::from_str("2h").expect_err("must fail");
        assert!(matches!(err, AnalysisError::InvalidParameter { .. }));
    }
}
