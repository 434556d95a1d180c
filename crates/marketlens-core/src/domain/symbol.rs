use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::AnalysisError;

/// Fixed universe of supported ticker symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TickerSymbol {
    #[serde(rename = "AAPL")]
    Aapl,
    #[serde(rename = "MSFT")]
    Msft,
    #[serde(rename = "GOOGL")]
    Googl,
    #[serde(rename = "AMZN")]
    Amzn,
    #[serde(rename = "TSLA")]
    Tsla,
}

impl TickerSymbol {
    pub const ALL: [Self; 5] = [Self::Aapl, Self::Msft, Self::Googl, Self::Amzn, Self::Tsla];

    /// Provider ticker code.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Aapl => "AAPL",
            Self::Msft => "MSFT",
            Self::Googl => "GOOGL",
            Self::Amzn => "AMZN",
            Self::Tsla => "TSLA",
        }
    }
}

impl Display for TickerSymbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TickerSymbol {
    type Err = AnalysisError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|symbol| symbol.as_str() == normalized)
            .ok_or(AnalysisError::InvalidSymbol {
                symbol: value.to_owned(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_normalizes() {
        let parsed = TickerSymbol::from_str(" aapl ").expect("must parse");
        assert_eq!(parsed, TickerSymbol::Aapl);
        assert_eq!(parsed.as_str(), "AAPL");
    }

    #[test]
    fn rejects_symbol_outside_universe() {
        let err = TickerSymbol::from_str("NFLX").expect_err("must fail");
        assert!(matches!(err, AnalysisError::InvalidSymbol { .. }));
    }
}
