use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::{Granularity, IsoDate, TickerSymbol};
use crate::AnalysisError;

/// Validated analysis request: one symbol, an inclusive date range, and a
/// sampling granularity.
///
/// Construction is the validation boundary; a value of this type always
/// satisfies the symbol/date/range invariants. Cadence overrides produce a
/// new derived value and leave the original untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub symbol: TickerSymbol,
    pub start_date: IsoDate,
    pub end_date: IsoDate,
    pub granularity: Granularity,
}

impl AnalysisRequest {
    /// Validate raw string inputs into a request. Symbol-universe membership
    /// and ISO date checks run here, before anything can reach the network.
    pub fn new(
        symbol: &str,
        start_date: &str,
        end_date: &str,
        granularity: Granularity,
    ) -> Result<Self, AnalysisError> {
        let symbol = TickerSymbol::from_str(symbol)?;
        let start_date = IsoDate::parse(start_date)?;
        let end_date = IsoDate::parse(end_date)?;
        Self::from_parts(symbol, start_date, end_date, granularity)
    }

    pub fn from_parts(
        symbol: TickerSymbol,
        start_date: IsoDate,
        end_date: IsoDate,
        granularity: Granularity,
    ) -> Result<Self, AnalysisError> {
        if start_date > end_date {
            return Err(AnalysisError::invalid_parameter(format!(
                "start date {start_date} is after end date {end_date}"
            )));
        }
        Ok(Self {
            symbol,
            start_date,
            end_date,
            granularity,
        })
    }

    /// Derived request at a different granularity.
    pub fn with_granularity(&self, granularity: Granularity) -> Self {
        Self {
            granularity,
            ..*self
        }
    }

    /// Derived request with the window opened at an earlier start date.
    /// Keeps the original start when it already reaches further back.
    pub fn with_start_date(&self, start_date: IsoDate) -> Self {
        Self {
            start_date: start_date.min(self.start_date),
            ..*self
        }
    }
}
