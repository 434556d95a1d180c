use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::AnalysisError;

/// Conditional-variance model family for the level estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ArchModelKind {
    Garch,
    Egarch,
    Figarch,
}

impl ArchModelKind {
    pub const ALL: [Self; 3] = [Self::Garch, Self::Egarch, Self::Figarch];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Garch => "GARCH",
            Self::Egarch => "EGARCH",
            Self::Figarch => "FIGARCH",
        }
    }
}

impl Display for ArchModelKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArchModelKind {
    type Err = AnalysisError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "GARCH" => Ok(Self::Garch),
            "EGARCH" => Ok(Self::Egarch),
            "FIGARCH" => Ok(Self::Figarch),
            other => Err(AnalysisError::invalid_parameter(format!(
                "model '{other}' is not one of GARCH, EGARCH, FIGARCH"
            ))),
        }
    }
}

/// Residual distribution family used by a variance-model fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistributionKind {
    Normal,
    #[serde(rename = "studentst")]
    StudentsT,
    Ged,
}

impl DistributionKind {
    pub const ALL: [Self; 3] = [Self::Normal, Self::StudentsT, Self::Ged];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::StudentsT => "studentst",
            Self::Ged => "ged",
        }
    }
}

impl Display for DistributionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistributionKind {
    type Err = AnalysisError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "normal" | "gaussian" => Ok(Self::Normal),
            "t" | "studentst" => Ok(Self::StudentsT),
            "ged" => Ok(Self::Ged),
            other => Err(AnalysisError::invalid_parameter(format!(
                "distribution '{other}' is not one of normal, studentst, ged"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_model_kind() {
        assert_eq!(
            ArchModelKind::from_str("egarch").expect("must parse"),
            ArchModelKind::Egarch
        );
    }

    #[test]
    fn parses_distribution_aliases() {
        assert_eq!(
            DistributionKind::from_str("t").expect("must parse"),
            DistributionKind::StudentsT
        );
        assert_eq!(
            DistributionKind::from_str("gaussian").expect("must parse"),
            DistributionKind::Normal
        );
    }
}
