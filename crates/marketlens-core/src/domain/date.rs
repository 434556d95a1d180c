use std::fmt::{Display, Formatter};

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::format_description::well_known::Rfc3339;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};

use crate::AnalysisError;

const ISO_DATE: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Calendar date parsed strictly from the `YYYY-MM-DD` wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IsoDate(Date);

impl IsoDate {
    pub fn parse(input: &str) -> Result<Self, AnalysisError> {
        Date::parse(input.trim(), ISO_DATE)
            .map(Self)
            .map_err(|_| AnalysisError::InvalidDateFormat {
                value: input.to_owned(),
            })
    }

    pub const fn from_date(date: Date) -> Self {
        Self(date)
    }

    pub const fn into_date(self) -> Date {
        self.0
    }

    /// Unix timestamp of this date's midnight, UTC.
    pub fn unix_midnight(self) -> i64 {
        PrimitiveDateTime::new(self.0, Time::MIDNIGHT)
            .assume_utc()
            .unix_timestamp()
    }

    pub fn format_iso(self) -> String {
        self.0
            .format(ISO_DATE)
            .unwrap_or_else(|_| String::from("<unformattable>"))
    }
}

impl Display for IsoDate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format_iso())
    }
}

impl Serialize for IsoDate {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.format_iso())
    }
}

impl<'de> Deserialize<'de> for IsoDate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(D::Error::custom)
    }
}

/// RFC3339 timestamp guaranteed to be UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UtcDateTime(OffsetDateTime);

impl UtcDateTime {
    pub fn from_unix_timestamp(seconds: i64) -> Result<Self, AnalysisError> {
        OffsetDateTime::from_unix_timestamp(seconds)
            .map(Self)
            .map_err(|_| {
                AnalysisError::upstream(format!("provider timestamp {seconds} is out of range"))
            })
    }

    pub const fn into_inner(self) -> OffsetDateTime {
        self.0
    }

    pub fn calendar_date(self) -> IsoDate {
        IsoDate(self.0.date())
    }

    pub fn format_rfc3339(self) -> String {
        self.0
            .format(&Rfc3339)
            .unwrap_or_else(|_| String::from("<unformattable>"))
    }
}

impl Display for UtcDateTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format_rfc3339())
    }
}

impl Serialize for UtcDateTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.format_rfc3339())
    }
}

/// Bar timestamp: a plain calendar date for daily/monthly cadences, a UTC
/// datetime for intraday ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BarTimestamp {
    Date(IsoDate),
    DateTime(UtcDateTime),
}

impl BarTimestamp {
    /// Calendar date used for cross-cadence joins.
    pub fn calendar_date(self) -> IsoDate {
        match self {
            Self::Date(date) => date,
            Self::DateTime(ts) => ts.calendar_date(),
        }
    }

    fn sort_key(self) -> OffsetDateTime {
        match self {
            Self::Date(date) => {
                PrimitiveDateTime::new(date.into_date(), Time::MIDNIGHT).assume_utc()
            }
            Self::DateTime(ts) => ts.into_inner(),
        }
    }
}

impl PartialOrd for BarTimestamp {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BarTimestamp {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl Display for BarTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Date(date) => Display::fmt(date, f),
            Self::DateTime(ts) => Display::fmt(ts, f),
        }
    }
}

impl Serialize for BarTimestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Date(date) => date.serialize(serializer),
            Self::DateTime(ts) => ts.serialize(serializer),
        }
    }
}
