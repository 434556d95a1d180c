//! Calendar-date left join of the intraday series onto the leveled daily
//! series, plus output-precision normalization.

use std::collections::BTreeMap;

use marketlens_core::serialize::finite;
use marketlens_core::{IsoDate, PriceBar};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::volatility::levels::LeveledBar;

/// Suffix applied to daily-side columns whose names collide with the
/// intraday series.
const DAILY_SUFFIX: &str = "_daily";

/// One output row: an intraday bar with the daily reference levels for its
/// calendar date, when one exists.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRow {
    pub bar: PriceBar,
    pub daily: Option<LeveledBar>,
    levels: u32,
}

/// Left join by calendar date: every intraday bar appears exactly once,
/// matched or not.
pub(crate) fn merge_by_calendar_date(
    intraday: Vec<PriceBar>,
    daily: Vec<LeveledBar>,
    levels: u32,
) -> Vec<MergedRow> {
    let by_date: BTreeMap<IsoDate, LeveledBar> = daily
        .into_iter()
        .map(|bar| (bar.ts.calendar_date(), bar))
        .collect();

    intraday
        .into_iter()
        .map(|bar| {
            let daily = by_date.get(&bar.ts.calendar_date()).cloned();
            MergedRow { bar, daily, levels }
        })
        .collect()
}

/// Round every numeric column to the maximum decimal-digit count observed in
/// the intraday close column, normalizing model-introduced floating-point
/// noise back to the source data's native precision.
pub(crate) fn round_to_close_precision(rows: &mut [MergedRow]) {
    let Some(decimals) = rows
        .iter()
        .map(|row| decimal_digits(row.bar.close))
        .max()
    else {
        return;
    };

    for row in rows.iter_mut() {
        let bar = &mut row.bar;
        for value in [&mut bar.open, &mut bar.high, &mut bar.low, &mut bar.close] {
            *value = round_to(*value, decimals);
        }
        for value in bar.extra.values_mut() {
            *value = round_to(*value, decimals);
        }
        if let Some(daily) = row.daily.as_mut() {
            for value in [
                &mut daily.open,
                &mut daily.high,
                &mut daily.low,
                &mut daily.close,
                &mut daily.volatility,
            ] {
                *value = round_to(*value, decimals);
            }
            for pair in daily.ladder.iter_mut() {
                pair.up = round_to(pair.up, decimals);
                pair.down = round_to(pair.down, decimals);
            }
        }
    }
}

/// Decimal digits of the shortest round-trip representation.
pub(crate) fn decimal_digits(value: f64) -> usize {
    if !value.is_finite() {
        return 0;
    }
    let repr = format!("{value}");
    match repr.split_once('.') {
        Some((_, fraction)) => fraction.len(),
        None => 0,
    }
}

pub(crate) fn round_to(value: f64, decimals: usize) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10_f64.powi(decimals as i32);
    (value * factor).round() / factor
}

impl Serialize for MergedRow {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(None)?;

        map.serialize_entry("ts", &self.bar.ts)?;
        map.serialize_entry("open", &finite(self.bar.open))?;
        map.serialize_entry("high", &finite(self.bar.high))?;
        map.serialize_entry("low", &finite(self.bar.low))?;
        map.serialize_entry("close", &finite(self.bar.close))?;
        map.serialize_entry("volume", &self.bar.volume)?;
        for (name, value) in &self.bar.extra {
            map.serialize_entry(name, &finite(*value))?;
        }

        let daily = self.daily.as_ref();
        map.serialize_entry("ts_daily", &daily.map(|d| d.ts))?;
        for (name, value) in [
            ("open", daily.map(|d| d.open)),
            ("high", daily.map(|d| d.high)),
            ("low", daily.map(|d| d.low)),
            ("close", daily.map(|d| d.close)),
        ] {
            map.serialize_entry(
                &format!("{name}{DAILY_SUFFIX}"),
                &value.and_then(finite),
            )?;
        }
        map.serialize_entry(&format!("volume{DAILY_SUFFIX}"), &daily.map(|d| d.volume))?;

        map.serialize_entry("volatility", &daily.and_then(|d| finite(d.volatility)))?;
        for k in 1..=self.levels {
            let pair = daily.and_then(|d| d.ladder.get(k as usize - 1));
            map.serialize_entry(
                &format!("volatility_level_{k}"),
                &pair.and_then(|p| finite(p.up)),
            )?;
            map.serialize_entry(
                &format!("volatility_level_-{k}"),
                &pair.and_then(|p| finite(p.down)),
            )?;
        }

        map.end()
    }
}
