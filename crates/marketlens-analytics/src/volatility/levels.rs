//! Level-ladder construction over the daily reference series.

use marketlens_core::{AnalysisError, BarTimestamp, PriceBar};

/// Symmetric price band at one volatility multiple.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelPair {
    pub up: f64,
    pub down: f64,
}

/// Daily reference bar annotated with its conditional volatility and the
/// symmetric level ladder derived from it.
///
/// A pipeline-local copy: the fetched series is never mutated. The daily side
/// keeps only OHLCV — provider metadata stays on the intraday series.
#[derive(Debug, Clone, PartialEq)]
pub struct LeveledBar {
    pub ts: BarTimestamp,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub volatility: f64,
    pub ladder: Vec<LevelPair>,
}

/// Attach the aligned volatility path and build the ladder.
///
/// `volatility` must align one-to-one with `bars`; anything else is an
/// internal invariant violation, not a user error. The chronologically last
/// bar is still open, so its ladder anchors on `open` rather than the
/// not-yet-settled `close`.
pub(crate) fn attach_levels(
    bars: &[PriceBar],
    volatility: &[f64],
    levels: u32,
) -> Result<Vec<LeveledBar>, AnalysisError> {
    if volatility.len() != bars.len() {
        return Err(AnalysisError::MergeAlignmentFailure {
            path_len: volatility.len(),
            row_count: bars.len(),
        });
    }

    let last = bars.len().saturating_sub(1);
    let leveled = bars
        .iter()
        .zip(volatility.iter())
        .enumerate()
        .map(|(index, (bar, vol))| {
            let anchor = if index == last { bar.open } else { bar.close };
            let ladder = (1..=levels)
                .map(|k| {
                    let offset = k as f64 * vol;
                    LevelPair {
                        up: anchor * (1.0 + offset),
                        down: anchor * (1.0 - offset),
                    }
                })
                .collect();
            LeveledBar {
                ts: bar.ts,
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
                volatility: *vol,
                ladder,
            }
        })
        .collect();

    Ok(leveled)
}
