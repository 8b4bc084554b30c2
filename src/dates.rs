//! Date-range completeness checks for the table index.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use tracing::debug;

use crate::error::PipelineError;
use crate::util::parse_date;

/// Interval of calendar days, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateBounds {
    Dates { start: NaiveDate, end: NaiveDate },
    /// January 1 of `start` through December 31 of `end`.
    Years { start: i32, end: i32 },
}

impl DateBounds {
    /// Parse `YYYY-MM-DD` bounds.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidDateBound`] when either bound is not a
    /// calendar date.
    pub fn from_date_strs(start: &str, end: &str) -> Result<Self, PipelineError> {
        let parse = |raw: &str| {
            parse_date(raw).ok_or_else(|| PipelineError::InvalidDateBound {
                raw: raw.to_string(),
            })
        };
        Ok(Self::Dates {
            start: parse(start)?,
            end: parse(end)?,
        })
    }

    /// Resolve to concrete first and last days.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidYear`] for a year chrono cannot
    /// represent and [`PipelineError::EndBeforeStart`] for a reversed range.
    pub fn resolve(&self) -> Result<(NaiveDate, NaiveDate), PipelineError> {
        let (start, end) = match *self {
            Self::Dates { start, end } => (start, end),
            Self::Years { start, end } => (
                NaiveDate::from_ymd_opt(start, 1, 1)
                    .ok_or(PipelineError::InvalidYear { year: start })?,
                NaiveDate::from_ymd_opt(end, 12, 31)
                    .ok_or(PipelineError::InvalidYear { year: end })?,
            ),
        };
        if end < start {
            return Err(PipelineError::EndBeforeStart { start, end });
        }
        Ok((start, end))
    }
}

/// How strictly an index must match the expected days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RangeMode {
    /// Same length, same order, same days, compared position by position.
    #[default]
    Exact,
    /// At least one day in common with the expected range.
    Overlap,
}

impl FromStr for RangeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exact" => Ok(Self::Exact),
            "overlap" => Ok(Self::Overlap),
            other => Err(format!("unknown range mode '{other}'; use exact or overlap")),
        }
    }
}

impl fmt::Display for RangeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Exact => "exact",
            Self::Overlap => "overlap",
        })
    }
}

/// Every calendar day covered by `bounds`, in order.
pub fn expected_days(bounds: DateBounds) -> Result<Vec<NaiveDate>, PipelineError> {
    let (start, end) = bounds.resolve()?;
    Ok(start.iter_days().take_while(|d| *d <= end).collect())
}

/// Check `dates` against the days of `bounds` under `mode`.
///
/// # Errors
///
/// Besides the errors of [`DateBounds::resolve`], [`RangeMode::Exact`] returns
/// [`PipelineError::LengthMismatch`] when `dates` and the expected range differ
/// in length.
pub fn validate_date_range(
    dates: &[NaiveDate],
    bounds: DateBounds,
    mode: RangeMode,
) -> Result<bool, PipelineError> {
    let expected = expected_days(bounds)?;
    let ok = match mode {
        RangeMode::Exact => {
            if dates.len() != expected.len() {
                return Err(PipelineError::LengthMismatch {
                    expected: expected.len(),
                    got: dates.len(),
                });
            }
            dates.iter().zip(&expected).all(|(a, b)| a == b)
        }
        RangeMode::Overlap => {
            let expected: HashSet<&NaiveDate> = expected.iter().collect();
            dates.iter().any(|d| expected.contains(d))
        }
    };
    debug!(%mode, n = dates.len(), ok, "date range checked");
    Ok(ok)
}
