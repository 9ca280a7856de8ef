//! Route colors
//!
//! A route without a manual color gets one from a fixed palette, picked by a
//! pure function of its date and the period bucketing mode. The same route
//! therefore keeps its color across render passes and restarts.

use crate::utils;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::UtcOffset;

/// Fixed route palette
pub const PALETTE: [&str; 12] = [
    "#2563eb", "#10b981", "#f59e0b", "#ef4444", "#8b5cf6", "#06b6d4", "#84cc16", "#ec4899",
    "#14b8a6", "#f97316", "#22c55e", "#3b82f6",
];

/// Period used to bucket routes by date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum PeriodKey {
    Week,
    #[default]
    Month,
    Year,
}

impl PeriodKey {
    pub const ALL: [PeriodKey; 3] = [PeriodKey::Week, PeriodKey::Month, PeriodKey::Year];

    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodKey::Week => "week",
            PeriodKey::Month => "month",
            PeriodKey::Year => "year",
        }
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Unknown period '{0}', expected week, month or year")]
pub struct ParsePeriodError(String);

impl FromStr for PeriodKey {
    type Err = ParsePeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "week" => Ok(PeriodKey::Week),
            "month" => Ok(PeriodKey::Month),
            "year" => Ok(PeriodKey::Year),
            other => Err(ParsePeriodError(other.to_string())),
        }
    }
}

/// Palette color for a date under the given period mode.
///
/// - `Week`: UTC day of week, Sunday = 0
/// - `Month`: UTC day of month minus one
/// - `Year`: UTC month index, January = 0
///
/// A missing or unparsable date maps to the first palette entry.
pub fn route_color(date: Option<&str>, period: PeriodKey) -> &'static str {
    let Some(t) = date.and_then(utils::parse_timestamp) else {
        return PALETTE[0];
    };
    let t = t.to_offset(UtcOffset::UTC);
    let index = match period {
        PeriodKey::Week => t.weekday().number_days_from_sunday() as usize,
        PeriodKey::Month => (t.day() as usize).saturating_sub(1),
        PeriodKey::Year => u8::from(t.month()) as usize - 1,
    };
    PALETTE[index % PALETTE.len()]
}

/// Manual override if set and non-empty, otherwise [`route_color`].
pub fn resolve_route_color(manual: Option<&str>, date: Option<&str>, period: PeriodKey) -> String {
    match manual.map(str::trim).filter(|c| !c.is_empty()) {
        Some(color) => color.to_string(),
        None => route_color(date, period).to_string(),
    }
}

/// Legend label for the `index`-th most recent period (0 = current).
pub fn period_label(period: PeriodKey, index: usize) -> String {
    let (current, previous, plural) = match period {
        PeriodKey::Week => ("This week", "Last week", "weeks"),
        PeriodKey::Month => ("This month", "Last month", "months"),
        PeriodKey::Year => ("This year", "Last year", "years"),
    };
    match index {
        0 => current.to_string(),
        1 => previous.to_string(),
        n => format!("{} {} ago", n, plural),
    }
}
