//! Rebalance calendar: which trading dates the basket is re-picked on.
//!
//! The date range is cut into calendar months or quarters. Each period
//! contributes one anchor date (its first calendar day, or its last with
//! `PeriodEnd`), which is resolved to the last trading date at or before the
//! anchor. Anchors with no earlier trading date are dropped, and two anchors
//! resolving to the same trading date yield one rebalance.

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceFrequency {
    #[default]
    Monthly,
    Quarterly,
}

impl RebalanceFrequency {
    /// First calendar day of the period containing `date`.
    pub fn period_start(self, date: NaiveDate) -> Option<NaiveDate> {
        match self {
            RebalanceFrequency::Monthly => date.with_day(1),
            RebalanceFrequency::Quarterly => {
                let month = (date.month0() / 3) * 3 + 1;
                NaiveDate::from_ymd_opt(date.year(), month, 1)
            }
        }
    }

    fn step(self) -> Months {
        match self {
            RebalanceFrequency::Monthly => Months::new(1),
            RebalanceFrequency::Quarterly => Months::new(3),
        }
    }
}

impl fmt::Display for RebalanceFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebalanceFrequency::Monthly => write!(f, "monthly"),
            RebalanceFrequency::Quarterly => write!(f, "quarterly"),
        }
    }
}

impl FromStr for RebalanceFrequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "monthly" | "month" | "m" => Ok(RebalanceFrequency::Monthly),
            "quarterly" | "quarter" | "q" => Ok(RebalanceFrequency::Quarterly),
            other => Err(format!(
                "unknown rebalance frequency '{other}' (expected monthly or quarterly)"
            )),
        }
    }
}

/// Which calendar day of each period is resolved to a trading date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceAnchor {
    /// First calendar day of the period.
    #[default]
    PeriodStart,
    /// Last calendar day of the period.
    PeriodEnd,
}

impl FromStr for RebalanceAnchor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "period_start" | "start" => Ok(RebalanceAnchor::PeriodStart),
            "period_end" | "end" => Ok(RebalanceAnchor::PeriodEnd),
            other => Err(format!(
                "unknown rebalance anchor '{other}' (expected period_start or period_end)"
            )),
        }
    }
}

/// Last date in `dates` (sorted ascending) that is `<= target`.
pub fn resolve_at_or_before(dates: &[NaiveDate], target: NaiveDate) -> Option<NaiveDate> {
    let idx = dates.partition_point(|d| *d <= target).checked_sub(1)?;
    Some(dates[idx])
}

/// Distinct, ascending rebalance dates, each present in `dates`.
pub fn rebalance_dates(
    dates: &[NaiveDate],
    frequency: RebalanceFrequency,
    anchor: RebalanceAnchor,
) -> Vec<NaiveDate> {
    let (Some(first), Some(last)) = (dates.first(), dates.last()) else {
        return Vec::new();
    };
    let (Some(mut period), Some(last_period)) =
        (frequency.period_start(*first), frequency.period_start(*last))
    else {
        return Vec::new();
    };

    let mut resolved: Vec<NaiveDate> = Vec::new();
    while period <= last_period {
        let Some(next_period) = period.checked_add_months(frequency.step()) else {
            break;
        };
        let anchor_date = match anchor {
            RebalanceAnchor::PeriodStart => Some(period),
            RebalanceAnchor::PeriodEnd => next_period.checked_sub_days(Days::new(1)),
        };

        match anchor_date.and_then(|a| resolve_at_or_before(dates, a)) {
            Some(d) if resolved.last() != Some(&d) => resolved.push(d),
            Some(_) => {}
            None => debug!(%period, "no trading date at or before anchor, skipping"),
        }
        period = next_period;
    }
    resolved
}
