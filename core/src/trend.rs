//! Trend analysis: per-period dormancy transitions over a date range.
//!
//! Each period `[start, end)` is evaluated "as of" its end: only orders
//! strictly before `end` exist. With threshold T:
//!   - new dormant:  last order before `end` lies in `[start − T, end − T)`
//!   - reactivated:  an order in `[start, end)` whose predecessor predates `start − T`
//!   - total dormant: last order before `end` predates `end − T`
//!
//! RULE: T is read once per call and passed in. A configuration change
//! mid-range never splits one series across two thresholds.

use crate::{
    customer::CustomerTimeline,
    error::{AnalyticsError, AnalyticsResult},
    segmentation::ratio,
};
use chrono::{DateTime, Datelike, Duration, Months, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

// ── Granularity ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Granularity {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
}

impl Granularity {
    pub const ALL: [Granularity; 4] = [Self::Daily, Self::Weekly, Self::Monthly, Self::Quarterly];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily     => "daily",
            Self::Weekly    => "weekly",
            Self::Monthly   => "monthly",
            Self::Quarterly => "quarterly",
        }
    }

    /// One step forward from `from`. Month steps are calendar months,
    /// clamped to the last day of shorter months.
    pub fn advance(&self, from: DateTime<Utc>) -> AnalyticsResult<DateTime<Utc>> {
        let next = match self {
            Self::Daily     => from.checked_add_signed(Duration::days(1)),
            Self::Weekly    => from.checked_add_signed(Duration::days(7)),
            Self::Monthly   => from.checked_add_months(Months::new(1)),
            Self::Quarterly => from.checked_add_months(Months::new(3)),
        };
        next.ok_or_else(|| {
            AnalyticsError::invalid("end", format!("date overflow stepping {} from {from}", self.as_str()))
        })
    }

    pub fn label(&self, period_start: DateTime<Utc>) -> String {
        match self {
            Self::Daily     => period_start.format("%Y-%m-%d").to_string(),
            Self::Weekly    => format!("Week of {}", period_start.format("%Y-%m-%d")),
            Self::Monthly   => period_start.format("%Y-%m").to_string(),
            Self::Quarterly => {
                format!("{} Q{}", period_start.year(), (period_start.month() - 1) / 3 + 1)
            }
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|g| g.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                AnalyticsError::invalid(
                    "granularity",
                    format!("unknown granularity '{s}', expected daily|weekly|monthly|quarterly"),
                )
            })
    }
}

// ── Periods ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    pub start: DateTime<Utc>,
    pub end:   DateTime<Utc>,
}

/// Period starts from `start`, stepping while the next start is ≤ `end`.
/// The last period may end after `end`.
pub fn generate_periods(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    granularity: Granularity,
) -> AnalyticsResult<Vec<Period>> {
    if start > end {
        return Err(AnalyticsError::invalid(
            "start",
            format!("start {start} is after end {end}"),
        ));
    }

    let mut periods = Vec::new();
    let mut current = start;
    while current <= end {
        let next = granularity.advance(current)?;
        periods.push(Period { start: current, end: next });
        current = next;
    }
    log::debug!(
        "trend: generated {} {} periods from {start} to {end}",
        periods.len(),
        granularity
    );
    Ok(periods)
}

// ── Public types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub period_date:         DateTime<Utc>,
    pub period_end:          DateTime<Utc>,
    pub period_label:        String,
    pub new_dormant_count:   usize,
    pub reactivated_count:   usize,
    pub total_dormant_count: usize,
    pub dormant_rate:        f64,
    pub reactivation_rate:   f64,
}

// ── Analysis ─────────────────────────────────────────────────────────────────

fn evaluate_period(
    timelines: &[CustomerTimeline],
    period: Period,
    threshold: Duration,
    granularity: Granularity,
) -> TrendPoint {
    let new_from     = period.start - threshold;
    let dormant_edge = period.end - threshold;

    let mut with_orders   = 0usize;
    let mut new_dormant   = 0usize;
    let mut total_dormant = 0usize;
    let mut reactivated   = 0usize;

    for tl in timelines {
        let Some(last) = tl.last_before(period.end) else { continue };
        with_orders += 1;

        if last < dormant_edge {
            total_dormant += 1;
            if last >= new_from {
                new_dormant += 1;
            }
        }

        let came_back = tl
            .orders_in(period.start, period.end)
            .any(|(prev, _)| matches!(prev, Some(p) if p < new_from));
        if came_back {
            reactivated += 1;
        }
    }

    TrendPoint {
        period_date:         period.start,
        period_end:          period.end,
        period_label:        granularity.label(period.start),
        new_dormant_count:   new_dormant,
        reactivated_count:   reactivated,
        total_dormant_count: total_dormant,
        dormant_rate:        ratio(total_dormant as f64 * 100.0, with_orders as f64),
        reactivation_rate:   ratio(reactivated as f64 * 100.0, total_dormant as f64),
    }
}

/// One `TrendPoint` per generated period, in chronological order.
pub fn analyze(
    timelines: &[CustomerTimeline],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    granularity: Granularity,
    dormancy_threshold_days: i64,
) -> AnalyticsResult<Vec<TrendPoint>> {
    let periods = generate_periods(start, end, granularity)?;
    let threshold = Duration::days(dormancy_threshold_days);
    Ok(periods
        .par_iter()
        .map(|p| evaluate_period(timelines, *p, threshold, granularity))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn month_aligned_year_yields_twelve_periods() {
        let periods = generate_periods(day(2024, 1, 1), day(2024, 12, 31), Granularity::Monthly).unwrap();
        assert_eq!(periods.len(), 12);
        assert_eq!(periods[11].start, day(2024, 12, 1));
        assert_eq!(periods[11].end, day(2025, 1, 1));
    }

    #[test]
    fn periods_are_contiguous() {
        let periods = generate_periods(day(2024, 1, 31), day(2024, 6, 30), Granularity::Monthly).unwrap();
        for pair in periods.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        // Month-end clamping carries forward from the previous start.
        assert_eq!(periods[1].start, day(2024, 2, 29));
    }

    #[test]
    fn single_day_range_has_one_period() {
        let periods = generate_periods(day(2024, 3, 1), day(2024, 3, 1), Granularity::Weekly).unwrap();
        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].end, day(2024, 3, 8));
    }

    #[test]
    fn inverted_range_is_rejected() {
        let err = generate_periods(day(2024, 3, 2), day(2024, 3, 1), Granularity::Daily).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn granularity_parses_case_insensitively() {
        assert_eq!("Monthly".parse::<Granularity>().unwrap(), Granularity::Monthly);
        assert_eq!(" weekly ".parse::<Granularity>().unwrap(), Granularity::Weekly);
        assert!("fortnightly".parse::<Granularity>().unwrap_err().is_invalid_argument());
    }

    #[test]
    fn labels_per_granularity() {
        let d = day(2024, 8, 5);
        assert_eq!(Granularity::Daily.label(d), "2024-08-05");
        assert_eq!(Granularity::Weekly.label(d), "Week of 2024-08-05");
        assert_eq!(Granularity::Monthly.label(d), "2024-08");
        assert_eq!(Granularity::Quarterly.label(d), "2024 Q3");
    }

    #[test]
    fn period_counts_follow_transition_rules() {
        // Threshold 30 days, one March period.
        let p = Period { start: day(2024, 3, 1), end: day(2024, 4, 1) };
        let timelines = vec![
            // Last order Feb 10: crosses into dormancy during March (Mar 11).
            CustomerTimeline::new(1, vec![day(2024, 2, 10)]),
            // Long dormant, comes back Mar 15.
            CustomerTimeline::new(2, vec![day(2023, 10, 1), day(2024, 3, 15)]),
            // First-ever order in March: not a reactivation.
            CustomerTimeline::new(3, vec![day(2024, 3, 20)]),
            // Dormant since last year.
            CustomerTimeline::new(4, vec![day(2023, 6, 1)]),
            // Orders only after the period: invisible.
            CustomerTimeline::new(5, vec![day(2024, 5, 1)]),
        ];
        let tp = evaluate_period(&timelines, p, Duration::days(30), Granularity::Monthly);
        assert_eq!(tp.new_dormant_count, 1);
        assert_eq!(tp.reactivated_count, 1);
        assert_eq!(tp.total_dormant_count, 2);
        assert!((tp.dormant_rate - 50.0).abs() < 1e-9);
        assert!((tp.reactivation_rate - 50.0).abs() < 1e-9);
    }

    #[test]
    fn empty_population_yields_zero_rates() {
        let p = Period { start: day(2024, 3, 1), end: day(2024, 3, 2) };
        let tp = evaluate_period(&[], p, Duration::days(90), Granularity::Daily);
        assert_eq!(tp.dormant_rate, 0.0);
        assert_eq!(tp.reactivation_rate, 0.0);
    }
}
