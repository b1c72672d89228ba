//! Population segmentation: fixed buckets by dormancy, spend and frequency.
//!
//! RULE: The bucket enums below are the only definition of segment names
//! and ranges. Nothing downstream matches on segment label strings.
//!
//! Percentages always divide by the full input population, so the sum of
//! non-empty segments may fall short of 100 when members are excluded
//! (order-less customers have no dormancy bucket).

use crate::{
    config::RiskThresholds,
    customer::CustomerAggregate,
    error::{AnalyticsError, AnalyticsResult},
    risk::{classify, RiskLevel},
    scoring,
    step::first_match,
    types::StoreId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Buckets ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SegmentDimension {
    DormancyPeriod,
    SpendingTier,
    PurchaseFrequency,
}

impl SegmentDimension {
    pub const ALL: [SegmentDimension; 3] =
        [Self::DormancyPeriod, Self::SpendingTier, Self::PurchaseFrequency];
}

/// Days since last order, inclusive ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DormancyBucket {
    Days0To30,
    Days31To60,
    Days61To89,
    Days90To180,
    Days181To365,
    Days366Plus,
}

impl DormancyBucket {
    pub const ALL: [DormancyBucket; 6] = [
        Self::Days0To30,
        Self::Days31To60,
        Self::Days61To89,
        Self::Days90To180,
        Self::Days181To365,
        Self::Days366Plus,
    ];

    const LADDER: [(f64, DormancyBucket); 5] = [
        (30.0,  Self::Days0To30),
        (60.0,  Self::Days31To60),
        (89.0,  Self::Days61To89),
        (180.0, Self::Days90To180),
        (365.0, Self::Days181To365),
    ];

    pub fn of(days: i64) -> Self {
        let d = days as f64;
        first_match(&Self::LADDER, Self::Days366Plus, |bound| d <= bound)
    }

    /// Inclusive `(min, max)` day range; `max` is `None` for the open bucket.
    pub fn range(&self) -> (i64, Option<i64>) {
        match self {
            Self::Days0To30    => (0, Some(30)),
            Self::Days31To60   => (31, Some(60)),
            Self::Days61To89   => (61, Some(89)),
            Self::Days90To180  => (90, Some(180)),
            Self::Days181To365 => (181, Some(365)),
            Self::Days366Plus  => (366, None),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Days0To30    => "0-30 days",
            Self::Days31To60   => "31-60 days",
            Self::Days61To89   => "61-89 days",
            Self::Days90To180  => "90-180 days",
            Self::Days181To365 => "181-365 days",
            Self::Days366Plus  => "366+ days",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL.into_iter().find(|b| {
            b.label().eq_ignore_ascii_case(s) || b.label().trim_end_matches(" days") == s
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SpendingTier {
    /// Below 20,000.
    Low,
    /// 20,000 up to but excluding 50,000.
    Mid,
    /// 50,000 and above.
    High,
}

impl SpendingTier {
    pub const ALL: [SpendingTier; 3] = [Self::Low, Self::Mid, Self::High];

    const LADDER: [(f64, SpendingTier); 2] = [(50_000.0, Self::High), (20_000.0, Self::Mid)];

    pub fn of(total_spent: f64) -> Self {
        first_match(&Self::LADDER, Self::Low, |bound| total_spent >= bound)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Low  => "Low spend (<20,000)",
            Self::Mid  => "Mid spend (20,000-49,999)",
            Self::High => "High spend (50,000+)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FrequencyBand {
    /// At most 2 orders.
    Low,
    /// 3 to 5 orders.
    Mid,
    /// More than 5 orders.
    High,
}

impl FrequencyBand {
    pub const ALL: [FrequencyBand; 3] = [Self::Low, Self::Mid, Self::High];

    const LADDER: [(f64, FrequencyBand); 2] = [(2.0, Self::Low), (5.0, Self::Mid)];

    pub fn of(total_orders: i64) -> Self {
        let n = total_orders as f64;
        first_match(&Self::LADDER, Self::High, |bound| n <= bound)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Low  => "Low frequency (0-2 orders)",
            Self::Mid  => "Mid frequency (3-5 orders)",
            Self::High => "High frequency (6+ orders)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "dimension", content = "bucket")]
pub enum SegmentBucket {
    Dormancy(DormancyBucket),
    Spending(SpendingTier),
    Frequency(FrequencyBand),
}

impl SegmentBucket {
    pub fn dimension(&self) -> SegmentDimension {
        match self {
            Self::Dormancy(_)  => SegmentDimension::DormancyPeriod,
            Self::Spending(_)  => SegmentDimension::SpendingTier,
            Self::Frequency(_) => SegmentDimension::PurchaseFrequency,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Dormancy(b)  => b.label(),
            Self::Spending(b)  => b.label(),
            Self::Frequency(b) => b.label(),
        }
    }

    /// Every bucket of one dimension, in display order.
    pub fn all_of(dimension: SegmentDimension) -> Vec<SegmentBucket> {
        match dimension {
            SegmentDimension::DormancyPeriod =>
                DormancyBucket::ALL.into_iter().map(Self::Dormancy).collect(),
            SegmentDimension::SpendingTier =>
                SpendingTier::ALL.into_iter().map(Self::Spending).collect(),
            SegmentDimension::PurchaseFrequency =>
                FrequencyBand::ALL.into_iter().map(Self::Frequency).collect(),
        }
    }

    /// The bucket a customer falls in. Order-less customers have no
    /// dormancy bucket.
    pub fn of(
        dimension: SegmentDimension,
        customer: &CustomerAggregate,
        now: DateTime<Utc>,
    ) -> Option<SegmentBucket> {
        match dimension {
            SegmentDimension::DormancyPeriod => customer
                .days_since_last_order(now)
                .map(|d| Self::Dormancy(DormancyBucket::of(d))),
            SegmentDimension::SpendingTier =>
                Some(Self::Spending(SpendingTier::of(customer.total_spent))),
            SegmentDimension::PurchaseFrequency =>
                Some(Self::Frequency(FrequencyBand::of(customer.total_orders))),
        }
    }
}

impl fmt::Display for SegmentBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ── Public types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub bucket:                    SegmentBucket,
    pub name:                      String,
    pub customer_count:            usize,
    pub percentage_of_population:  f64,
    pub total_revenue:             f64,
    pub average_revenue:           f64,
    pub average_dormancy_days:     i64,
    pub average_churn_probability: f64,
    pub risk_level:                RiskLevel,
}

impl Segment {
    pub fn dimension(&self) -> SegmentDimension {
        self.bucket.dimension()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskFactorKind {
    LongDormancy,
    LowFrequency,
    LowSpend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub kind:        RiskFactorKind,
    pub impact:      f64,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChurnRiskSegment {
    #[serde(flatten)]
    pub segment:        Segment,
    pub potential_loss: f64,
    pub risk_factors:   Vec<RiskFactor>,
}

// ── Distribution ─────────────────────────────────────────────────────────────

struct Member<'a> {
    customer:    &'a CustomerAggregate,
    probability: f64,
}

fn build_segment(
    bucket: SegmentBucket,
    members: &[Member<'_>],
    population: usize,
    now: DateTime<Utc>,
    thresholds: &RiskThresholds,
) -> Segment {
    let count = members.len();
    let total_revenue: f64 = members.iter().map(|m| m.customer.total_spent).sum();
    let mean_probability = mean(members.iter().map(|m| m.probability));

    let dormant_days: Vec<i64> = members
        .iter()
        .filter_map(|m| m.customer.days_since_last_order(now))
        .collect();
    let average_dormancy_days = if dormant_days.is_empty() {
        0
    } else {
        dormant_days.iter().sum::<i64>() / dormant_days.len() as i64
    };

    Segment {
        bucket,
        name:                      bucket.label().to_string(),
        customer_count:            count,
        percentage_of_population:  ratio(count as f64 * 100.0, population as f64),
        total_revenue,
        average_revenue:           ratio(total_revenue, count as f64),
        average_dormancy_days,
        average_churn_probability: mean_probability,
        risk_level:                classify(mean_probability, thresholds),
    }
}

/// Partition `customers` along one dimension. Empty buckets are omitted;
/// segments come back in bucket order.
pub fn distribute(
    customers: &[CustomerAggregate],
    dimension: SegmentDimension,
    now: DateTime<Utc>,
    thresholds: &RiskThresholds,
) -> Vec<Segment> {
    let scores = scoring::score_population(customers, now);
    distribute_scored(customers, &scores, dimension, now, thresholds)
}

fn distribute_scored(
    customers: &[CustomerAggregate],
    scores: &[scoring::ChurnScore],
    dimension: SegmentDimension,
    now: DateTime<Utc>,
    thresholds: &RiskThresholds,
) -> Vec<Segment> {
    let population = customers.len();
    SegmentBucket::all_of(dimension)
        .into_iter()
        .filter_map(|bucket| {
            let members: Vec<Member<'_>> = customers
                .iter()
                .zip(scores)
                .filter(|(c, _)| SegmentBucket::of(dimension, c, now) == Some(bucket))
                .map(|(customer, s)| Member { customer, probability: s.probability })
                .collect();
            if members.is_empty() {
                None
            } else {
                Some(build_segment(bucket, &members, population, now, thresholds))
            }
        })
        .collect()
}

/// Dormancy, spending and frequency segments, concatenated in that order.
pub fn distribute_all(
    customers: &[CustomerAggregate],
    now: DateTime<Utc>,
    thresholds: &RiskThresholds,
) -> Vec<Segment> {
    let scores = scoring::score_population(customers, now);
    SegmentDimension::ALL
        .into_iter()
        .flat_map(|d| distribute_scored(customers, &scores, d, now, thresholds))
        .collect()
}

/// Customers with orders whose dormancy lies in `[min_days, max_days]`.
/// `max_days = None` leaves the range open.
pub fn customers_in_dormancy_range<'a>(
    customers: &'a [CustomerAggregate],
    min_days: i64,
    max_days: Option<i64>,
    now: DateTime<Utc>,
) -> Vec<&'a CustomerAggregate> {
    customers
        .iter()
        .filter(|c| match c.days_since_last_order(now) {
            Some(days) => days >= min_days && max_days.map_or(true, |max| days <= max),
            None => false,
        })
        .collect()
}

// ── Churn-risk segments ──────────────────────────────────────────────────────

/// Store-wide churn-risk analysis, optionally limited to customers
/// created inside `[created_from, created_to]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChurnRiskRequest {
    pub store_id:     StoreId,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to:   Option<DateTime<Utc>>,
}

impl ChurnRiskRequest {
    pub fn new(store_id: StoreId) -> Self {
        Self { store_id, created_from: None, created_to: None }
    }

    pub fn validate(&self) -> AnalyticsResult<()> {
        if let (Some(from), Some(to)) = (self.created_from, self.created_to) {
            if from > to {
                return Err(AnalyticsError::invalid(
                    "created_to",
                    format!("created_from {from} is after created_to {to}"),
                ));
            }
        }
        Ok(())
    }
}

const LOW_FREQUENCY_ORDERS: f64 = 3.0;
const LOW_SPEND_LEVEL:      f64 = 30_000.0;

fn risk_factors(
    members: &[&CustomerAggregate],
    now: DateTime<Utc>,
    dormancy_threshold_days: i64,
) -> Vec<RiskFactor> {
    let mut factors = Vec::new();

    let avg_days = mean(members.iter().filter_map(|c| c.days_since_last_order(now)).map(|d| d as f64));
    let threshold = dormancy_threshold_days as f64;
    if threshold > 0.0 && avg_days > threshold {
        factors.push(RiskFactor {
            kind:        RiskFactorKind::LongDormancy,
            impact:      (avg_days / threshold * 0.3).min(1.0),
            description: format!("Average dormancy {avg_days:.0} days"),
        });
    }

    let avg_orders = mean(members.iter().map(|c| c.total_orders as f64));
    if avg_orders < LOW_FREQUENCY_ORDERS {
        factors.push(RiskFactor {
            kind:        RiskFactorKind::LowFrequency,
            impact:      (LOW_FREQUENCY_ORDERS - avg_orders) / LOW_FREQUENCY_ORDERS * 0.4,
            description: format!("Average {avg_orders:.1} orders"),
        });
    }

    let avg_spend = mean(members.iter().map(|c| c.total_spent));
    if avg_spend < LOW_SPEND_LEVEL {
        factors.push(RiskFactor {
            kind:        RiskFactorKind::LowSpend,
            impact:      (LOW_SPEND_LEVEL - avg_spend) / LOW_SPEND_LEVEL * 0.3,
            description: format!("Average spend {avg_spend:.0}"),
        });
    }

    factors.sort_by(|a, b| b.impact.total_cmp(&a.impact));
    factors.truncate(3);
    factors
}

/// Every non-empty bucket of every dimension with its potential loss and
/// top risk factors, highest potential loss first.
pub fn churn_risk_segments(
    customers: &[CustomerAggregate],
    now: DateTime<Utc>,
    thresholds: &RiskThresholds,
    dormancy_threshold_days: i64,
) -> Vec<ChurnRiskSegment> {
    let scores = scoring::score_population(customers, now);
    let mut out: Vec<ChurnRiskSegment> = [
        SegmentDimension::DormancyPeriod,
        SegmentDimension::PurchaseFrequency,
        SegmentDimension::SpendingTier,
    ]
    .into_iter()
    .flat_map(|d| distribute_scored(customers, &scores, d, now, thresholds))
    .map(|segment| {
        let members: Vec<&CustomerAggregate> = customers
            .iter()
            .filter(|c| SegmentBucket::of(segment.dimension(), c, now) == Some(segment.bucket))
            .collect();
        ChurnRiskSegment {
            potential_loss: segment.total_revenue * segment.average_churn_probability,
            risk_factors:   risk_factors(&members, now, dormancy_threshold_days),
            segment,
        }
    })
    .collect();

    out.sort_by(|a, b| b.potential_loss.total_cmp(&a.potential_loss));
    out
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    ratio(sum, n as f64)
}

/// `num / den`, 0 when the denominator is zero.
pub(crate) fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 { 0.0 } else { num / den }
}
