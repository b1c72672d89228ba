//! Reactivation planning: potential tiers, strategy catalog, revenue.
//!
//! Potential is the inverse of churn risk: a low churn probability means
//! a dormant customer is likely to come back if targeted.
//!
//! RULE: Strategy revenue counts only targeted customers that have
//! orders. An order-less customer has no order value to recover, so it
//! adds to `target_count` but contributes 0 revenue.

use crate::{
    customer::CustomerAggregate,
    scoring,
    segmentation::{customers_in_dormancy_range, ratio, DormancyBucket},
    step::StepTable,
    types::{CustomerId, StoreId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

// ── Potential tiers ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReactivationPotential {
    High,
    Medium,
    Low,
}

/// Churn probability → potential tier.
pub const POTENTIAL: StepTable<'static, ReactivationPotential> = StepTable::at_most(
    &[(0.4, ReactivationPotential::High), (0.7, ReactivationPotential::Medium)],
    ReactivationPotential::Low,
);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReactivationClassification {
    pub high_count:   usize,
    pub medium_count: usize,
    pub low_count:    usize,
    pub high_ids:     Vec<CustomerId>,
    pub medium_ids:   Vec<CustomerId>,
    pub low_ids:      Vec<CustomerId>,
}

/// Score the population and bucket it by potential in one pass.
/// Id lists keep input order.
pub fn classify(customers: &[CustomerAggregate], now: DateTime<Utc>) -> ReactivationClassification {
    let scores = scoring::score_population(customers, now);
    let mut out = ReactivationClassification::default();
    for s in scores {
        match POTENTIAL.lookup(s.probability) {
            ReactivationPotential::High   => out.high_ids.push(s.customer_id),
            ReactivationPotential::Medium => out.medium_ids.push(s.customer_id),
            ReactivationPotential::Low    => out.low_ids.push(s.customer_id),
        }
    }
    out.high_count   = out.high_ids.len();
    out.medium_count = out.medium_ids.len();
    out.low_count    = out.low_ids.len();
    out
}

// ── Strategies ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StrategyKind {
    PersonalizedEmail,
    LimitedTimeOffer,
    Retargeting,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 3] =
        [Self::PersonalizedEmail, Self::LimitedTimeOffer, Self::Retargeting];

    pub fn name(&self) -> &'static str {
        match self {
            Self::PersonalizedEmail => "Personalized email",
            Self::LimitedTimeOffer  => "Limited-time offer",
            Self::Retargeting       => "Retargeting ads",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::PersonalizedEmail => "Send individually tailored promotional email",
            Self::LimitedTimeOffer  => "Offer a time-limited discount coupon",
            Self::Retargeting       => "Retarget through social media and search ads",
        }
    }

    pub fn success_rate(&self) -> f64 {
        match self {
            Self::PersonalizedEmail => 0.15,
            Self::LimitedTimeOffer  => 0.25,
            Self::Retargeting       => 0.08,
        }
    }

    /// Revenue kept per converted order. The offer gives 10% away.
    fn revenue_retention(&self) -> f64 {
        match self {
            Self::LimitedTimeOffer => 0.9,
            _ => 1.0,
        }
    }

    fn targets(&self, potential: ReactivationPotential) -> bool {
        use ReactivationPotential::*;
        match self {
            Self::PersonalizedEmail => matches!(potential, High | Medium),
            Self::LimitedTimeOffer  => potential == High,
            Self::Retargeting       => potential == Medium,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactivationStrategy {
    pub kind:                   StrategyKind,
    pub name:                   String,
    pub description:            String,
    pub target_count:           usize,
    pub estimated_success_rate: f64,
    pub estimated_revenue:      f64,
}

/// Mean of per-customer order value over customers with orders.
pub fn average_order_value(customers: &[CustomerAggregate]) -> f64 {
    let values: Vec<f64> = customers
        .iter()
        .filter(|c| c.total_orders > 0)
        .map(CustomerAggregate::average_order_value)
        .collect();
    ratio(values.iter().sum(), values.len() as f64)
}

/// The fixed three-strategy catalog priced against `customers`.
pub fn generate_strategies(
    customers: &[CustomerAggregate],
    classification: &ReactivationClassification,
) -> Vec<ReactivationStrategy> {
    let aov = average_order_value(customers);
    let with_orders: HashSet<CustomerId> =
        customers.iter().filter(|c| c.has_orders()).map(|c| c.id).collect();

    let tiers = [
        (ReactivationPotential::High,   &classification.high_ids),
        (ReactivationPotential::Medium, &classification.medium_ids),
        (ReactivationPotential::Low,    &classification.low_ids),
    ];

    StrategyKind::ALL
        .into_iter()
        .map(|kind| {
            let targeted: Vec<CustomerId> = tiers
                .iter()
                .filter(|(tier, _)| kind.targets(*tier))
                .flat_map(|(_, ids)| ids.iter().copied())
                .collect();
            let revenue_targets = targeted.iter().filter(|id| with_orders.contains(id)).count();
            ReactivationStrategy {
                kind,
                name:                   kind.name().to_string(),
                description:            kind.description().to_string(),
                target_count:           targeted.len(),
                estimated_success_rate: kind.success_rate(),
                estimated_revenue:      aov
                    * revenue_targets as f64
                    * kind.success_rate()
                    * kind.revenue_retention(),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EstimatedRevenue {
    pub total:                f64,
    pub by_strategy:          BTreeMap<StrategyKind, f64>,
    pub average_per_customer: f64,
}

pub fn estimate_revenue(
    customers: &[CustomerAggregate],
    strategies: &[ReactivationStrategy],
) -> EstimatedRevenue {
    let mut out = EstimatedRevenue::default();
    for s in strategies {
        *out.by_strategy.entry(s.kind).or_insert(0.0) += s.estimated_revenue;
        out.total += s.estimated_revenue;
    }
    out.average_per_customer = ratio(out.total, customers.len() as f64);
    out
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReactivationPotentialStats {
    pub high_potential_customers:       usize,
    pub medium_potential_customers:     usize,
    pub low_potential_customers:        usize,
    pub recommended_strategies:         Vec<ReactivationStrategy>,
    pub estimated_reactivation_revenue: f64,
}

pub fn potential_stats(customers: &[CustomerAggregate], now: DateTime<Utc>) -> ReactivationPotentialStats {
    let classification = classify(customers, now);
    let strategies = generate_strategies(customers, &classification);
    let revenue = estimate_revenue(customers, &strategies);
    ReactivationPotentialStats {
        high_potential_customers:       classification.high_count,
        medium_potential_customers:     classification.medium_count,
        low_potential_customers:        classification.low_count,
        recommended_strategies:         strategies,
        estimated_reactivation_revenue: revenue.total,
    }
}

// ── Revenue loss ─────────────────────────────────────────────────────────────

/// Escalation applied to projected losses.
pub const PROJECTION_ESCALATION: f64 = 1.1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RevenueLoss {
    pub total_loss:                f64,
    pub monthly_average_loss:      f64,
    pub average_loss_per_customer: f64,
}

/// Loss over `period_months` if each customer kept spending at their
/// lifetime monthly average.
pub fn historical_loss(
    customers: &[CustomerAggregate],
    period_months: u32,
    now: DateTime<Utc>,
) -> RevenueLoss {
    if customers.is_empty() {
        return RevenueLoss::default();
    }
    let months = period_months as f64;
    let total_loss: f64 = customers
        .iter()
        .filter(|c| c.has_orders() && c.age_days(now) > 0)
        .map(|c| c.total_spent / c.age_months(now) * months)
        .sum();

    RevenueLoss {
        total_loss,
        monthly_average_loss:      ratio(total_loss, months),
        average_loss_per_customer: ratio(total_loss, customers.len() as f64),
    }
}

/// 12-month historical loss escalated and spread over `projection_months`.
pub fn projected_loss(
    customers: &[CustomerAggregate],
    projection_months: u32,
    now: DateTime<Utc>,
) -> RevenueLoss {
    let hist = historical_loss(customers, 12, now);
    RevenueLoss {
        total_loss:                hist.monthly_average_loss * projection_months as f64 * PROJECTION_ESCALATION,
        monthly_average_loss:      hist.monthly_average_loss * PROJECTION_ESCALATION,
        average_loss_per_customer: hist.average_loss_per_customer * PROJECTION_ESCALATION,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRevenueImpact {
    pub bucket:         DormancyBucket,
    pub name:           String,
    pub customer_count: usize,
    pub revenue_loss:   f64,
    pub customer_value: f64,
}

/// 12-month loss per non-empty dormancy bucket.
pub fn segment_breakdown(customers: &[CustomerAggregate], now: DateTime<Utc>) -> Vec<SegmentRevenueImpact> {
    DormancyBucket::ALL
        .into_iter()
        .filter_map(|bucket| {
            let (min, max) = bucket.range();
            let members: Vec<CustomerAggregate> = customers_in_dormancy_range(customers, min, max, now)
                .into_iter()
                .cloned()
                .collect();
            if members.is_empty() {
                return None;
            }
            let loss = historical_loss(&members, 12, now);
            Some(SegmentRevenueImpact {
                bucket,
                name:           bucket.label().to_string(),
                customer_count: members.len(),
                revenue_loss:   loss.total_loss,
                customer_value: loss.average_loss_per_customer,
            })
        })
        .collect()
}

// ── Revenue impact ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueImpactRequest {
    pub store_id:            StoreId,
    pub start:               DateTime<Utc>,
    pub end:                 DateTime<Utc>,
    pub include_projections: bool,
    pub period_months:       Option<u32>,
    pub projection_months:   Option<u32>,
}

impl RevenueImpactRequest {
    pub fn new(store_id: StoreId, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            store_id,
            start,
            end,
            include_projections: true,
            period_months:       None,
            projection_months:   None,
        }
    }

    pub fn period_months(&self) -> u32 {
        self.period_months.unwrap_or(12)
    }

    pub fn projection_months(&self) -> u32 {
        self.projection_months.unwrap_or(12)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueImpact {
    pub analysis_start:         DateTime<Utc>,
    pub analysis_end:           DateTime<Utc>,
    pub historical_loss:        f64,
    pub monthly_loss:           f64,
    pub projected_loss:         f64,
    pub projected_monthly_loss: f64,
    pub recoverable_potential:  f64,
    pub recovery_rate:          f64,
    pub segment_breakdown:      Vec<SegmentRevenueImpact>,
}

pub fn revenue_impact(
    customers: &[CustomerAggregate],
    request: &RevenueImpactRequest,
    now: DateTime<Utc>,
) -> RevenueImpact {
    let hist = historical_loss(customers, request.period_months(), now);
    let projected = if request.include_projections {
        projected_loss(customers, request.projection_months(), now)
    } else {
        RevenueLoss::default()
    };
    let classification = classify(customers, now);
    let strategies = generate_strategies(customers, &classification);
    let recoverable = estimate_revenue(customers, &strategies).total;

    RevenueImpact {
        analysis_start:         request.start,
        analysis_end:           request.end,
        historical_loss:        hist.total_loss,
        monthly_loss:           hist.monthly_average_loss,
        projected_loss:         projected.total_loss,
        projected_monthly_loss: projected.monthly_average_loss,
        recoverable_potential:  recoverable,
        recovery_rate:          ratio(recoverable * 100.0, hist.total_loss),
        segment_breakdown:      segment_breakdown(customers, now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn customer(id: CustomerId, orders: i64, spent: f64, dormant_days: i64, age_days: i64) -> CustomerAggregate {
        CustomerAggregate {
            id,
            store_id:        1,
            total_orders:    orders,
            total_spent:     spent,
            last_order_date: (orders > 0).then(|| now() - Duration::days(dormant_days)),
            created_at:      now() - Duration::days(age_days),
            tags:            vec![],
        }
    }

    #[test]
    fn potential_tiers_are_inclusive_at_bounds() {
        assert_eq!(POTENTIAL.lookup(0.4), ReactivationPotential::High);
        assert_eq!(POTENTIAL.lookup(0.41), ReactivationPotential::Medium);
        assert_eq!(POTENTIAL.lookup(0.7), ReactivationPotential::Medium);
        assert_eq!(POTENTIAL.lookup(0.71), ReactivationPotential::Low);
    }

    #[test]
    fn six_months_at_sixty_thousand_loses_one_twenty_over_a_year() {
        let c = customer(1, 4, 60_000.0, 100, 180);
        let loss = historical_loss(&[c], 12, now());
        assert!((loss.total_loss - 120_000.0).abs() < 1e-6);
        assert!((loss.monthly_average_loss - 10_000.0).abs() < 1e-6);
        assert!((loss.average_loss_per_customer - 120_000.0).abs() < 1e-6);
    }

    #[test]
    fn zero_period_months_yields_zero_monthly_average() {
        let c = customer(1, 4, 60_000.0, 100, 180);
        let loss = historical_loss(&[c], 0, now());
        assert_eq!(loss.total_loss, 0.0);
        assert_eq!(loss.monthly_average_loss, 0.0);
    }

    #[test]
    fn projection_escalates_by_ten_percent() {
        let c = customer(1, 4, 60_000.0, 100, 180);
        let p = projected_loss(&[c], 6, now());
        assert!((p.monthly_average_loss - 11_000.0).abs() < 1e-6);
        assert!((p.total_loss - 66_000.0).abs() < 1e-6);
        assert!((p.average_loss_per_customer - 132_000.0).abs() < 1e-6);
    }

    #[test]
    fn orderless_targets_count_but_earn_nothing() {
        let classification = ReactivationClassification {
            high_count: 2,
            high_ids:   vec![1, 2],
            ..Default::default()
        };
        let customers = vec![
            customer(1, 2, 1_000.0, 100, 400),
            customer(2, 0, 0.0, 0, 400),
        ];
        let strategies = generate_strategies(&customers, &classification);
        let offer = strategies.iter().find(|s| s.kind == StrategyKind::LimitedTimeOffer).unwrap();
        assert_eq!(offer.target_count, 2);
        // AOV 500 × 1 customer with orders × 0.25 × 0.9
        assert!((offer.estimated_revenue - 112.5).abs() < 1e-9);

        let retarget = strategies.iter().find(|s| s.kind == StrategyKind::Retargeting).unwrap();
        assert_eq!(retarget.target_count, 0);
        assert_eq!(retarget.estimated_revenue, 0.0);
    }

    #[test]
    fn estimate_revenue_of_empty_population_is_zero() {
        let est = estimate_revenue(&[], &[]);
        assert_eq!(est.total, 0.0);
        assert_eq!(est.average_per_customer, 0.0);
    }
}
