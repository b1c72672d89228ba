//! Churn scoring: A weighted blend of three step-function signals.
//!
//! probability = clamp(0.5·dormancy + 0.3·frequency + 0.2·spending, 0, 1)
//!
//! RULE: A score is a pure function of one `CustomerAggregate` and `now`.
//! Population scoring fans out across rayon's pool for that reason.

use crate::{
    customer::CustomerAggregate,
    step::StepTable,
    types::CustomerId,
};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

// ── Tables ───────────────────────────────────────────────────────────────────

/// Days since last order → dormancy sub-score.
pub const DORMANCY: StepTable<'static, f64> = StepTable::at_most(
    &[(30.0, 0.05), (60.0, 0.15), (90.0, 0.25), (120.0, 0.40), (180.0, 0.60), (365.0, 0.80)],
    0.95,
);

/// Orders per month → frequency sub-score.
pub const FREQUENCY: StepTable<'static, f64> =
    StepTable::at_least(&[(2.0, 0.1), (1.0, 0.2), (0.5, 0.4), (0.25, 0.6)], 0.8);

/// Lifetime spend → spending sub-score.
pub const SPENDING: StepTable<'static, f64> = StepTable::at_least(
    &[(100_000.0, 0.1), (50_000.0, 0.2), (20_000.0, 0.3), (10_000.0, 0.5)],
    0.7,
);

pub const DORMANCY_WEIGHT:  f64 = 0.5;
pub const FREQUENCY_WEIGHT: f64 = 0.3;
pub const SPENDING_WEIGHT:  f64 = 0.2;

/// Fixed probability for customers who never ordered.
pub const NO_ORDER_PROBABILITY: f64 = 0.9;

// ── Public types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreComponents {
    pub days_since_last_order: i64,
    pub orders_per_month:      f64,
    pub dormancy:              f64,
    pub frequency:             f64,
    pub spending:              f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChurnScore {
    pub customer_id: CustomerId,
    pub probability: f64,
    pub computed_at: DateTime<Utc>,
    /// `None` for order-less customers, who take the fixed probability.
    pub components:  Option<ScoreComponents>,
}

// ── Scoring ──────────────────────────────────────────────────────────────────

pub fn score(customer: &CustomerAggregate, now: DateTime<Utc>) -> ChurnScore {
    let days = match customer.days_since_last_order(now) {
        Some(days) => days,
        None => {
            return ChurnScore {
                customer_id: customer.id,
                probability: NO_ORDER_PROBABILITY,
                computed_at: now,
                components:  None,
            }
        }
    };

    let orders_per_month = customer.orders_per_month(now);
    let dormancy  = DORMANCY.lookup(days as f64);
    let frequency = FREQUENCY.lookup(orders_per_month);
    let spending  = SPENDING.lookup(customer.total_spent);

    let blended = DORMANCY_WEIGHT * dormancy
        + FREQUENCY_WEIGHT * frequency
        + SPENDING_WEIGHT * spending;

    ChurnScore {
        customer_id: customer.id,
        probability: blended.clamp(0.0, 1.0),
        computed_at: now,
        components:  Some(ScoreComponents {
            days_since_last_order: days,
            orders_per_month,
            dormancy,
            frequency,
            spending,
        }),
    }
}

/// Probability only.
pub fn probability(customer: &CustomerAggregate, now: DateTime<Utc>) -> f64 {
    score(customer, now).probability
}

/// Score every member of a population in parallel. Output order matches input.
pub fn score_population(customers: &[CustomerAggregate], now: DateTime<Utc>) -> Vec<ChurnScore> {
    customers.par_iter().map(|c| score(c, now)).collect()
}

/// Mean probability over a population, 0 when empty.
pub fn mean_probability(customers: &[&CustomerAggregate], now: DateTime<Utc>) -> f64 {
    if customers.is_empty() {
        return 0.0;
    }
    let probs: Vec<f64> = customers.par_iter().map(|c| probability(c, now)).collect();
    probs.iter().sum::<f64>() / probs.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn dormancy_table_edges() {
        assert_eq!(DORMANCY.lookup(30.0), 0.05);
        assert_eq!(DORMANCY.lookup(31.0), 0.15);
        assert_eq!(DORMANCY.lookup(90.0), 0.25);
        assert_eq!(DORMANCY.lookup(365.0), 0.80);
        assert_eq!(DORMANCY.lookup(366.0), 0.95);
    }

    #[test]
    fn frequency_and_spending_edges() {
        assert_eq!(FREQUENCY.lookup(2.0), 0.1);
        assert_eq!(FREQUENCY.lookup(0.25), 0.6);
        assert_eq!(FREQUENCY.lookup(0.0), 0.8);
        assert_eq!(SPENDING.lookup(100_000.0), 0.1);
        assert_eq!(SPENDING.lookup(9_999.99), 0.7);
    }

    #[test]
    fn orderless_customer_takes_fixed_probability() {
        let c = CustomerAggregate {
            id: 9, store_id: 1, total_orders: 0, total_spent: 0.0,
            last_order_date: None, created_at: now() - Duration::days(10), tags: vec![],
        };
        let s = score(&c, now());
        assert_eq!(s.probability, 0.9);
        assert!(s.components.is_none());
    }

    #[test]
    fn weighted_blend() {
        // 45 days dormant, 12 orders over 300 days = 1.2/month, 60k spent.
        let c = CustomerAggregate {
            id: 1, store_id: 1, total_orders: 12, total_spent: 60_000.0,
            last_order_date: Some(now() - Duration::days(45)),
            created_at: now() - Duration::days(300), tags: vec![],
        };
        let s = score(&c, now());
        let parts = s.components.unwrap();
        assert_eq!(parts.dormancy, 0.15);
        assert_eq!(parts.frequency, 0.2);
        assert_eq!(parts.spending, 0.2);
        assert!((s.probability - 0.175).abs() < 1e-12);
    }
}
