//! Dormant-population summary KPIs.

use crate::{
    config::RiskThresholds,
    customer::CustomerAggregate,
    reactivation::average_order_value,
    risk::{classify, RiskLevel},
    scoring,
    segmentation::{ratio, DormancyBucket},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Share of a dormant customer's average order assumed recoverable.
pub const RECOVERABLE_SHARE: f64 = 0.3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketTotals {
    pub bucket:         DormancyBucket,
    pub name:           String,
    pub customer_count: usize,
    pub total_revenue:  f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DormantSummary {
    pub total_dormant_customers:       usize,
    /// Percent of customers with orders, one decimal.
    pub dormant_rate:                  f64,
    pub average_dormancy_days:         i64,
    pub buckets:                       Vec<BucketTotals>,
    pub average_churn_probability:     f64,
    pub risk_counts:                   BTreeMap<RiskLevel, usize>,
    pub total_lost_revenue:            f64,
    pub average_customer_revenue:      f64,
    pub average_order_value:           f64,
    pub potential_recoverable_revenue: f64,
    pub analysis_date:                 DateTime<Utc>,
}

/// Summarize `dormant` against the store's count of customers with orders.
pub fn summarize(
    dormant: &[CustomerAggregate],
    customers_with_orders: usize,
    now: DateTime<Utc>,
    thresholds: &RiskThresholds,
) -> DormantSummary {
    let count = dormant.len();
    let dormant_rate = round1(ratio(count as f64 * 100.0, customers_with_orders as f64));

    let days: Vec<i64> = dormant.iter().filter_map(|c| c.days_since_last_order(now)).collect();
    let average_dormancy_days = ratio(days.iter().sum::<i64>() as f64, days.len() as f64).round() as i64;

    let mut totals: BTreeMap<DormancyBucket, (usize, f64)> = BTreeMap::new();
    for c in dormant {
        if let Some(d) = c.days_since_last_order(now) {
            let entry = totals.entry(DormancyBucket::of(d)).or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += c.total_spent;
        }
    }
    let buckets = totals
        .into_iter()
        .map(|(bucket, (customer_count, total_revenue))| BucketTotals {
            bucket,
            name: bucket.label().to_string(),
            customer_count,
            total_revenue,
        })
        .collect();

    let scores = scoring::score_population(dormant, now);
    let mut risk_counts: BTreeMap<RiskLevel, usize> =
        RiskLevel::ALL.into_iter().map(|l| (l, 0)).collect();
    for s in &scores {
        *risk_counts.entry(classify(s.probability, thresholds)).or_insert(0) += 1;
    }
    let average_churn_probability =
        ratio(scores.iter().map(|s| s.probability).sum(), scores.len() as f64);

    let total_lost_revenue: f64 = dormant.iter().map(|c| c.total_spent).sum();
    let aov = average_order_value(dormant);

    DormantSummary {
        total_dormant_customers: count,
        dormant_rate,
        average_dormancy_days,
        buckets,
        average_churn_probability,
        risk_counts,
        total_lost_revenue,
        average_customer_revenue: ratio(total_lost_revenue, count as f64),
        average_order_value: aov,
        potential_recoverable_revenue: count as f64 * aov * RECOVERABLE_SHARE,
        analysis_date: now,
    }
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}
