//! Customer and order snapshots as read from the data gateway.
//!
//! RULE: These are immutable inputs. The engine never mutates a
//! `CustomerAggregate`; every derived value (dormancy, age, AOV) is
//! computed against an explicit `now`.

use crate::{
    clock::days_between,
    types::{CustomerId, OrderId, StoreId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Public types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerAggregate {
    pub id:              CustomerId,
    pub store_id:        StoreId,
    pub total_orders:    i64,
    pub total_spent:     f64,
    pub last_order_date: Option<DateTime<Utc>>,
    pub created_at:      DateTime<Utc>,
    pub tags:            Vec<String>,
}

impl CustomerAggregate {
    /// A customer "has orders" only when both the count and the
    /// timestamp agree.
    pub fn has_orders(&self) -> bool {
        self.total_orders > 0 && self.last_order_date.is_some()
    }

    /// Whole days since the most recent order, `None` for order-less customers.
    pub fn days_since_last_order(&self, now: DateTime<Utc>) -> Option<i64> {
        if !self.has_orders() {
            return None;
        }
        self.last_order_date.map(|last| days_between(last, now))
    }

    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        days_between(self.created_at, now)
    }

    /// Customer age in 30-day months. Fractional.
    pub fn age_months(&self, now: DateTime<Utc>) -> f64 {
        self.age_days(now) as f64 / 30.0
    }

    /// Orders per 30 days over the customer's lifetime; 0 when age ≤ 0.
    pub fn orders_per_month(&self, now: DateTime<Utc>) -> f64 {
        let age = self.age_days(now);
        if age <= 0 {
            return 0.0;
        }
        self.total_orders as f64 * 30.0 / age as f64
    }

    pub fn average_order_value(&self) -> f64 {
        if self.total_orders <= 0 {
            return 0.0;
        }
        self.total_spent / self.total_orders as f64
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id:     OrderId,
    pub customer_id:  CustomerId,
    pub created_at:   DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub total_price:  f64,
}

impl Order {
    /// The timestamp an order counts at: processed time when present.
    pub fn effective_at(&self) -> DateTime<Utc> {
        self.processed_at.unwrap_or(self.created_at)
    }
}

/// Most recent effective order timestamp.
pub fn most_recent_order(orders: &[Order]) -> Option<DateTime<Utc>> {
    orders.iter().map(Order::effective_at).max()
}

/// One customer's effective order timestamps, ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerTimeline {
    pub customer_id: CustomerId,
    pub orders:      Vec<DateTime<Utc>>,
}

impl CustomerTimeline {
    pub fn new(customer_id: CustomerId, mut orders: Vec<DateTime<Utc>>) -> Self {
        orders.sort_unstable();
        Self { customer_id, orders }
    }

    /// Number of orders strictly before `at`.
    fn count_before(&self, at: DateTime<Utc>) -> usize {
        self.orders.partition_point(|t| *t < at)
    }

    /// Most recent order strictly before `at`.
    pub fn last_before(&self, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.count_before(at) {
            0 => None,
            n => Some(self.orders[n - 1]),
        }
    }

    /// Orders in `[from, to)` paired with the order immediately preceding
    /// each of them (`None` for the first-ever order).
    pub fn orders_in(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> impl Iterator<Item = (Option<DateTime<Utc>>, DateTime<Utc>)> + '_ {
        let lo = self.count_before(from);
        let hi = self.count_before(to).max(lo);
        (lo..hi).map(move |i| {
            let prev = if i == 0 { None } else { Some(self.orders[i - 1]) };
            (prev, self.orders[i])
        })
    }
}

// ── Gateway filter ───────────────────────────────────────────────────────────

/// Population filter pushed to `DataGateway::get_customers`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerFilter {
    /// Only customers with at least one order strictly before this instant.
    pub last_order_before: Option<DateTime<Utc>>,
    pub created_from:      Option<DateTime<Utc>>,
    pub created_to:        Option<DateTime<Utc>>,
}

impl CustomerFilter {
    pub fn all() -> Self {
        Self::default()
    }

    /// Customers whose most recent order predates `cutoff`.
    pub fn dormant_before(cutoff: DateTime<Utc>) -> Self {
        Self { last_order_before: Some(cutoff), ..Self::default() }
    }

    pub fn matches(&self, c: &CustomerAggregate) -> bool {
        if let Some(cutoff) = self.last_order_before {
            match c.last_order_date {
                Some(last) if c.has_orders() && last < cutoff => {}
                _ => return false,
            }
        }
        if let Some(from) = self.created_from {
            if c.created_at < from {
                return false;
            }
        }
        if let Some(to) = self.created_to {
            if c.created_at > to {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn customer(orders: i64, last: Option<i64>) -> CustomerAggregate {
        CustomerAggregate {
            id:              1,
            store_id:        1,
            total_orders:    orders,
            total_spent:     1000.0,
            last_order_date: last.map(|d| now() - Duration::days(d)),
            created_at:      now() - Duration::days(400),
            tags:            vec!["VIP".into()],
        }
    }

    #[test]
    fn has_orders_requires_count_and_date() {
        assert!(customer(3, Some(10)).has_orders());
        assert!(!customer(0, Some(10)).has_orders());
        assert!(!customer(3, None).has_orders());
        assert_eq!(customer(3, None).days_since_last_order(now()), None);
    }

    #[test]
    fn orders_per_month_is_zero_for_new_customers() {
        let mut c = customer(5, Some(0));
        c.created_at = now();
        assert_eq!(c.orders_per_month(now()), 0.0);
        c.created_at = now() - Duration::days(60);
        assert!((c.orders_per_month(now()) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn effective_timestamp_prefers_processed_at() {
        let created = now() - Duration::days(5);
        let processed = now() - Duration::days(3);
        let mut o = Order {
            order_id: 1, customer_id: 1, created_at: created,
            processed_at: Some(processed), total_price: 10.0,
        };
        assert_eq!(o.effective_at(), processed);
        o.processed_at = None;
        assert_eq!(o.effective_at(), created);
    }

    #[test]
    fn timeline_pairs_orders_with_predecessors() {
        let t0 = now() - Duration::days(300);
        let t1 = now() - Duration::days(100);
        let t2 = now() - Duration::days(10);
        let tl = CustomerTimeline::new(7, vec![t2, t0, t1]);
        assert_eq!(tl.last_before(now()), Some(t2));
        assert_eq!(tl.last_before(t1), Some(t0));
        assert_eq!(tl.last_before(t0), None);

        let pairs: Vec<_> = tl.orders_in(t0, t2).collect();
        assert_eq!(pairs, vec![(None, t0), (Some(t0), t1)]);
    }

    #[test]
    fn dormant_filter_excludes_orderless_and_recent() {
        let f = CustomerFilter::dormant_before(now() - Duration::days(90));
        assert!(f.matches(&customer(2, Some(120))));
        assert!(!f.matches(&customer(2, Some(30))));
        assert!(!f.matches(&customer(0, None)));
    }

    #[test]
    fn tag_match_ignores_case() {
        assert!(customer(1, Some(1)).has_tag("vip"));
        assert!(!customer(1, Some(1)).has_tag("wholesale"));
    }
}
