//! Demo population: A deterministic store of customers and orders.
//!
//! Used by the report binary when no database is given, and by tests
//! that need a realistic mix of active, dormant and order-less customers.

use crate::{
    customer::Order,
    error::AnalyticsResult,
    rng::{Stream, StreamRng},
    store::{CustomerStore, NewCustomer},
    types::{CustomerId, StoreId},
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemoSpec {
    pub seed:             u64,
    pub store_id:         StoreId,
    pub customers:        usize,
    pub first_id:         CustomerId,
    /// Share of customers who never ordered.
    pub orderless_share:  f64,
    /// Share of ordering customers whose last order is within 90 days.
    pub active_share:     f64,
    pub max_age_days:     i64,
}

impl DemoSpec {
    pub fn new(seed: u64, store_id: StoreId, customers: usize) -> Self {
        Self {
            seed,
            store_id,
            customers,
            first_id:        1,
            orderless_share: 0.08,
            active_share:    0.35,
            max_age_days:    1_000,
        }
    }
}

const TAGS: [(&str, f64); 3] = [("vip", 0.12), ("wholesale", 0.06), ("newsletter", 0.40)];

/// Generate customers and orders. The same `DemoSpec` and `now` give the same output.
pub fn generate(spec: &DemoSpec, now: DateTime<Utc>) -> (Vec<NewCustomer>, Vec<Order>) {
    let mut crng = StreamRng::new(spec.seed, Stream::Customers);
    let mut orng = StreamRng::new(spec.seed, Stream::Orders);

    let mut customers = Vec::with_capacity(spec.customers);
    let mut orders = Vec::new();

    for i in 0..spec.customers {
        let id = spec.first_id + i as CustomerId;
        let age_days = crng.range_i64(30, spec.max_age_days.max(30));
        let created_at = now - Duration::days(age_days);
        let tags = TAGS
            .iter()
            .filter(|(_, p)| crng.chance(*p))
            .map(|(t, _)| t.to_string())
            .collect();
        customers.push(NewCustomer { id, store_id: spec.store_id, created_at, tags });

        if crng.chance(spec.orderless_share) {
            continue;
        }

        let dormant_days = if crng.chance(spec.active_share) {
            crng.range_i64(0, 89)
        } else {
            crng.range_i64(90, 730)
        }
        .min(age_days);
        let last_at = now - Duration::days(dormant_days);
        let order_count = (orng.pareto(1.0, 1.3) as i64).clamp(1, 40);
        let span_secs = (last_at - created_at).num_seconds().max(0);
        let order_value = orng.pareto(2_500.0, 1.6).min(250_000.0);

        for n in 0..order_count {
            let created = if n == order_count - 1 {
                last_at
            } else {
                created_at + Duration::seconds(orng.next_u64_below(span_secs as u64 + 1) as i64)
            };
            // Most orders are processed within a day or two; never after the last one.
            let processed_at = if orng.chance(0.8) {
                Some((created + Duration::hours(orng.range_i64(1, 48))).min(last_at).max(created))
            } else {
                None
            };
            let price = (order_value * (0.5 + orng.next_f64())).round();
            orders.push(Order {
                order_id: id * 1_000 + n,
                customer_id: id,
                created_at: created,
                processed_at,
                total_price: price,
            });
        }
    }
    (customers, orders)
}

/// Generate and insert a demo population. Returns the customer count.
pub fn seed(store: &CustomerStore, spec: &DemoSpec, now: DateTime<Utc>) -> AnalyticsResult<usize> {
    let (customers, orders) = generate(spec, now);
    store.insert_population(&customers, &orders)?;
    log::info!(
        "demo: store={} seed={} customers={} orders={}",
        spec.store_id,
        spec.seed,
        customers.len(),
        orders.len()
    );
    Ok(customers.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn generation_is_deterministic() {
        let spec = DemoSpec::new(99, 1, 200);
        assert_eq!(generate(&spec, now()), generate(&spec, now()));
    }

    #[test]
    fn orders_never_postdate_now_or_predate_signup() {
        let spec = DemoSpec::new(5, 1, 300);
        let (customers, orders) = generate(&spec, now());
        for o in &orders {
            let c = customers.iter().find(|c| c.id == o.customer_id).unwrap();
            assert!(o.effective_at() <= now());
            assert!(o.created_at >= c.created_at);
        }
    }

    #[test]
    fn mix_contains_orderless_customers() {
        let spec = DemoSpec::new(11, 1, 500);
        let (customers, orders) = generate(&spec, now());
        let ordering: std::collections::HashSet<_> = orders.iter().map(|o| o.customer_id).collect();
        assert!(ordering.len() < customers.len());
        assert!(ordering.len() > customers.len() / 2);
    }
}
