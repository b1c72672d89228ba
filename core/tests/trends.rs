use chrono::{DateTime, TimeZone, Utc};
use dormancy_core::{
    cache::MokaCache,
    clock::FixedClock,
    config::StaticConfig,
    customer::Order,
    store::{CustomerStore, NewCustomer},
    trend::Granularity,
    types::CustomerId,
    AnalyticsEngine,
};
use std::sync::Arc;

// ── Helpers ──────────────────────────────────────────────────────────────────

fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

fn add_customer(store: &CustomerStore, id: CustomerId, orders: &[DateTime<Utc>]) {
    store
        .insert_customer(&NewCustomer {
            id,
            store_id: 1,
            created_at: day(2023, 1, 1),
            tags: vec![],
        })
        .unwrap();
    for (n, at) in orders.iter().enumerate() {
        store
            .insert_order(&Order {
                order_id: id * 1_000 + n as i64,
                customer_id: id,
                created_at: *at,
                processed_at: None,
                total_price: 1_000.0,
            })
            .unwrap();
    }
}

/// 1: last order mid-December, goes dormant in March.
/// 2: dormant since June 2023, comes back in May.
/// 3: orders every month, never dormant.
fn make_engine() -> AnalyticsEngine {
    let store = CustomerStore::in_memory().unwrap();
    store.migrate().unwrap();
    add_customer(&store, 1, &[day(2023, 9, 1), day(2023, 12, 15)]);
    add_customer(&store, 2, &[day(2023, 6, 1), day(2024, 5, 10)]);
    let monthly: Vec<_> = (1..=12).map(|m| day(2024, m, 5)).collect();
    add_customer(&store, 3, &monthly);

    AnalyticsEngine::new(
        Box::new(store),
        Arc::new(MokaCache::new()),
        Arc::new(StaticConfig::default()),
        Arc::new(FixedClock::new(day(2025, 1, 1))),
    )
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[test]
fn monthly_year_has_twelve_contiguous_points() {
    let engine = make_engine();

    let points = engine
        .trends(1, day(2024, 1, 1), day(2024, 12, 31), Granularity::Monthly)
        .unwrap();

    assert_eq!(points.len(), 12);
    assert_eq!(points[0].period_label, "2024-01");
    assert_eq!(points[11].period_label, "2024-12");
    for pair in points.windows(2) {
        assert_eq!(pair[0].period_end, pair[1].period_date);
    }
    for p in &points {
        assert!((0.0..=100.0).contains(&p.dormant_rate), "{p:?}");
        assert!(p.reactivation_rate >= 0.0);
    }
}

#[test]
fn transitions_land_in_the_right_month() {
    let engine = make_engine();

    let points = engine
        .trends(1, day(2024, 1, 1), day(2024, 12, 31), Granularity::Monthly)
        .unwrap();
    let by_label = |label: &str| points.iter().find(|p| p.period_label == label).unwrap();

    // Dec 15 + 90 days = Mar 14.
    assert_eq!(by_label("2024-03").new_dormant_count, 1);
    assert_eq!(by_label("2024-02").new_dormant_count, 0);

    // Customer 2 is dormant through April, then returns in May.
    assert_eq!(by_label("2024-04").total_dormant_count, 2);
    assert_eq!(by_label("2024-05").reactivated_count, 1);
    assert_eq!(by_label("2024-05").total_dormant_count, 1);
    assert_eq!(by_label("2024-06").reactivated_count, 0);
}

#[test]
fn quarterly_labels_and_count() {
    let engine = make_engine();

    let points = engine
        .trends(1, day(2024, 1, 1), day(2024, 12, 31), Granularity::Quarterly)
        .unwrap();

    let labels: Vec<_> = points.iter().map(|p| p.period_label.as_str()).collect();
    assert_eq!(labels, ["2024 Q1", "2024 Q2", "2024 Q3", "2024 Q4"]);
}

#[test]
fn inverted_range_is_rejected() {
    let engine = make_engine();

    let err = engine
        .trends(1, day(2024, 6, 1), day(2024, 1, 1), Granularity::Weekly)
        .unwrap_err();
    assert!(err.is_invalid_argument(), "{err}");
}

#[test]
fn unknown_granularity_is_rejected() {
    let err = "fortnightly".parse::<Granularity>().unwrap_err();
    assert!(err.is_invalid_argument(), "{err}");
}

#[test]
fn store_without_orders_has_zero_rates() {
    let engine = make_engine();

    let points = engine
        .trends(42, day(2024, 1, 1), day(2024, 3, 31), Granularity::Monthly)
        .unwrap();
    assert_eq!(points.len(), 3);
    assert!(points.iter().all(|p| p.dormant_rate == 0.0 && p.reactivation_rate == 0.0));
}
