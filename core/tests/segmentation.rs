use chrono::{DateTime, Duration, TimeZone, Utc};
use dormancy_core::{
    cache::MokaCache,
    clock::FixedClock,
    config::StaticConfig,
    customer::{CustomerFilter, Order},
    gateway::DataGateway,
    population::{self, DemoSpec},
    segmentation::{customers_in_dormancy_range, ChurnRiskRequest, DormancyBucket, SegmentDimension},
    store::{CustomerStore, NewCustomer},
    types::CustomerId,
    AnalyticsEngine,
};
use std::{collections::HashSet, sync::Arc};

// ── Helpers ──────────────────────────────────────────────────────────────────

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
}

fn demo_store(seed: u64, customers: usize) -> CustomerStore {
    let store = CustomerStore::in_memory().unwrap();
    store.migrate().unwrap();
    population::seed(&store, &DemoSpec::new(seed, 1, customers), now()).unwrap();
    store
}

/// Adds a customer whose only order is `since_last_order` before `now()`.
/// Ids above 100_000 stay clear of the demo population.
fn add_dormant_customer(store: &CustomerStore, id: CustomerId, since_last_order: Duration) {
    store
        .insert_customer(&NewCustomer {
            id,
            store_id: 1,
            created_at: now() - Duration::days(500),
            tags: vec![],
        })
        .unwrap();
    store
        .insert_order(&Order {
            order_id: id * 10,
            customer_id: id,
            created_at: now() - since_last_order,
            processed_at: None,
            total_price: 3_000.0,
        })
        .unwrap();
}

fn make_engine(store: CustomerStore) -> AnalyticsEngine {
    AnalyticsEngine::new(
        Box::new(store),
        Arc::new(MokaCache::new()),
        Arc::new(StaticConfig::default()),
        Arc::new(FixedClock::new(now())),
    )
}

// ── Tests ────────────────────────────────────────────────────────────────────

/// Each dimension partitions the dormant population: counts add up to the
/// summary's dormant total and percentages to 100.
#[test]
fn every_dimension_partitions_dormant_population() {
    let engine = make_engine(demo_store(42, 400));

    let dormant = engine.summary_stats(1).unwrap().total_dormant_customers;
    let segments = engine.segment_distributions(1).unwrap();
    assert!(dormant > 0);

    for dimension in SegmentDimension::ALL {
        let of_dim: Vec<_> = segments.iter().filter(|s| s.dimension() == dimension).collect();
        let count: usize = of_dim.iter().map(|s| s.customer_count).sum();
        let pct: f64 = of_dim.iter().map(|s| s.percentage_of_population).sum();
        assert_eq!(count, dormant, "{dimension:?}");
        assert!((pct - 100.0).abs() < 1e-6, "{dimension:?} percentages sum to {pct}");
        assert!(of_dim.iter().all(|s| s.customer_count > 0), "empty segments are omitted");
    }
}

#[test]
fn dormant_segments_only_cover_buckets_past_threshold() {
    let engine = make_engine(demo_store(7, 300));

    for s in engine.segment_distributions(1).unwrap() {
        if s.dimension() == SegmentDimension::DormancyPeriod {
            assert!(s.average_dormancy_days >= 90, "{} avg={}", s.name, s.average_dormancy_days);
            assert!(
                !s.name.starts_with("0-30") && !s.name.starts_with("31-60") && !s.name.starts_with("61-89"),
                "{}",
                s.name
            );
        }
        assert!((0.0..=1.0).contains(&s.average_churn_probability));
    }
}

/// The six dormancy ranges are disjoint and together cover every
/// customer with orders.
#[test]
fn dormancy_ranges_partition_ordering_customers() {
    let store = demo_store(3, 300);
    let customers = store.get_customers(1, &CustomerFilter::all()).unwrap();

    let mut seen = HashSet::new();
    for bucket in DormancyBucket::ALL {
        let (min, max) = bucket.range();
        for c in customers_in_dormancy_range(&customers, min, max, now()) {
            assert!(seen.insert(c.id), "customer {} in two ranges", c.id);
        }
    }
    let ordering: HashSet<_> = customers.iter().filter(|c| c.has_orders()).map(|c| c.id).collect();
    assert_eq!(seen, ordering);
}

/// Everyone 90+ days out is in one of the three long-dormancy buckets,
/// including customers at exactly 90 days and at 90 days plus some hours.
#[test]
fn long_dormancy_range_is_union_of_long_buckets() {
    let store = demo_store(17, 400);
    add_dormant_customer(&store, 100_001, Duration::days(90));
    add_dormant_customer(&store, 100_002, Duration::days(90) + Duration::hours(5));
    add_dormant_customer(&store, 100_003, Duration::days(89) + Duration::hours(23));
    let customers = store.get_customers(1, &CustomerFilter::all()).unwrap();

    let open: HashSet<_> = customers_in_dormancy_range(&customers, 90, None, now())
        .into_iter()
        .map(|c| c.id)
        .collect();
    let union: HashSet<_> = [DormancyBucket::Days90To180, DormancyBucket::Days181To365, DormancyBucket::Days366Plus]
        .into_iter()
        .flat_map(|b| {
            let (min, max) = b.range();
            customers_in_dormancy_range(&customers, min, max, now())
        })
        .map(|c| c.id)
        .collect();

    assert!(open.contains(&100_001) && open.contains(&100_002));
    assert!(!open.contains(&100_003));
    assert_eq!(open, union);
}

#[test]
fn customer_just_past_threshold_lands_in_first_dormant_bucket() {
    let store = CustomerStore::in_memory().unwrap();
    store.migrate().unwrap();
    add_dormant_customer(&store, 1, Duration::days(90) + Duration::hours(5));
    add_dormant_customer(&store, 2, Duration::days(30));
    let engine = make_engine(store);

    let dormancy: Vec<_> = engine
        .segment_distributions(1)
        .unwrap()
        .into_iter()
        .filter(|s| s.dimension() == SegmentDimension::DormancyPeriod)
        .collect();

    assert_eq!(dormancy.len(), 1);
    assert_eq!(dormancy[0].name, DormancyBucket::Days90To180.label());
    assert_eq!(dormancy[0].customer_count, 1);
    assert_eq!(dormancy[0].average_dormancy_days, 90);
}

#[test]
fn churn_risk_segments_rank_by_potential_loss() {
    let engine = make_engine(demo_store(11, 300));

    let segments = engine.churn_risk_segments(&ChurnRiskRequest::new(1)).unwrap();
    assert!(!segments.is_empty());
    for pair in segments.windows(2) {
        assert!(pair[0].potential_loss >= pair[1].potential_loss);
    }
    for s in &segments {
        let expected = s.segment.total_revenue * s.segment.average_churn_probability;
        assert!((s.potential_loss - expected).abs() < 1e-6);
        assert!(s.risk_factors.len() <= 3);
    }
}

#[test]
fn churn_risk_rejects_inverted_creation_window() {
    let engine = make_engine(demo_store(11, 50));
    let mut request = ChurnRiskRequest::new(1);
    request.created_from = Some(now());
    request.created_to = Some(now() - chrono::Duration::days(1));

    let err = engine.churn_risk_segments(&request).unwrap_err();
    assert!(err.is_invalid_argument(), "{err}");
}

#[test]
fn unknown_store_yields_no_segments() {
    let engine = make_engine(demo_store(5, 50));

    assert!(engine.segment_distributions(77).unwrap().is_empty());
    let summary = engine.summary_stats(77).unwrap();
    assert_eq!(summary.total_dormant_customers, 0);
    assert_eq!(summary.dormant_rate, 0.0);
}
