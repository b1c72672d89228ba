//! The analytics engine: public façade over scoring, segmentation,
//! trends, reactivation planning and the dormant-customer listing.
//!
//! CALL SHAPE (every operation):
//!   1. Validate arguments (no I/O yet).
//!   2. Read a fresh `ConfigSnapshot` and validate it.
//!   3. Build the cache key from the operation, its full argument shape
//!      and the config fingerprint.
//!   4. `memoize`: on a miss, read from the gateway and run the pure engines.
//!
//! RULES:
//!   - No hidden state. Store id and config travel with every call.
//!   - "Now" comes from the injected clock, read once per call.
//!   - Upstream failures are logged with the operation and its key
//!     parameters, then returned unchanged. Nothing is retried.

use crate::{
    cache::{memoize, CacheKey, CacheLayer},
    clock::Clock,
    config::{ConfigProvider, ConfigSnapshot},
    customer::{CustomerAggregate, CustomerFilter},
    error::{AnalyticsError, AnalyticsResult},
    gateway::DataGateway,
    query::{self, DormantCustomerQuery, DormantCustomerRow, DormantFilters, Page},
    reactivation::{self, ReactivationPotentialStats, RevenueImpact, RevenueImpactRequest},
    risk::{classify, RiskLevel},
    scoring,
    segmentation::{self, ChurnRiskRequest, ChurnRiskSegment, Segment},
    statistics::{self, DormantSummary},
    trend::{self, Granularity, TrendPoint},
    types::{CustomerId, StoreId},
};
use chrono::{DateTime, Duration, Utc};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

pub struct AnalyticsEngine {
    gateway: Box<dyn DataGateway>,
    cache:   Arc<dyn CacheLayer>,
    config:  Arc<dyn ConfigProvider>,
    clock:   Arc<dyn Clock>,
}

impl AnalyticsEngine {
    pub fn new(
        gateway: Box<dyn DataGateway>,
        cache: Arc<dyn CacheLayer>,
        config: Arc<dyn ConfigProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { gateway, cache, config, clock }
    }

    /// Drop every cached result.
    pub fn invalidate_cache(&self) -> AnalyticsResult<()> {
        self.cache.invalidate_all()
    }

    // ── Churn ────────────────────────────────────────────────────

    /// Churn probability for one customer. Unknown ids score 0.0.
    pub fn churn_probability(&self, customer_id: CustomerId) -> AnalyticsResult<f64> {
        let cfg = self.config()?;
        self.probability_for(customer_id, &cfg)
    }

    fn probability_for(&self, customer_id: CustomerId, cfg: &ConfigSnapshot) -> AnalyticsResult<f64> {
        let now = self.clock.now();
        let key = CacheKey::new("churn")
            .part("customer", customer_id)
            .part("cfg", cfg.fingerprint());

        let result = memoize(self.cache.as_ref(), &key, cfg.churn_ttl(), || {
            let customer = self
                .gateway
                .get_customer(customer_id)?
                .ok_or(AnalyticsError::CustomerNotFound(customer_id))?;
            let score = scoring::score(&customer, now);
            log::debug!(
                "churn: customer={customer_id} probability={:.4}",
                score.probability
            );
            Ok(score.probability)
        });

        match result {
            Err(e) if e.is_not_found() => {
                log::warn!("churn: customer={customer_id} not found, scoring 0.0");
                Ok(0.0)
            }
            other => traced("churn", &format!("customer={customer_id}"), other),
        }
    }

    /// Probabilities for many customers from one gateway read. Duplicate
    /// ids collapse; unknown ids map to 0.0.
    pub fn batch_churn_probability(
        &self,
        customer_ids: &[CustomerId],
    ) -> AnalyticsResult<BTreeMap<CustomerId, f64>> {
        if customer_ids.is_empty() {
            return Err(AnalyticsError::invalid("customer_ids", "at least one id is required"));
        }
        let ids: Vec<CustomerId> = customer_ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        let cfg = self.config()?;
        let now = self.clock.now();
        let key = CacheKey::new("churn_batch")
            .json("ids", &ids)?
            .part("cfg", cfg.fingerprint());

        let result = memoize(self.cache.as_ref(), &key, cfg.churn_ttl(), || {
            let customers = self.gateway.get_customers_by_ids(&ids)?;
            let mut out: BTreeMap<CustomerId, f64> = ids.iter().map(|id| (*id, 0.0)).collect();
            for s in scoring::score_population(&customers, now) {
                out.insert(s.customer_id, s.probability);
            }
            let missing = ids.len().saturating_sub(customers.len());
            if missing > 0 {
                log::warn!("churn_batch: {missing} of {} ids not found, scoring 0.0", ids.len());
            }
            log::debug!("churn_batch: scored {} customers", customers.len());
            Ok(out)
        });
        traced("churn_batch", &format!("ids={}", ids.len()), result)
    }

    pub fn risk_level(&self, customer_id: CustomerId) -> AnalyticsResult<RiskLevel> {
        let cfg = self.config()?;
        let p = self.probability_for(customer_id, &cfg)?;
        Ok(classify(p, &cfg.risk_thresholds))
    }

    // ── Segments ─────────────────────────────────────────────────

    /// Dormancy, spending and frequency segments of the store's dormant
    /// customers.
    pub fn segment_distributions(&self, store_id: StoreId) -> AnalyticsResult<Vec<Segment>> {
        let cfg = self.config()?;
        let now = self.clock.now();
        let key = CacheKey::new("segments")
            .part("store", store_id)
            .part("cfg", cfg.fingerprint());

        let result = memoize(self.cache.as_ref(), &key, cfg.analytics_ttl(), || {
            let dormant = self.dormant_population(store_id, &cfg, now)?;
            let segments = segmentation::distribute_all(&dormant, now, &cfg.risk_thresholds);
            log::info!(
                "segments: store={store_id} dormant={} segments={}",
                dormant.len(),
                segments.len()
            );
            Ok(segments)
        });
        traced("segments", &format!("store={store_id}"), result)
    }

    /// Churn-risk segments over all customers of the store, ranked by
    /// potential loss.
    pub fn churn_risk_segments(&self, request: &ChurnRiskRequest) -> AnalyticsResult<Vec<ChurnRiskSegment>> {
        request.validate()?;
        let cfg = self.config()?;
        let now = self.clock.now();
        let store_id = request.store_id;
        let key = CacheKey::new("churn_risk")
            .json("req", request)?
            .part("cfg", cfg.fingerprint());

        let result = memoize(self.cache.as_ref(), &key, cfg.analytics_ttl(), || {
            let filter = CustomerFilter {
                created_from: request.created_from,
                created_to:   request.created_to,
                ..CustomerFilter::all()
            };
            let customers = self.gateway.get_customers(store_id, &filter)?;
            let segments = segmentation::churn_risk_segments(
                &customers,
                now,
                &cfg.risk_thresholds,
                cfg.dormancy_threshold_days,
            );
            log::info!(
                "churn_risk: store={store_id} customers={} segments={}",
                customers.len(),
                segments.len()
            );
            Ok(segments)
        });
        traced("churn_risk", &format!("store={store_id}"), result)
    }

    // ── Trends ───────────────────────────────────────────────────

    pub fn trends(
        &self,
        store_id: StoreId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: Granularity,
    ) -> AnalyticsResult<Vec<TrendPoint>> {
        if start > end {
            return Err(AnalyticsError::invalid("start", format!("start {start} is after end {end}")));
        }
        let cfg = self.config()?;
        let threshold = cfg.dormancy_threshold_days;
        let key = CacheKey::new("trends")
            .part("store", store_id)
            .part("start", start.to_rfc3339())
            .part("end", end.to_rfc3339())
            .part("granularity", granularity)
            .part("cfg", cfg.fingerprint());

        let result = memoize(self.cache.as_ref(), &key, cfg.analytics_ttl(), || {
            let timelines = self.gateway.get_order_history(store_id)?;
            let points = trend::analyze(&timelines, start, end, granularity, threshold)?;
            log::info!(
                "trends: store={store_id} granularity={granularity} customers={} points={}",
                timelines.len(),
                points.len()
            );
            Ok(points)
        });
        traced(
            "trends",
            &format!("store={store_id} start={start} end={end} granularity={granularity}"),
            result,
        )
    }

    // ── Reactivation ─────────────────────────────────────────────

    pub fn reactivation_potential(&self, store_id: StoreId) -> AnalyticsResult<ReactivationPotentialStats> {
        let cfg = self.config()?;
        let now = self.clock.now();
        let key = CacheKey::new("reactivation")
            .part("store", store_id)
            .part("cfg", cfg.fingerprint());

        let result = memoize(self.cache.as_ref(), &key, cfg.analytics_ttl(), || {
            let dormant = self.dormant_population(store_id, &cfg, now)?;
            let stats = reactivation::potential_stats(&dormant, now);
            log::info!(
                "reactivation: store={store_id} high={} medium={} low={} revenue={:.0}",
                stats.high_potential_customers,
                stats.medium_potential_customers,
                stats.low_potential_customers,
                stats.estimated_reactivation_revenue
            );
            Ok(stats)
        });
        traced("reactivation", &format!("store={store_id}"), result)
    }

    pub fn revenue_impact(&self, request: &RevenueImpactRequest) -> AnalyticsResult<RevenueImpact> {
        if request.start >= request.end {
            return Err(AnalyticsError::invalid(
                "start",
                format!("start {} must be before end {}", request.start, request.end),
            ));
        }
        let cfg = self.config()?;
        let now = self.clock.now();
        let store_id = request.store_id;
        let key = CacheKey::new("revenue_impact")
            .json("req", request)?
            .part("cfg", cfg.fingerprint());

        let result = memoize(self.cache.as_ref(), &key, cfg.analytics_ttl(), || {
            let dormant = self.dormant_population(store_id, &cfg, now)?;
            let impact = reactivation::revenue_impact(&dormant, request, now);
            log::info!(
                "revenue_impact: store={store_id} historical={:.0} recoverable={:.0}",
                impact.historical_loss,
                impact.recoverable_potential
            );
            Ok(impact)
        });
        traced(
            "revenue_impact",
            &format!("store={store_id} start={} end={}", request.start, request.end),
            result,
        )
    }

    // ── Dormant population ───────────────────────────────────────

    pub fn summary_stats(&self, store_id: StoreId) -> AnalyticsResult<DormantSummary> {
        let cfg = self.config()?;
        let now = self.clock.now();
        let key = CacheKey::new("summary")
            .part("store", store_id)
            .part("cfg", cfg.fingerprint());

        let result = memoize(self.cache.as_ref(), &key, cfg.analytics_ttl(), || {
            let dormant = self.dormant_population(store_id, &cfg, now)?;
            let with_orders = self.gateway.count_customers_with_orders(store_id)?;
            let summary = statistics::summarize(&dormant, with_orders, now, &cfg.risk_thresholds);
            log::info!(
                "summary: store={store_id} dormant={} rate={}%",
                summary.total_dormant_customers,
                summary.dormant_rate
            );
            Ok(summary)
        });
        traced("summary", &format!("store={store_id}"), result)
    }

    pub fn dormant_customers(
        &self,
        query: &DormantCustomerQuery,
    ) -> AnalyticsResult<Page<DormantCustomerRow>> {
        query.validate()?;
        let cfg = self.config()?;
        let now = self.clock.now();
        let store_id = query.store_id;
        let key = CacheKey::new("dormant_list")
            .json("query", query)?
            .part("cfg", cfg.fingerprint());

        let result = memoize(self.cache.as_ref(), &key, cfg.query_ttl(), || {
            let dormant = self.dormant_population(store_id, &cfg, now)?;
            let page = query::run(&dormant, query, now, &cfg.risk_thresholds)?;
            log::debug!(
                "dormant_list: store={store_id} page={} items={} total={}",
                page.page,
                page.items.len(),
                page.total_items
            );
            Ok(page)
        });
        traced(
            "dormant_list",
            &format!("store={store_id} page={} size={}", query.page, query.page_size),
            result,
        )
    }

    pub fn dormant_customer_count(
        &self,
        store_id: StoreId,
        filters: &DormantFilters,
    ) -> AnalyticsResult<usize> {
        filters.validate()?;
        let cfg = self.config()?;
        let now = self.clock.now();
        let key = CacheKey::new("dormant_count")
            .part("store", store_id)
            .json("filters", filters)?
            .part("cfg", cfg.fingerprint());

        let result = memoize(self.cache.as_ref(), &key, cfg.query_ttl(), || {
            let dormant = self.dormant_population(store_id, &cfg, now)?;
            query::count(&dormant, filters, now, &cfg.risk_thresholds)
        });
        traced("dormant_count", &format!("store={store_id}"), result)
    }

    // ── Internals ────────────────────────────────────────────────

    fn config(&self) -> AnalyticsResult<ConfigSnapshot> {
        let cfg = self
            .config
            .snapshot()
            .inspect_err(|e| log::error!("config: snapshot failed: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Customers with orders whose last order predates `now − threshold`.
    fn dormant_population(
        &self,
        store_id: StoreId,
        cfg: &ConfigSnapshot,
        now: DateTime<Utc>,
    ) -> AnalyticsResult<Vec<CustomerAggregate>> {
        let cutoff = now - Duration::days(cfg.dormancy_threshold_days);
        self.gateway
            .get_customers(store_id, &CustomerFilter::dormant_before(cutoff))
    }
}

/// Log a failed operation with its context. Caller mistakes go to `warn`,
/// upstream faults to `error`. The result passes through unchanged.
fn traced<T>(op: &str, context: &str, result: AnalyticsResult<T>) -> AnalyticsResult<T> {
    result.inspect_err(|e| {
        if e.is_invalid_argument() {
            log::warn!("{op}: {context} rejected: {e}");
        } else {
            log::error!("{op}: {context} failed: {e}");
        }
    })
}
