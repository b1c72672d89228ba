//! Dormant-customer listing: filter, sort and page the dormant population.

use crate::{
    config::RiskThresholds,
    customer::CustomerAggregate,
    error::{AnalyticsError, AnalyticsResult},
    risk::{classify, RiskLevel},
    scoring,
    segmentation::DormancyBucket,
    types::{CustomerId, StoreId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE:     u32 = 500;

// ── Public types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortField {
    #[default]
    DaysSinceLastOrder,
    TotalSpent,
    TotalOrders,
    ChurnProbability,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DormantFilters {
    pub min_days:   Option<i64>,
    pub max_days:   Option<i64>,
    pub min_spent:  Option<f64>,
    pub max_spent:  Option<f64>,
    pub bucket:     Option<DormancyBucket>,
    pub risk_level: Option<RiskLevel>,
    /// Customers must carry every listed tag.
    pub tags:       Vec<String>,
}

impl DormantFilters {
    pub fn validate(&self) -> AnalyticsResult<()> {
        if let (Some(min), Some(max)) = (self.min_days, self.max_days) {
            if min > max {
                return Err(AnalyticsError::invalid(
                    "max_days",
                    format!("min_days {min} exceeds max_days {max}"),
                ));
            }
        }
        if let (Some(min), Some(max)) = (self.min_spent, self.max_spent) {
            if min > max {
                return Err(AnalyticsError::invalid(
                    "max_spent",
                    format!("min_spent {min} exceeds max_spent {max}"),
                ));
            }
        }
        Ok(())
    }

    fn matches(&self, row: &DormantCustomerRow) -> bool {
        let days = row.days_since_last_order;
        self.min_days.map_or(true, |m| days >= m)
            && self.max_days.map_or(true, |m| days <= m)
            && self.min_spent.map_or(true, |m| row.total_spent >= m)
            && self.max_spent.map_or(true, |m| row.total_spent <= m)
            && self.bucket.map_or(true, |b| row.bucket == b)
            && self.risk_level.map_or(true, |r| row.risk_level == r)
            && self
                .tags
                .iter()
                .all(|t| row.tags.iter().any(|have| have.eq_ignore_ascii_case(t)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DormantCustomerQuery {
    pub store_id:   StoreId,
    pub page:       u32,
    pub page_size:  u32,
    pub sort_by:    SortField,
    pub descending: bool,
    pub filters:    DormantFilters,
}

impl DormantCustomerQuery {
    /// First page, default size, longest-dormant first.
    pub fn new(store_id: StoreId) -> Self {
        Self {
            store_id,
            page:       1,
            page_size:  DEFAULT_PAGE_SIZE,
            sort_by:    SortField::DaysSinceLastOrder,
            descending: true,
            filters:    DormantFilters::default(),
        }
    }

    pub fn validate(&self) -> AnalyticsResult<()> {
        if self.page == 0 {
            return Err(AnalyticsError::invalid("page", "pages are numbered from 1"));
        }
        self.filters.validate()
    }

    pub fn effective_page_size(&self) -> u32 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DormantCustomerRow {
    pub customer_id:           CustomerId,
    pub last_order_date:       DateTime<Utc>,
    pub days_since_last_order: i64,
    pub bucket:                DormancyBucket,
    pub churn_probability:     f64,
    pub risk_level:            RiskLevel,
    pub total_orders:          i64,
    pub total_spent:           f64,
    pub average_order_value:   f64,
    pub tags:                  Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items:        Vec<T>,
    pub page:         u32,
    pub page_size:    u32,
    pub total_items:  usize,
    pub total_pages:  usize,
    pub has_next:     bool,
    pub has_previous: bool,
}

// ── Evaluation ───────────────────────────────────────────────────────────────

fn to_row(c: &CustomerAggregate, now: DateTime<Utc>, thresholds: &RiskThresholds) -> Option<DormantCustomerRow> {
    let last = c.last_order_date?;
    let days = c.days_since_last_order(now)?;
    let probability = scoring::probability(c, now);
    Some(DormantCustomerRow {
        customer_id:           c.id,
        last_order_date:       last,
        days_since_last_order: days,
        bucket:                DormancyBucket::of(days),
        churn_probability:     probability,
        risk_level:            classify(probability, thresholds),
        total_orders:          c.total_orders,
        total_spent:           c.total_spent,
        average_order_value:   c.average_order_value(),
        tags:                  c.tags.clone(),
    })
}

fn filtered_rows(
    dormant: &[CustomerAggregate],
    filters: &DormantFilters,
    now: DateTime<Utc>,
    thresholds: &RiskThresholds,
) -> Vec<DormantCustomerRow> {
    dormant
        .iter()
        .filter_map(|c| to_row(c, now, thresholds))
        .filter(|r| filters.matches(r))
        .collect()
}

fn compare(a: &DormantCustomerRow, b: &DormantCustomerRow, field: SortField) -> Ordering {
    match field {
        SortField::DaysSinceLastOrder => a.days_since_last_order.cmp(&b.days_since_last_order),
        SortField::TotalSpent         => a.total_spent.total_cmp(&b.total_spent),
        SortField::TotalOrders        => a.total_orders.cmp(&b.total_orders),
        SortField::ChurnProbability   => a.churn_probability.total_cmp(&b.churn_probability),
    }
}

/// One page of the filtered, sorted population. Ties break by ascending id.
pub fn run(
    dormant: &[CustomerAggregate],
    query: &DormantCustomerQuery,
    now: DateTime<Utc>,
    thresholds: &RiskThresholds,
) -> AnalyticsResult<Page<DormantCustomerRow>> {
    query.validate()?;
    let mut rows = filtered_rows(dormant, &query.filters, now, thresholds);
    rows.sort_by(|a, b| {
        let primary = compare(a, b, query.sort_by);
        let primary = if query.descending { primary.reverse() } else { primary };
        primary.then(a.customer_id.cmp(&b.customer_id))
    });

    let size = query.effective_page_size() as usize;
    let total_items = rows.len();
    let total_pages = total_items.div_ceil(size);
    let page = query.page as usize;
    let items: Vec<DormantCustomerRow> =
        rows.into_iter().skip((page - 1) * size).take(size).collect();

    Ok(Page {
        items,
        page:         query.page,
        page_size:    size as u32,
        total_items,
        total_pages,
        has_next:     page < total_pages,
        has_previous: page > 1,
    })
}

pub fn count(
    dormant: &[CustomerAggregate],
    filters: &DormantFilters,
    now: DateTime<Utc>,
    thresholds: &RiskThresholds,
) -> AnalyticsResult<usize> {
    filters.validate()?;
    Ok(filtered_rows(dormant, filters, now, thresholds).len())
}
