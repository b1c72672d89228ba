//! SQLite customer store: the reference `DataGateway`.
//!
//! RULE: Only the store talks to the database.
//! Aggregates (order count, spend, last order) are derived from the
//! order table at read time; nothing denormalized can drift.

mod customer;
mod order;

use crate::{
    customer::{CustomerAggregate, CustomerFilter, CustomerTimeline, Order},
    error::AnalyticsResult,
    gateway::DataGateway,
    types::{CustomerId, StoreId},
};
use chrono::{DateTime, Utc};
use rusqlite::{types::Type, Connection};

pub use customer::NewCustomer;

pub struct CustomerStore {
    conn: Connection,
    path: Option<String>, // None for :memory:
}

impl CustomerStore {
    pub fn open(path: &str) -> AnalyticsResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL only applies to real files.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: Some(path.to_string()) })
    }

    /// Open an in-memory database (used in tests and demo runs).
    pub fn in_memory() -> AnalyticsResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// A second connection to the same file. In-memory stores get a
    /// fresh, empty database.
    pub fn reopen(&self) -> AnalyticsResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    pub fn migrate(&self) -> AnalyticsResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_customers.sql"))?;
        Ok(())
    }
}

// ── Row helpers ──────────────────────────────────────────────────────────────

pub(crate) fn to_secs(t: DateTime<Utc>) -> i64 {
    t.timestamp()
}

pub(crate) fn from_secs(column: usize, secs: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            Type::Integer,
            format!("timestamp {secs} out of range").into(),
        )
    })
}

// ── Gateway ──────────────────────────────────────────────────────────────────

impl DataGateway for CustomerStore {
    fn get_customer(&self, id: CustomerId) -> AnalyticsResult<Option<CustomerAggregate>> {
        self.customer_aggregate(id)
    }

    fn get_customers_by_ids(&self, ids: &[CustomerId]) -> AnalyticsResult<Vec<CustomerAggregate>> {
        self.customer_aggregates_by_ids(ids)
    }

    fn get_customers(
        &self,
        store_id: StoreId,
        filter: &CustomerFilter,
    ) -> AnalyticsResult<Vec<CustomerAggregate>> {
        let all = self.store_aggregates(store_id)?;
        Ok(all.into_iter().filter(|c| filter.matches(c)).collect())
    }

    fn get_orders_for_customer(&self, id: CustomerId) -> AnalyticsResult<Vec<Order>> {
        self.orders_for_customer(id)
    }

    fn get_order_history(&self, store_id: StoreId) -> AnalyticsResult<Vec<CustomerTimeline>> {
        self.order_history(store_id)
    }

    fn count_customers_with_orders(&self, store_id: StoreId) -> AnalyticsResult<usize> {
        self.count_ordering_customers(store_id)
    }
}
