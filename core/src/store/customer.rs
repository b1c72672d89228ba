use super::{from_secs, to_secs, CustomerStore};
use crate::{
    customer::{CustomerAggregate, Order},
    error::AnalyticsResult,
    types::{CustomerId, StoreId},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, types::Type, OptionalExtension, Row};

/// A customer row as written by fixtures and the demo seeder.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCustomer {
    pub id:         CustomerId,
    pub store_id:   StoreId,
    pub created_at: DateTime<Utc>,
    pub tags:       Vec<String>,
}

const ID_CHUNK: usize = 500;

const AGGREGATE_SELECT: &str =
    "SELECT c.customer_id, c.store_id, c.created_at, c.tags,
            COUNT(o.order_id),
            COALESCE(SUM(o.total_price), 0.0),
            MAX(COALESCE(o.processed_at, o.created_at))
     FROM customer c
     LEFT JOIN customer_order o ON o.customer_id = c.customer_id";

fn aggregate_from_row(row: &Row<'_>) -> rusqlite::Result<CustomerAggregate> {
    let tags_json: String = row.get(3)?;
    let tags: Vec<String> = serde_json::from_str(&tags_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
    let last_order = match row.get::<_, Option<i64>>(6)? {
        Some(secs) => Some(from_secs(6, secs)?),
        None => None,
    };
    Ok(CustomerAggregate {
        id:              row.get(0)?,
        store_id:        row.get(1)?,
        created_at:      from_secs(2, row.get(2)?)?,
        tags,
        total_orders:    row.get(4)?,
        total_spent:     row.get(5)?,
        last_order_date: last_order,
    })
}

impl CustomerStore {
    // ── Writes ───────────────────────────────────────────────────

    pub fn insert_customer(&self, c: &NewCustomer) -> AnalyticsResult<()> {
        self.conn.execute(
            "INSERT INTO customer (customer_id, store_id, created_at, tags)
             VALUES (?1, ?2, ?3, ?4)",
            params![c.id, c.store_id, to_secs(c.created_at), serde_json::to_string(&c.tags)?],
        )?;
        Ok(())
    }

    /// Insert customers and orders in one transaction.
    pub fn insert_population(&self, customers: &[NewCustomer], orders: &[Order]) -> AnalyticsResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        for c in customers {
            self.insert_customer(c)?;
        }
        for o in orders {
            self.insert_order(o)?;
        }
        tx.commit()?;
        log::debug!(
            "store: inserted customers={} orders={}",
            customers.len(),
            orders.len()
        );
        Ok(())
    }

    // ── Aggregates ───────────────────────────────────────────────

    pub(super) fn customer_aggregate(&self, id: CustomerId) -> AnalyticsResult<Option<CustomerAggregate>> {
        let sql = format!("{AGGREGATE_SELECT} WHERE c.customer_id = ?1 GROUP BY c.customer_id");
        let found = self
            .conn
            .query_row(&sql, params![id], aggregate_from_row)
            .optional()?;
        Ok(found)
    }

    /// Ids are bound in chunks of `ID_CHUNK`; SQLite caps host parameters
    /// per statement at 32766.
    pub(super) fn customer_aggregates_by_ids(
        &self,
        ids: &[CustomerId],
    ) -> AnalyticsResult<Vec<CustomerAggregate>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut rows = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(ID_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "{AGGREGATE_SELECT} WHERE c.customer_id IN ({placeholders})
                 GROUP BY c.customer_id"
            );
            let mut stmt = self.conn.prepare_cached(&sql)?;
            let found = stmt
                .query_map(params_from_iter(chunk.iter()), aggregate_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows.extend(found);
        }
        rows.sort_by_key(|c| c.id);
        rows.dedup_by_key(|c| c.id);
        log::debug!(
            "store: aggregates by id requested={} chunks={} found={}",
            ids.len(),
            ids.len().div_ceil(ID_CHUNK),
            rows.len()
        );
        Ok(rows)
    }

    pub(super) fn store_aggregates(&self, store_id: StoreId) -> AnalyticsResult<Vec<CustomerAggregate>> {
        let sql = format!(
            "{AGGREGATE_SELECT} WHERE c.store_id = ?1
             GROUP BY c.customer_id ORDER BY c.customer_id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![store_id], aggregate_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub(super) fn count_ordering_customers(&self, store_id: StoreId) -> AnalyticsResult<usize> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT c.customer_id)
             FROM customer c
             JOIN customer_order o ON o.customer_id = c.customer_id
             WHERE c.store_id = ?1",
            params![store_id],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }
}
