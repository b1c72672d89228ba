use super::{from_secs, to_secs, CustomerStore};
use crate::{
    customer::{CustomerTimeline, Order},
    error::AnalyticsResult,
    types::{CustomerId, StoreId},
};
use chrono::{DateTime, Utc};
use rusqlite::params;

impl CustomerStore {
    // ── Orders ───────────────────────────────────────────────────

    pub fn insert_order(&self, o: &Order) -> AnalyticsResult<()> {
        self.conn.execute(
            "INSERT INTO customer_order (order_id, customer_id, created_at, processed_at, total_price)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                o.order_id,
                o.customer_id,
                to_secs(o.created_at),
                o.processed_at.map(to_secs),
                o.total_price,
            ],
        )?;
        Ok(())
    }

    pub(super) fn orders_for_customer(&self, id: CustomerId) -> AnalyticsResult<Vec<Order>> {
        let mut stmt = self.conn.prepare(
            "SELECT order_id, customer_id, created_at, processed_at, total_price
             FROM customer_order
             WHERE customer_id = ?1
             ORDER BY COALESCE(processed_at, created_at), order_id",
        )?;
        let orders = stmt
            .query_map(params![id], |row| {
                let processed_at = match row.get::<_, Option<i64>>(3)? {
                    Some(secs) => Some(from_secs(3, secs)?),
                    None => None,
                };
                Ok(Order {
                    order_id:    row.get(0)?,
                    customer_id: row.get(1)?,
                    created_at:  from_secs(2, row.get(2)?)?,
                    processed_at,
                    total_price: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(orders)
    }

    /// Effective order timestamps grouped per customer. Customers without
    /// orders are omitted.
    pub(super) fn order_history(&self, store_id: StoreId) -> AnalyticsResult<Vec<CustomerTimeline>> {
        let mut stmt = self.conn.prepare(
            "SELECT o.customer_id, COALESCE(o.processed_at, o.created_at) AS effective
             FROM customer_order o
             JOIN customer c ON c.customer_id = o.customer_id
             WHERE c.store_id = ?1
             ORDER BY o.customer_id, effective",
        )?;
        let rows: Vec<(CustomerId, DateTime<Utc>)> = stmt
            .query_map(params![store_id], |row| {
                Ok((row.get(0)?, from_secs(1, row.get(1)?)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut timelines: Vec<CustomerTimeline> = Vec::new();
        let mut current: Option<(CustomerId, Vec<DateTime<Utc>>)> = None;
        for (customer_id, at) in rows {
            if let Some((id, orders)) = current.as_mut() {
                if *id == customer_id {
                    orders.push(at);
                    continue;
                }
            }
            if let Some((id, orders)) = current.replace((customer_id, vec![at])) {
                timelines.push(CustomerTimeline::new(id, orders));
            }
        }
        if let Some((id, orders)) = current {
            timelines.push(CustomerTimeline::new(id, orders));
        }
        Ok(timelines)
    }
}
