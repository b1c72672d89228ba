//! Data gateway: the engine's read-only view of customers and orders.
//!
//! RULE: The engine never talks to a database directly. Every read goes
//! through this trait so the analytics can run over SQLite, fixtures or
//! any other source.

use crate::{
    customer::{CustomerAggregate, CustomerFilter, CustomerTimeline, Order},
    error::AnalyticsResult,
    types::{CustomerId, StoreId},
};

pub trait DataGateway: Send {
    fn get_customer(&self, id: CustomerId) -> AnalyticsResult<Option<CustomerAggregate>>;

    /// Every resolvable id in one round trip. Missing ids are simply absent.
    fn get_customers_by_ids(&self, ids: &[CustomerId]) -> AnalyticsResult<Vec<CustomerAggregate>>;

    fn get_customers(
        &self,
        store_id: StoreId,
        filter: &CustomerFilter,
    ) -> AnalyticsResult<Vec<CustomerAggregate>>;

    fn get_orders_for_customer(&self, id: CustomerId) -> AnalyticsResult<Vec<Order>>;

    /// Every customer's effective order timestamps for one store, ascending.
    fn get_order_history(&self, store_id: StoreId) -> AnalyticsResult<Vec<CustomerTimeline>>;

    fn count_customers_with_orders(&self, store_id: StoreId) -> AnalyticsResult<usize> {
        let all = self.get_customers(store_id, &CustomerFilter::all())?;
        Ok(all.iter().filter(|c| c.has_orders()).count())
    }
}
