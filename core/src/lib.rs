//! Customer dormancy and churn-risk analytics.
//!
//! Pure engines (`scoring`, `risk`, `segmentation`, `trend`,
//! `reactivation`, `statistics`, `query`) compute over immutable customer
//! snapshots. `engine::AnalyticsEngine` wires them to a `DataGateway`,
//! a `CacheLayer`, a `ConfigProvider` and a `Clock`.

pub mod cache;
pub mod clock;
pub mod config;
pub mod customer;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod population;
pub mod query;
pub mod reactivation;
pub mod risk;
pub mod rng;
pub mod scoring;
pub mod segmentation;
pub mod statistics;
pub mod step;
pub mod store;
pub mod trend;
pub mod types;

pub use engine::AnalyticsEngine;
pub use error::{AnalyticsError, AnalyticsResult};
