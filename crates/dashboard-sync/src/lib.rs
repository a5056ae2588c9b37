//! Keeps the dashboard's portfolio views fresh: aggregates backend
//! resources into metrics, caches them with stale-while-revalidate
//! semantics and refreshes them on the user's cadence.

pub mod aggregator;
pub mod config;
pub mod error;
pub mod metrics;
pub mod query;
pub mod refresh;

pub use aggregator::{CycleReport, PortfolioAggregator};
pub use config::SyncConfig;
pub use error::{AggregationError, AggregationResult};
pub use metrics::derive_metrics;
pub use query::{Query, QueryState, Refresh, RefreshMode, DEFAULT_STALE_TIME};
pub use refresh::{ConsumerGuard, RefreshScheduler};
