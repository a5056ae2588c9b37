//! Client-side dashboard state: preferences, notifications and alerts.
//!
//! Preferences and alerts are persisted across restarts through a
//! [`StateStorage`]; everything else lives only as long as the process.

pub mod alert_engine;
pub mod error;
pub mod models;
pub mod persistence;
pub mod store;

pub use alert_engine::{AlertEngine, LiveData, PORTFOLIO_SYMBOL};
pub use error::{StoreError, StoreResult};
pub use models::*;
pub use persistence::{FileStorage, MemoryStorage, PersistedSnapshot, StateStorage, STORAGE_KEY};
pub use store::{DashboardState, DashboardStore, SubscriptionId};
