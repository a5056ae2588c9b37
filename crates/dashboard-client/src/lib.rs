pub mod backend;
pub mod client;
pub mod error;
pub mod models;
pub mod session;

#[cfg(test)]
mod test_support;

pub use backend::TradingBackend;
pub use client::{unwrap_envelope, DashboardClient, LogRedirect, LoginRedirect};
pub use error::{ApiError, ClientError, ClientResult};
pub use models::*;
pub use session::{FileTokenStore, MemoryTokenStore, Session, SessionManager, TokenStore};

use std::time::Duration;

/// Request timeout applied uniformly to every backend call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Backend REST paths, relative to the API base URL.
pub mod endpoints {
    pub const TOKEN: &str = "/token";
    pub const POSITIONS: &str = "/positions";
    pub const PORTFOLIO_SUMMARY: &str = "/portfolio-summary";
    // Older backends also serve `/risk/adjustments`; this is the canonical path.
    pub const RISK_ADJUSTMENTS: &str = "/risk-adjustments";
    pub const TRADES: &str = "/trades";
    pub const TRADE_STATISTICS: &str = "/trades/statistics";
    pub const SCOUT: &str = "/scout";

    pub fn url(base_url: &str, path: &str) -> String {
        format!("{}{}", base_url.trim_end_matches('/'), path)
    }
}

/// Connection settings for the trading backend.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub identity: Identity,
    /// Where the user is sent when the backend rejects the session.
    pub login_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".to_string(),
            timeout: DEFAULT_TIMEOUT,
            identity: Identity::default(),
            login_url: "/login".to_string(),
        }
    }
}
