use anyhow::{Context, Result};
use dashboard_client::{ClientConfig, Identity};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::query::DEFAULT_STALE_TIME;

/// Runtime settings for the sync service, read from the environment.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub client: ClientConfig,
    /// Holds the persisted dashboard state and the session slot.
    pub state_dir: PathBuf,
    pub stale_time: Duration,
    pub json_logging: bool,
}

impl SyncConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = ClientConfig::default();
        let default_identity = Identity::default();

        let timeout_secs: u64 = match var("DASHBOARD_REQUEST_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("DASHBOARD_REQUEST_TIMEOUT_SECS is not a number: {raw}"))?,
            None => defaults.timeout.as_secs(),
        };
        if timeout_secs == 0 {
            anyhow::bail!("DASHBOARD_REQUEST_TIMEOUT_SECS must be greater than zero");
        }

        let stale_secs: u64 = match var("DASHBOARD_STALE_SECS") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("DASHBOARD_STALE_SECS is not a number: {raw}"))?,
            None => DEFAULT_STALE_TIME.as_secs(),
        };
        if stale_secs == 0 {
            anyhow::bail!("DASHBOARD_STALE_SECS must be greater than zero");
        }

        let state_dir = match var("DASHBOARD_STATE_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_dir()
                .context("No data directory on this platform; set DASHBOARD_STATE_DIR")?
                .join("trading-dashboard"),
        };

        Ok(Self {
            client: ClientConfig {
                base_url: var("DASHBOARD_API_URL").unwrap_or(defaults.base_url),
                timeout: Duration::from_secs(timeout_secs),
                identity: Identity {
                    user_id: var("DASHBOARD_USER_ID").unwrap_or(default_identity.user_id),
                    email: var("DASHBOARD_USER_EMAIL").unwrap_or(default_identity.email),
                },
                login_url: var("DASHBOARD_LOGIN_URL").unwrap_or(defaults.login_url),
            },
            state_dir,
            stale_time: Duration::from_secs(stale_secs),
            json_logging: var("RUST_LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        })
    }

    pub fn session_path(&self) -> PathBuf {
        self.state_dir.join("session.json")
    }
}
