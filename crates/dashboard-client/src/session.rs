use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::client::unwrap_envelope;
use crate::endpoints;
use crate::error::{ApiError, ClientError, ClientResult};
use crate::models::{Identity, TokenResponse};

/// Bearer credential held by the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub issued_at: DateTime<Utc>,
}

impl Session {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            issued_at: Utc::now(),
        }
    }
}

/// Token attached to an outbound request, tagged with the session
/// generation it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionTicket {
    pub token: Option<String>,
    pub generation: u64,
}

// ---------------------------------------------------------------------------
// Persisted slot
// ---------------------------------------------------------------------------

/// Durable slot for the session token, surviving process restarts.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Option<Session>;
    fn save(&self, session: &Session) -> std::io::Result<()>;
    fn clear(&self) -> std::io::Result<()>;
}

#[derive(Default)]
pub struct MemoryTokenStore {
    slot: Mutex<Option<Session>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        Self {
            slot: Mutex::new(Some(session)),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<Session> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn save(&self, session: &Session) -> std::io::Result<()> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> std::io::Result<()> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// JSON file slot, e.g. `<state dir>/session.json`.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Option<Session> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "Failed to read session slot: {}", e);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "Ignoring corrupt session slot: {}", e);
                None
            }
        }
    }

    fn save(&self, session: &Session) -> std::io::Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string(session)?;
        std::fs::write(&self.path, json)
    }

    fn clear(&self) -> std::io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Session manager
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Slot {
    session: Option<Session>,
    generation: u64,
    loaded: bool,
}

/// Acquires, caches and invalidates the dashboard's bearer token.
///
/// There is no login step: the token is issued for a fixed identity. The
/// token is never validated proactively; expiry is learned from a 401.
pub struct SessionManager {
    http: reqwest::Client,
    token_url: String,
    identity: Identity,
    store: Arc<dyn TokenStore>,
    slot: RwLock<Slot>,
    acquire: tokio::sync::Mutex<()>,
}

impl SessionManager {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        identity: Identity,
        store: Arc<dyn TokenStore>,
    ) -> Self {
        Self {
            http,
            token_url: endpoints::url(base_url, endpoints::TOKEN),
            identity,
            store,
            slot: RwLock::new(Slot::default()),
            acquire: tokio::sync::Mutex::new(()),
        }
    }

    /// Return the cached session, acquiring one if none is held.
    ///
    /// Concurrent callers share a single acquisition request.
    pub async fn ensure_session(&self) -> ClientResult<Session> {
        if let Some(session) = self.cached() {
            return Ok(session);
        }

        let _guard = self.acquire.lock().await;
        if let Some(session) = self.cached() {
            return Ok(session);
        }

        match self.request_token().await {
            Ok(session) => {
                self.install(session.clone());
                tracing::info!("Session acquired for {}", self.identity.user_id);
                Ok(session)
            }
            Err(e) => {
                tracing::error!("Session acquisition failed: {}", e);
                Err(ClientError::Session(e))
            }
        }
    }

    /// Current token (if any) without triggering acquisition.
    pub fn ticket(&self) -> SessionTicket {
        self.cached();
        let slot = self.read_slot();
        SessionTicket {
            token: slot.session.as_ref().map(|s| s.token.clone()),
            generation: slot.generation,
        }
    }

    pub fn current(&self) -> Option<Session> {
        self.cached()
    }

    /// Drop the cached token unconditionally.
    pub fn invalidate(&self) {
        let mut slot = self.write_slot();
        slot.loaded = true;
        slot.session = None;
        slot.generation += 1;
        drop(slot);
        self.clear_store();
    }

    /// Drop the cached token if it still belongs to `generation`.
    ///
    /// Returns `true` only for the first caller per generation, so a burst
    /// of 401s from requests sharing one token reports a single expiry.
    pub fn expire(&self, generation: u64) -> bool {
        let mut slot = self.write_slot();
        if slot.generation != generation {
            return false;
        }
        slot.loaded = true;
        slot.session = None;
        slot.generation += 1;
        drop(slot);
        self.clear_store();
        true
    }

    fn cached(&self) -> Option<Session> {
        {
            let slot = self.read_slot();
            if slot.loaded {
                return slot.session.clone();
            }
        }

        let mut slot = self.write_slot();
        if !slot.loaded {
            slot.loaded = true;
            slot.session = self.store.load().filter(|s| !s.token.trim().is_empty());
            if slot.session.is_some() {
                tracing::debug!("Restored persisted session token");
            }
        }
        slot.session.clone()
    }

    fn install(&self, session: Session) {
        if let Err(e) = self.store.save(&session) {
            tracing::warn!("Failed to persist session token: {}", e);
        }
        let mut slot = self.write_slot();
        slot.loaded = true;
        slot.session = Some(session);
        slot.generation += 1;
    }

    fn clear_store(&self) {
        if let Err(e) = self.store.clear() {
            tracing::warn!("Failed to clear persisted session token: {}", e);
        }
    }

    async fn request_token(&self) -> Result<Session, ApiError> {
        let response = self
            .http
            .post(&self.token_url)
            .json(&self.identity)
            .send()
            .await
            .map_err(|e| ApiError::from_transport(&e))?;

        let status = response.status();
        let request_id = response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_response_body(
                status.as_u16(),
                &body,
                request_id,
            ));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ApiError::new(status.as_u16(), "INVALID_RESPONSE", e.to_string()))?;
        let parsed: TokenResponse = serde_json::from_value(unwrap_envelope(body))
            .map_err(|e| ApiError::new(status.as_u16(), "INVALID_RESPONSE", e.to_string()))?;

        if parsed.token.trim().is_empty() {
            return Err(ApiError::new(
                status.as_u16(),
                "INVALID_RESPONSE",
                "token endpoint returned an empty token",
            ));
        }

        Ok(Session::new(parsed.token))
    }

    fn read_slot(&self) -> std::sync::RwLockReadGuard<'_, Slot> {
        self.slot.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_slot(&self) -> std::sync::RwLockWriteGuard<'_, Slot> {
        self.slot.write().unwrap_or_else(PoisonError::into_inner)
    }
}
