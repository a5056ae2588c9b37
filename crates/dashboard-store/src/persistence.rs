use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::StoreResult;
use crate::models::{Alert, Preferences};
use crate::store::{DashboardStore, SubscriptionId};

/// Namespaced key of the persisted entry.
pub const STORAGE_KEY: &str = "trading-dashboard-storage";

pub const SNAPSHOT_VERSION: u32 = 1;

/// What survives a restart. Notifications and connection status are not
/// part of it and reset on every start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSnapshot {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub preferences: Preferences,
    #[serde(default)]
    pub alerts: Vec<Alert>,
}

fn default_version() -> u32 {
    SNAPSHOT_VERSION
}

impl PersistedSnapshot {
    pub fn new(preferences: Preferences, alerts: Vec<Alert>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            preferences,
            alerts,
        }
    }
}

/// Durable key-value slot holding the serialized snapshot.
pub trait StateStorage: Send + Sync {
    fn read(&self) -> StoreResult<Option<String>>;
    fn write(&self, contents: &str) -> StoreResult<()>;
}

/// One JSON file per key inside a state directory.
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(format!("{}.json", STORAGE_KEY)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStorage for FileStorage {
    fn read(&self) -> StoreResult<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, contents: &str) -> StoreResult<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        // Write then rename so a crash mid-write never truncates the entry.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStorage {
    entry: Mutex<Option<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw(&self) -> Option<String> {
        self.entry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl StateStorage for MemoryStorage {
    fn read(&self) -> StoreResult<Option<String>> {
        Ok(self.raw())
    }

    fn write(&self, contents: &str) -> StoreResult<()> {
        *self.entry.lock().unwrap_or_else(PoisonError::into_inner) = Some(contents.to_string());
        Ok(())
    }
}

pub fn load_snapshot(storage: &dyn StateStorage) -> StoreResult<Option<PersistedSnapshot>> {
    match storage.read()? {
        Some(raw) if !raw.trim().is_empty() => Ok(Some(serde_json::from_str(&raw)?)),
        _ => Ok(None),
    }
}

pub fn save_snapshot(storage: &dyn StateStorage, snapshot: &PersistedSnapshot) -> StoreResult<()> {
    let json = serde_json::to_string_pretty(snapshot)?;
    storage.write(&json)
}

/// Build a store from storage. Unreadable or corrupt entries fall back to
/// defaults rather than blocking startup.
pub fn restore(storage: &dyn StateStorage) -> DashboardStore {
    match load_snapshot(storage) {
        Ok(Some(snapshot)) => {
            tracing::info!(
                alerts = snapshot.alerts.len(),
                "Restored persisted dashboard state"
            );
            DashboardStore::from_persisted(snapshot)
        }
        Ok(None) => {
            tracing::info!("No persisted dashboard state found, starting fresh");
            DashboardStore::default()
        }
        Err(e) => {
            tracing::warn!("Discarding unreadable dashboard state: {}", e);
            DashboardStore::default()
        }
    }
}

struct Written {
    revision: u64,
    snapshot: PersistedSnapshot,
}

/// Persist `{preferences, alerts}` after every mutation that touches them.
///
/// A notification for a state older than the last one seen is dropped, so
/// the entry never goes back to an earlier revision.
pub fn attach(store: &DashboardStore, storage: Arc<dyn StateStorage>) -> SubscriptionId {
    let current = store.snapshot();
    let last_written = Mutex::new(Written {
        revision: current.revision,
        snapshot: current.persisted(),
    });
    store.subscribe(move |state| {
        let mut last = last_written.lock().unwrap_or_else(PoisonError::into_inner);
        if state.revision <= last.revision {
            tracing::debug!(
                revision = state.revision,
                written = last.revision,
                "Skipping outdated dashboard state"
            );
            return;
        }
        let snapshot = state.persisted();
        if last.snapshot == snapshot {
            last.revision = state.revision;
            return;
        }
        match save_snapshot(storage.as_ref(), &snapshot) {
            Ok(()) => {
                tracing::debug!(revision = state.revision, "Persisted dashboard state");
                *last = Written {
                    revision: state.revision,
                    snapshot,
                };
            }
            Err(e) => tracing::error!("Failed to persist dashboard state: {}", e),
        }
    })
}
