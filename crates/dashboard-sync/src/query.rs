use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::AggregationError;

/// How long fetched data counts as fresh.
pub const DEFAULT_STALE_TIME: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// Serve fresh cached data; fetch only when missing or stale.
    IfStale,
    /// Always fetch, waiting behind any cycle already running.
    Force,
    /// Always fetch, unless a cycle for this key is already running.
    Background,
}

/// What a consumer of a query sees.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState<T> {
    /// Last successful value. Kept across later failures.
    pub data: Option<T>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Error from the latest cycle, cleared by the next success.
    pub error: Option<AggregationError>,
    pub is_fetching: bool,
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self {
            data: None,
            updated_at: None,
            error: None,
            is_fetching: false,
        }
    }
}

/// Outcome of one [`Query::refresh`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum Refresh<T> {
    /// Cached data was fresh; nothing was fetched.
    Cached(T),
    Updated(T),
    /// The fetch failed; previous data, if any, is still served.
    Failed(AggregationError),
    /// A background refresh found another cycle in flight.
    Skipped,
}

/// Stale-while-revalidate cache for one query key.
pub struct Query<T> {
    key: &'static str,
    stale_time: Duration,
    state: RwLock<Entry<T>>,
    cycle: Mutex<()>,
}

struct Entry<T> {
    view: QueryState<T>,
    fetched_at: Option<Instant>,
}

impl<T: Clone> Query<T> {
    pub fn new(key: &'static str, stale_time: Duration) -> Self {
        Self {
            key,
            stale_time,
            state: RwLock::new(Entry {
                view: QueryState::default(),
                fetched_at: None,
            }),
            cycle: Mutex::new(()),
        }
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    pub fn state(&self) -> QueryState<T> {
        self.read(|entry| entry.view.clone())
    }

    pub fn data(&self) -> Option<T> {
        self.read(|entry| entry.view.data.clone())
    }

    pub fn is_stale(&self) -> bool {
        self.read(|entry| self.entry_is_stale(entry))
    }

    /// Run one cycle according to `mode`.
    pub async fn refresh<F, Fut>(&self, mode: RefreshMode, fetch: F) -> Refresh<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AggregationError>>,
    {
        if mode == RefreshMode::IfStale {
            if let Some(data) = self.fresh_data() {
                return Refresh::Cached(data);
            }
        }

        let _cycle = match mode {
            RefreshMode::Background => match self.cycle.try_lock() {
                Ok(guard) => guard,
                Err(_) => {
                    tracing::debug!(query = self.key, "Refresh already in flight, skipping");
                    return Refresh::Skipped;
                }
            },
            RefreshMode::IfStale | RefreshMode::Force => self.cycle.lock().await,
        };

        // The cycle we waited behind may have filled the cache.
        if mode == RefreshMode::IfStale {
            if let Some(data) = self.fresh_data() {
                return Refresh::Cached(data);
            }
        }

        let _fetching = FetchingFlag::raise(&self.state);
        match fetch().await {
            Ok(data) => {
                self.write(|entry| {
                    entry.view.data = Some(data.clone());
                    entry.view.updated_at = Some(Utc::now());
                    entry.view.error = None;
                    entry.fetched_at = Some(Instant::now());
                });
                Refresh::Updated(data)
            }
            Err(error) => {
                tracing::warn!(query = self.key, "Refresh failed: {}", error);
                self.write(|entry| entry.view.error = Some(error.clone()));
                Refresh::Failed(error)
            }
        }
    }

    fn fresh_data(&self) -> Option<T> {
        self.read(|entry| {
            if self.entry_is_stale(entry) {
                None
            } else {
                entry.view.data.clone()
            }
        })
    }

    fn entry_is_stale(&self, entry: &Entry<T>) -> bool {
        match entry.fetched_at {
            Some(at) => at.elapsed() >= self.stale_time,
            None => true,
        }
    }

    fn read<R>(&self, f: impl FnOnce(&Entry<T>) -> R) -> R {
        f(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn write(&self, f: impl FnOnce(&mut Entry<T>)) {
        f(&mut self.state.write().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Keeps `is_fetching` set for the lifetime of a fetch, including one that
/// is dropped half way.
struct FetchingFlag<'a, T> {
    state: &'a RwLock<Entry<T>>,
}

impl<'a, T> FetchingFlag<'a, T> {
    fn raise(state: &'a RwLock<Entry<T>>) -> Self {
        state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .view
            .is_fetching = true;
        Self { state }
    }
}

impl<T> Drop for FetchingFlag<'_, T> {
    fn drop(&mut self) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .view
            .is_fetching = false;
    }
}
