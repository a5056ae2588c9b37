use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

use crate::error::StoreResult;
use crate::models::*;
use crate::persistence::{self, PersistedSnapshot, StateStorage};

/// Full client-side state. Only `preferences` and `alerts` outlive the
/// process; the rest resets on every start.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardState {
    pub preferences: Preferences,
    /// Newest first, at most [`MAX_NOTIFICATIONS`].
    pub notifications: Vec<Notification>,
    /// Insertion order.
    pub alerts: Vec<Alert>,
    pub is_connected: bool,
    pub last_updated: Option<DateTime<Utc>>,
    /// Bumped by every applied mutation. Listeners may run out of order
    /// across threads; a higher revision is always the newer state.
    pub revision: u64,
}

impl Default for DashboardState {
    fn default() -> Self {
        Self {
            preferences: Preferences::default(),
            notifications: Vec::new(),
            alerts: Vec::new(),
            is_connected: true,
            last_updated: None,
            revision: 0,
        }
    }
}

impl DashboardState {
    pub fn unread_count(&self) -> usize {
        self.notifications.iter().filter(|n| !n.read).count()
    }

    /// The slice of state that is written to durable storage.
    pub fn persisted(&self) -> PersistedSnapshot {
        PersistedSnapshot::new(self.preferences.clone(), self.alerts.clone())
    }
}

type Listener = Arc<dyn Fn(&DashboardState) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Shared store for preferences, notifications and alerts.
///
/// Every mutation builds a new snapshot and swaps it in under the write
/// lock, so readers only ever see whole states. Listeners run after the
/// lock is released and may call back into the store.
pub struct DashboardStore {
    state: RwLock<Arc<DashboardState>>,
    listeners: RwLock<Vec<(SubscriptionId, Listener)>>,
    next_id: AtomicU64,
}

impl Default for DashboardStore {
    fn default() -> Self {
        Self::new(DashboardState::default())
    }
}

impl DashboardStore {
    pub fn new(initial: DashboardState) -> Self {
        Self {
            state: RwLock::new(Arc::new(initial)),
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Rebuild from a persisted snapshot; ephemeral fields start at defaults
    /// and out-of-range preferences are reset.
    pub fn from_persisted(snapshot: PersistedSnapshot) -> Self {
        Self::new(DashboardState {
            preferences: snapshot.preferences.sanitized(),
            alerts: snapshot.alerts,
            ..DashboardState::default()
        })
    }

    /// See [`persistence::restore`].
    pub fn restore(storage: &dyn StateStorage) -> Self {
        persistence::restore(storage)
    }

    // -- Subscriptions --------------------------------------------------------

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&DashboardState) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(existing, _)| *existing != id);
    }

    /// Apply `mutate` to a copy of the current state. Returning `None`
    /// means nothing changed: the copy is dropped and no listener runs.
    fn update<R>(&self, mutate: impl FnOnce(&mut DashboardState) -> Option<R>) -> Option<R> {
        let (result, snapshot) = {
            let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let mut next = DashboardState::clone(&guard);
            let result = mutate(&mut next)?;
            next.revision += 1;
            let snapshot = Arc::new(next);
            *guard = snapshot.clone();
            (result, snapshot)
        };

        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(&snapshot);
        }

        Some(result)
    }

    // -- Selectors ------------------------------------------------------------

    pub fn snapshot(&self) -> Arc<DashboardState> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn preferences(&self) -> Preferences {
        self.snapshot().preferences.clone()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.snapshot().notifications.clone()
    }

    pub fn unread_count(&self) -> usize {
        self.snapshot().unread_count()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.snapshot().alerts.clone()
    }

    /// Alerts that have not fired yet.
    pub fn active_alerts(&self) -> Vec<Alert> {
        self.snapshot()
            .alerts
            .iter()
            .filter(|a| !a.triggered)
            .cloned()
            .collect()
    }

    pub fn alerts_for_symbol(&self, symbol: &str) -> Vec<Alert> {
        self.snapshot()
            .alerts
            .iter()
            .filter(|a| a.symbol.eq_ignore_ascii_case(symbol))
            .cloned()
            .collect()
    }

    pub fn is_connected(&self) -> bool {
        self.snapshot().is_connected
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.snapshot().last_updated
    }

    // -- Preferences ----------------------------------------------------------

    /// Shallow-merge `patch` into the preferences record.
    pub fn set_preferences(&self, patch: PreferencesPatch) -> StoreResult<Preferences> {
        let mut failure = None;
        self.update(|state| match state.preferences.merged(&patch) {
            Ok(merged) if merged == state.preferences => None,
            Ok(merged) => {
                state.preferences = merged;
                Some(())
            }
            Err(e) => {
                failure = Some(e);
                None
            }
        });
        match failure {
            Some(e) => Err(e),
            None => Ok(self.preferences()),
        }
    }

    // -- Notifications --------------------------------------------------------

    pub fn add_notification(&self, input: NotificationInput) -> Uuid {
        let notification = Notification {
            id: Uuid::new_v4(),
            kind: input.kind,
            title: input.title,
            message: input.message,
            timestamp: Utc::now(),
            read: false,
        };
        let id = notification.id;
        self.update(move |state| {
            state.notifications.insert(0, notification);
            state.notifications.truncate(MAX_NOTIFICATIONS);
            Some(())
        });
        id
    }

    pub fn mark_notification_read(&self, id: Uuid) {
        self.update(|state| {
            let n = state
                .notifications
                .iter_mut()
                .find(|n| n.id == id && !n.read)?;
            n.read = true;
            Some(())
        });
    }

    pub fn mark_all_notifications_read(&self) {
        self.update(|state| {
            if state.notifications.iter().all(|n| n.read) {
                return None;
            }
            for n in state.notifications.iter_mut() {
                n.read = true;
            }
            Some(())
        });
    }

    pub fn clear_notifications(&self) {
        self.update(|state| {
            if state.notifications.is_empty() {
                return None;
            }
            state.notifications.clear();
            Some(())
        });
    }

    // -- Alerts ---------------------------------------------------------------

    pub fn add_alert(&self, input: AlertInput) -> Uuid {
        let alert = Alert {
            id: Uuid::new_v4(),
            symbol: input.symbol.trim().to_uppercase(),
            kind: input.kind,
            condition: input.condition,
            value: input.value,
            triggered: false,
            created_at: Utc::now(),
        };
        let id = alert.id;
        self.update(move |state| {
            state.alerts.push(alert);
            Some(())
        });
        id
    }

    pub fn remove_alert(&self, id: Uuid) {
        self.update(|state| {
            let before = state.alerts.len();
            state.alerts.retain(|a| a.id != id);
            (state.alerts.len() != before).then_some(())
        });
    }

    pub fn clear_alerts(&self) {
        self.update(|state| {
            if state.alerts.is_empty() {
                return None;
            }
            state.alerts.clear();
            Some(())
        });
    }

    /// Set `triggered` on an alert. Returns `true` only when the flag flipped.
    pub fn trigger_alert(&self, id: Uuid) -> bool {
        self.update(|state| {
            let alert = state
                .alerts
                .iter_mut()
                .find(|a| a.id == id && !a.triggered)?;
            alert.triggered = true;
            Some(())
        })
        .is_some()
    }

    // -- Connection status ----------------------------------------------------

    pub fn set_connected(&self, connected: bool) {
        self.update(|state| {
            if state.is_connected == connected {
                return None;
            }
            state.is_connected = connected;
            Some(())
        });
    }

    pub fn set_last_updated(&self, at: DateTime<Utc>) {
        self.update(|state| {
            if state.last_updated == Some(at) {
                return None;
            }
            state.last_updated = Some(at);
            Some(())
        });
    }

    /// Record a successful sync: connected, stamped with `at`.
    pub fn mark_synced(&self, at: DateTime<Utc>) {
        self.update(|state| {
            state.is_connected = true;
            state.last_updated = Some(at);
            Some(())
        });
    }
}
