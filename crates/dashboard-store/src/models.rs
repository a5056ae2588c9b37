use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

/// Most recent notifications kept; older ones are evicted on insert.
pub const MAX_NOTIFICATIONS: usize = 50;

/// Accepted bounds for the refresh cadence, in seconds.
pub const MIN_REFRESH_INTERVAL_SECS: u64 = 5;
pub const MAX_REFRESH_INTERVAL_SECS: u64 = 3600;

// ---------------------------------------------------------------------------
// Preferences
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    #[default]
    Dark,
    System,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChartPeriod {
    #[serde(rename = "1D")]
    OneDay,
    #[serde(rename = "1W")]
    OneWeek,
    #[default]
    #[serde(rename = "1M")]
    OneMonth,
    #[serde(rename = "3M")]
    ThreeMonths,
    #[serde(rename = "1Y")]
    OneYear,
    #[serde(rename = "ALL")]
    All,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    pub theme: Theme,
    pub default_chart_period: ChartPeriod,
    pub notifications_enabled: bool,
    pub sound_enabled: bool,
    /// Background refresh cadence in seconds.
    pub refresh_interval: u64,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            theme: Theme::Dark,
            default_chart_period: ChartPeriod::OneMonth,
            notifications_enabled: true,
            sound_enabled: false,
            refresh_interval: 30,
        }
    }
}

/// Partial update for [`Preferences`]; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesPatch {
    pub theme: Option<Theme>,
    pub default_chart_period: Option<ChartPeriod>,
    pub notifications_enabled: Option<bool>,
    pub sound_enabled: Option<bool>,
    pub refresh_interval: Option<u64>,
}

pub fn refresh_interval_in_range(secs: u64) -> bool {
    (MIN_REFRESH_INTERVAL_SECS..=MAX_REFRESH_INTERVAL_SECS).contains(&secs)
}

impl Preferences {
    /// Shallow merge; the record is left untouched if any field is invalid.
    pub fn merged(&self, patch: &PreferencesPatch) -> Result<Self, StoreError> {
        if let Some(secs) = patch.refresh_interval {
            if !refresh_interval_in_range(secs) {
                return Err(StoreError::InvalidPreference {
                    field: "refreshInterval",
                    reason: format!(
                        "{} is outside {}..={} seconds",
                        secs, MIN_REFRESH_INTERVAL_SECS, MAX_REFRESH_INTERVAL_SECS
                    ),
                });
            }
        }

        Ok(Self {
            theme: patch.theme.unwrap_or(self.theme),
            default_chart_period: patch.default_chart_period.unwrap_or(self.default_chart_period),
            notifications_enabled: patch
                .notifications_enabled
                .unwrap_or(self.notifications_enabled),
            sound_enabled: patch.sound_enabled.unwrap_or(self.sound_enabled),
            refresh_interval: patch.refresh_interval.unwrap_or(self.refresh_interval),
        })
    }

    /// Reset out-of-range values that bypassed [`merged`](Self::merged),
    /// such as a hand-edited or outdated persisted record.
    pub fn sanitized(mut self) -> Self {
        if !refresh_interval_in_range(self.refresh_interval) {
            let fallback = Preferences::default().refresh_interval;
            tracing::warn!(
                refresh_interval = self.refresh_interval,
                fallback,
                "Stored refresh interval out of range, using default"
            );
            self.refresh_interval = fallback;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationInput {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
}

impl NotificationInput {
    pub fn new(kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Error, title, message)
    }

    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Warning, title, message)
    }
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Price,
    Pnl,
    Risk,
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertKind::Price => write!(f, "price"),
            AlertKind::Pnl => write!(f, "P&L"),
            AlertKind::Risk => write!(f, "risk"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertCondition {
    Above,
    Below,
}

impl AlertCondition {
    pub fn is_met(&self, observed: Decimal, threshold: Decimal) -> bool {
        match self {
            AlertCondition::Above => observed >= threshold,
            AlertCondition::Below => observed <= threshold,
        }
    }
}

impl std::fmt::Display for AlertCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertCondition::Above => write!(f, "above"),
            AlertCondition::Below => write!(f, "below"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: Uuid,
    pub symbol: String,
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub condition: AlertCondition,
    pub value: Decimal,
    pub triggered: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertInput {
    pub symbol: String,
    pub kind: AlertKind,
    pub condition: AlertCondition,
    pub value: Decimal,
}
