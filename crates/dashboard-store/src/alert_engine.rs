use dashboard_client::{PortfolioMetrics, PositionsResponse};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{Alert, AlertKind, NotificationInput};
use crate::store::DashboardStore;

/// Alerts on this symbol watch the aggregated portfolio instead of a position.
pub const PORTFOLIO_SYMBOL: &str = "PORTFOLIO";

/// Latest backend data an evaluation pass runs against.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiveData<'a> {
    pub positions: Option<&'a PositionsResponse>,
    pub metrics: Option<&'a PortfolioMetrics>,
}

impl<'a> LiveData<'a> {
    pub fn new(
        positions: Option<&'a PositionsResponse>,
        metrics: Option<&'a PortfolioMetrics>,
    ) -> Self {
        Self { positions, metrics }
    }
}

pub struct AlertEngine;

impl AlertEngine {
    /// The value an alert is compared against, if the live data carries it.
    ///
    /// Risk is expressed in percent for both positions and the portfolio.
    pub fn observe(alert: &Alert, live: &LiveData<'_>) -> Option<Decimal> {
        if alert.symbol == PORTFOLIO_SYMBOL {
            let metrics = live.metrics?;
            return match alert.kind {
                AlertKind::Pnl => Some(metrics.total_pnl),
                AlertKind::Risk => Some(metrics.daily_pnl_percent),
                AlertKind::Price => None,
            };
        }

        let position = live.positions?.position(&alert.symbol)?;
        Some(match alert.kind {
            AlertKind::Price => position.current_price,
            AlertKind::Pnl => position.unrealized_pl,
            AlertKind::Risk => position.unrealized_plpc * Decimal::ONE_HUNDRED,
        })
    }

    /// Check every untriggered alert and fire the ones whose condition holds.
    /// Returns the ids fired by this pass; an alert fires at most once.
    pub fn evaluate(store: &DashboardStore, live: &LiveData<'_>) -> Vec<Uuid> {
        let state = store.snapshot();
        let mut fired = Vec::new();

        for alert in state.alerts.iter().filter(|a| !a.triggered) {
            let Some(observed) = Self::observe(alert, live) else {
                continue;
            };
            if !alert.condition.is_met(observed, alert.value) {
                continue;
            }
            // Another pass may have fired it since the snapshot was taken.
            if !store.trigger_alert(alert.id) {
                continue;
            }

            tracing::info!(
                symbol = %alert.symbol,
                kind = %alert.kind,
                observed = %observed,
                threshold = %alert.value,
                "Alert triggered"
            );
            if store.preferences().notifications_enabled {
                store.add_notification(NotificationInput::warning(
                    format!("{} alert", alert.symbol),
                    format!(
                        "{} {} is {}, {} {}",
                        alert.symbol,
                        alert.kind,
                        observed.normalize(),
                        alert.condition,
                        alert.value.normalize()
                    ),
                ));
            }
            fired.push(alert.id);
        }

        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;
    use chrono::Utc;
    use dashboard_client::Position;
    use rust_decimal_macros::dec;

    fn position(symbol: &str, price: Decimal, pl: Decimal, plpc: Decimal) -> Position {
        Position {
            symbol: symbol.to_string(),
            qty: dec!(10),
            side: Some("long".into()),
            avg_entry_price: dec!(100),
            current_price: price,
            market_value: price * dec!(10),
            unrealized_pl: pl,
            unrealized_plpc: plpc,
        }
    }

    fn positions(list: Vec<Position>) -> PositionsResponse {
        PositionsResponse {
            count: list.len() as u64,
            positions: list,
            pending_orders: Vec::new(),
            risk_status: Default::default(),
            timestamp: None,
        }
    }

    fn alert(
        store: &DashboardStore,
        symbol: &str,
        kind: AlertKind,
        condition: AlertCondition,
        value: Decimal,
    ) -> Uuid {
        store.add_alert(AlertInput {
            symbol: symbol.to_string(),
            kind,
            condition,
            value,
        })
    }

    #[test]
    fn price_alert_fires_once_with_one_notification() {
        let store = DashboardStore::default();
        let id = alert(&store, "AAPL", AlertKind::Price, AlertCondition::Above, dec!(150));
        let data = positions(vec![position("AAPL", dec!(150), dec!(500), dec!(0.5))]);
        let live = LiveData::new(Some(&data), None);

        assert_eq!(AlertEngine::evaluate(&store, &live), vec![id]);
        assert!(store.alerts()[0].triggered);
        let notes = store.notifications();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].kind, NotificationKind::Warning);
        assert!(notes[0].message.contains("AAPL"));

        assert!(AlertEngine::evaluate(&store, &live).is_empty());
        assert_eq!(store.notifications().len(), 1);
    }

    #[test]
    fn unmet_or_unknown_symbols_stay_armed() {
        let store = DashboardStore::default();
        alert(&store, "AAPL", AlertKind::Price, AlertCondition::Above, dec!(200));
        alert(&store, "MSFT", AlertKind::Price, AlertCondition::Below, dec!(1000));
        let data = positions(vec![position("AAPL", dec!(150), dec!(0), dec!(0))]);

        assert!(AlertEngine::evaluate(&store, &LiveData::new(Some(&data), None)).is_empty());
        assert_eq!(store.active_alerts().len(), 2);
        assert!(AlertEngine::evaluate(&store, &LiveData::default()).is_empty());
    }

    #[test]
    fn pnl_and_risk_use_position_fields() {
        let store = DashboardStore::default();
        let pnl = alert(&store, "TSLA", AlertKind::Pnl, AlertCondition::Below, dec!(-250));
        let risk = alert(&store, "TSLA", AlertKind::Risk, AlertCondition::Below, dec!(-5));
        let safe = alert(&store, "TSLA", AlertKind::Risk, AlertCondition::Below, dec!(-10));
        let data = positions(vec![position("tsla", dec!(90), dec!(-300), dec!(-0.06))]);

        let fired = AlertEngine::evaluate(&store, &LiveData::new(Some(&data), None));
        assert_eq!(fired, vec![pnl, risk]);
        assert!(!fired.contains(&safe));
    }

    #[test]
    fn portfolio_alerts_read_metrics() {
        let store = DashboardStore::default();
        let pnl = alert(&store, "portfolio", AlertKind::Pnl, AlertCondition::Above, dec!(100));
        let risk = alert(&store, "PORTFOLIO", AlertKind::Risk, AlertCondition::Above, dec!(2));
        alert(&store, "PORTFOLIO", AlertKind::Price, AlertCondition::Above, dec!(0));
        let metrics = PortfolioMetrics {
            total_pnl: dec!(150.5),
            portfolio_value: dec!(10000),
            win_rate: dec!(60),
            total_trades: 20,
            open_positions: 3,
            daily_pnl_percent: dec!(1.505),
            computed_at: Utc::now(),
        };

        let fired = AlertEngine::evaluate(&store, &LiveData::new(None, Some(&metrics)));
        assert_eq!(fired, vec![pnl]);
        assert!(!store.alerts().iter().any(|a| a.id == risk && a.triggered));
    }

    #[test]
    fn disabled_notifications_still_trigger() {
        let store = DashboardStore::default();
        store
            .set_preferences(PreferencesPatch {
                notifications_enabled: Some(false),
                ..Default::default()
            })
            .unwrap();
        alert(&store, "AMD", AlertKind::Price, AlertCondition::Below, dec!(120));
        let data = positions(vec![position("AMD", dec!(110), dec!(0), dec!(0))]);

        assert_eq!(AlertEngine::evaluate(&store, &LiveData::new(Some(&data), None)).len(), 1);
        assert!(store.notifications().is_empty());
        assert!(store.active_alerts().is_empty());
    }
}
