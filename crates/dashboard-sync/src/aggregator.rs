use dashboard_client::{
    PortfolioMetrics, PositionsResponse, ScoutQuery, ScoutResponse, TradeRecord, TradingBackend,
};
use dashboard_store::{AlertEngine, DashboardStore, LiveData, NotificationInput};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{AggregationError, AggregationResult};
use crate::metrics::derive_metrics;
use crate::query::{Query, QueryState, Refresh, RefreshMode, DEFAULT_STALE_TIME};

/// Query keys, also used as the `resource` of an [`AggregationError`].
pub mod keys {
    pub const PORTFOLIO_METRICS: &str = "portfolio-metrics";
    pub const POSITIONS: &str = "positions";
    pub const PORTFOLIO_SUMMARY: &str = "portfolio-summary";
    pub const RISK_ADJUSTMENTS: &str = "risk-adjustments";
    pub const TRADE_STATISTICS: &str = "trade-statistics";
    pub const TRADES: &str = "trades";
    pub const SCOUT: &str = "scout";
}

/// Outcome of one background cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub metrics: Refresh<PortfolioMetrics>,
    pub positions: Refresh<PositionsResponse>,
    pub alerts_fired: usize,
}

/// Composes backend resources into dashboard views and keeps the store's
/// connection status, notifications and alerts in step with them.
pub struct PortfolioAggregator {
    backend: Arc<dyn TradingBackend>,
    store: Arc<DashboardStore>,
    metrics: Query<PortfolioMetrics>,
    positions: Query<PositionsResponse>,
}

impl PortfolioAggregator {
    pub fn new(backend: Arc<dyn TradingBackend>, store: Arc<DashboardStore>) -> Self {
        Self::with_stale_time(backend, store, DEFAULT_STALE_TIME)
    }

    pub fn with_stale_time(
        backend: Arc<dyn TradingBackend>,
        store: Arc<DashboardStore>,
        stale_time: Duration,
    ) -> Self {
        Self {
            backend,
            store,
            metrics: Query::new(keys::PORTFOLIO_METRICS, stale_time),
            positions: Query::new(keys::POSITIONS, stale_time),
        }
    }

    pub fn store(&self) -> &Arc<DashboardStore> {
        &self.store
    }

    pub fn metrics_state(&self) -> QueryState<PortfolioMetrics> {
        self.metrics.state()
    }

    pub fn positions_state(&self) -> QueryState<PositionsResponse> {
        self.positions.state()
    }

    /// Fetch summary, risk and trade statistics concurrently and derive the
    /// metrics. Any failed fetch fails the whole call.
    pub async fn fetch_portfolio_metrics(&self) -> AggregationResult<PortfolioMetrics> {
        let (summary, risk, stats) = tokio::try_join!(
            async {
                self.backend
                    .get_portfolio_summary()
                    .await
                    .map_err(|e| AggregationError::new(keys::PORTFOLIO_SUMMARY, e))
            },
            async {
                self.backend
                    .get_risk_adjustments()
                    .await
                    .map_err(|e| AggregationError::new(keys::RISK_ADJUSTMENTS, e))
            },
            async {
                self.backend
                    .get_trade_stats()
                    .await
                    .map_err(|e| AggregationError::new(keys::TRADE_STATISTICS, e))
            },
        )?;

        Ok(derive_metrics(&summary, &risk, &stats))
    }

    /// Refresh the cached metrics. A success marks the store connected and
    /// re-evaluates alerts; a failure adds one error notification and marks
    /// it disconnected.
    pub async fn refresh_metrics(&self, mode: RefreshMode) -> Refresh<PortfolioMetrics> {
        self.metrics_cycle(mode).await.0
    }

    /// Metrics refresh plus the number of alerts it fired.
    async fn metrics_cycle(&self, mode: RefreshMode) -> (Refresh<PortfolioMetrics>, usize) {
        let outcome = self
            .metrics
            .refresh(mode, || self.fetch_portfolio_metrics())
            .await;

        let fired = match &outcome {
            Refresh::Updated(metrics) => {
                self.store.mark_synced(metrics.computed_at);
                self.evaluate_alerts()
            }
            Refresh::Failed(error) => {
                self.report_failure(error);
                0
            }
            Refresh::Cached(_) | Refresh::Skipped => 0,
        };
        (outcome, fired)
    }

    pub async fn get_portfolio_metrics(&self, mode: RefreshMode) -> QueryState<PortfolioMetrics> {
        self.refresh_metrics(mode).await;
        self.metrics.state()
    }

    /// Refresh the cached positions. Failures are recorded on the query only;
    /// connection status follows the metrics cycle.
    pub async fn refresh_positions(&self, mode: RefreshMode) -> Refresh<PositionsResponse> {
        self.positions_cycle(mode).await.0
    }

    async fn positions_cycle(&self, mode: RefreshMode) -> (Refresh<PositionsResponse>, usize) {
        let outcome = self
            .positions
            .refresh(mode, || async {
                self.backend
                    .get_positions()
                    .await
                    .map_err(|e| AggregationError::new(keys::POSITIONS, e))
            })
            .await;

        let fired = match outcome {
            Refresh::Updated(_) => self.evaluate_alerts(),
            _ => 0,
        };
        (outcome, fired)
    }

    pub async fn get_positions(&self, mode: RefreshMode) -> QueryState<PositionsResponse> {
        self.refresh_positions(mode).await;
        self.positions.state()
    }

    pub async fn get_trades(&self, limit: u32) -> AggregationResult<Vec<TradeRecord>> {
        self.backend
            .get_trades(limit)
            .await
            .map_err(|e| AggregationError::new(keys::TRADES, e))
    }

    pub async fn get_scout(&self, query: ScoutQuery) -> AggregationResult<ScoutResponse> {
        self.backend
            .get_scout(query)
            .await
            .map_err(|e| AggregationError::new(keys::SCOUT, e))
    }

    /// One scheduler tick: metrics and positions refresh side by side,
    /// each skipped if its previous cycle is still running.
    pub async fn background_cycle(&self) -> CycleReport {
        let ((metrics, from_metrics), (positions, from_positions)) = tokio::join!(
            self.metrics_cycle(RefreshMode::Background),
            self.positions_cycle(RefreshMode::Background),
        );
        let alerts_fired = from_metrics + from_positions;

        tracing::debug!(
            backend = self.backend.backend_name(),
            metrics = outcome_label(&metrics),
            positions = outcome_label(&positions),
            alerts_fired,
            "Background cycle finished"
        );

        CycleReport {
            metrics,
            positions,
            alerts_fired,
        }
    }

    /// Run the alert engine against the latest cached data.
    pub fn evaluate_alerts(&self) -> usize {
        let metrics = self.metrics.data();
        let positions = self.positions.data();
        let live = LiveData::new(positions.as_ref(), metrics.as_ref());
        AlertEngine::evaluate(&self.store, &live).len()
    }

    fn report_failure(&self, error: &AggregationError) {
        tracing::error!(
            resource = error.resource,
            status = error.api_error().status,
            code = %error.api_error().code,
            "Portfolio metrics refresh failed"
        );
        self.store.add_notification(NotificationInput::error(
            "Failed to load portfolio metrics",
            error.api_error().message.clone(),
        ));
        self.store.set_connected(false);
    }
}

fn outcome_label<T>(outcome: &Refresh<T>) -> &'static str {
    match outcome {
        Refresh::Cached(_) => "cached",
        Refresh::Updated(_) => "updated",
        Refresh::Failed(_) => "failed",
        Refresh::Skipped => "skipped",
    }
}
