use async_trait::async_trait;

use crate::error::ClientResult;
use crate::models::{
    PortfolioSummary, PositionsResponse, RiskAdjustments, ScoutQuery, ScoutResponse, TradeRecord,
    TradeStats,
};

/// Read-only view of the trading backend's REST resources.
///
/// Implemented by the HTTP `DashboardClient`; the aggregation layer only
/// talks to this trait, which keeps it testable without a network.
#[async_trait]
pub trait TradingBackend: Send + Sync {
    /// `GET /positions`
    async fn get_positions(&self) -> ClientResult<PositionsResponse>;

    /// `GET /portfolio-summary`
    async fn get_portfolio_summary(&self) -> ClientResult<PortfolioSummary>;

    /// `GET /risk-adjustments`
    async fn get_risk_adjustments(&self) -> ClientResult<RiskAdjustments>;

    /// `GET /trades?limit=N`
    async fn get_trades(&self, limit: u32) -> ClientResult<Vec<TradeRecord>>;

    /// `GET /trades/statistics`
    async fn get_trade_stats(&self) -> ClientResult<TradeStats>;

    /// `GET /scout?limit=N&min_score=M&offset=O`
    async fn get_scout(&self, query: ScoutQuery) -> ClientResult<ScoutResponse>;

    fn backend_name(&self) -> &'static str;
}
