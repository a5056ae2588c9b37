use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Lenient numeric parsing
// ---------------------------------------------------------------------------

/// Parse a JSON number or numeric string as a decimal.
///
/// Numbers go through their textual form so `0.6` stays exactly `0.6`.
pub fn parse_decimal(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

/// Decimal field of a JSON object, zero when absent or non-numeric.
pub fn decimal_field(object: &Value, key: &str) -> Decimal {
    object.get(key).and_then(parse_decimal).unwrap_or_default()
}

/// Non-negative integer field of a JSON object, zero when absent or non-numeric.
pub fn count_field(object: &Value, key: &str) -> u64 {
    match object.get(key) {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn lenient_decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(parse_decimal).unwrap_or_default())
}

fn lenient_optional_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(parse_decimal))
}

// ---------------------------------------------------------------------------
// GET /positions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub qty: Decimal,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub avg_entry_price: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub current_price: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub market_value: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub unrealized_pl: Decimal,
    /// Unrealized P&L as a fraction of cost basis (0.05 = 5%).
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub unrealized_plpc: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOrder {
    #[serde(default)]
    pub id: Option<String>,
    pub symbol: String,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub qty: Decimal,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskStatus {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionsResponse {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub positions: Vec<Position>,
    #[serde(default)]
    pub pending_orders: Vec<PendingOrder>,
    #[serde(default)]
    pub risk_status: RiskStatus,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl PositionsResponse {
    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions
            .iter()
            .find(|p| p.symbol.eq_ignore_ascii_case(symbol))
    }
}

// ---------------------------------------------------------------------------
// GET /portfolio-summary and GET /risk-adjustments
// ---------------------------------------------------------------------------

/// Portfolio summary payload. The backend adds fields freely, so the raw
/// object is kept and only the fields the dashboard relies on are typed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortfolioSummary(pub Value);

impl PortfolioSummary {
    pub fn total_gain(&self) -> Decimal {
        decimal_field(&self.0, "total_gain")
    }

    pub fn total_positions(&self) -> u64 {
        count_field(&self.0, "total_positions")
    }
}

/// Risk adjustment payload; carries total account equity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RiskAdjustments(pub Value);

impl RiskAdjustments {
    pub fn account_balance(&self) -> Decimal {
        decimal_field(&self.0, "account_balance")
    }
}

// ---------------------------------------------------------------------------
// GET /trades and GET /trades/statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub symbol: String,
    #[serde(default, alias = "side")]
    pub action: Option<String>,
    #[serde(default, alias = "shares", deserialize_with = "lenient_decimal")]
    pub qty: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub price: Decimal,
    #[serde(
        default,
        alias = "profit_loss",
        alias = "pnl",
        deserialize_with = "lenient_optional_decimal"
    )]
    pub realized_pnl: Option<Decimal>,
    #[serde(default, alias = "timestamp", alias = "trade_date")]
    pub executed_at: Option<String>,
}

impl TradeRecord {
    pub fn is_winner(&self) -> bool {
        self.realized_pnl.is_some_and(|p| p > Decimal::ZERO)
    }
}

/// Win-rate input, in whichever form the backend supplied it.
#[derive(Debug, Clone, PartialEq)]
pub enum TradeStats {
    /// Server-side statistics; `win_rate` is a 0-1 fraction.
    Precomputed { win_rate: Decimal, total_trades: u64 },
    /// Raw trade history to compute the rate from.
    Trades(Vec<TradeRecord>),
}

impl TradeStats {
    /// Classify an already-unwrapped payload.
    ///
    /// An object carrying `win_rate` is precomputed; a bare array or an
    /// object with a `trades` array is a raw list. Anything else is treated
    /// as an empty history.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        if value.get("win_rate").is_some() {
            return Ok(TradeStats::Precomputed {
                win_rate: decimal_field(&value, "win_rate"),
                total_trades: count_field(&value, "total_trades"),
            });
        }

        let list = match value {
            Value::Array(_) => value,
            Value::Object(mut map) => map.remove("trades").unwrap_or(Value::Array(Vec::new())),
            _ => Value::Array(Vec::new()),
        };
        Ok(TradeStats::Trades(serde_json::from_value(list)?))
    }
}

// ---------------------------------------------------------------------------
// GET /scout
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoutQuery {
    pub limit: u32,
    pub min_score: f64,
    pub offset: u32,
}

impl Default for ScoutQuery {
    fn default() -> Self {
        Self {
            limit: 20,
            min_score: 0.0,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub symbol: String,
    #[serde(default)]
    pub score: f64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoutResponse {
    #[serde(default)]
    pub scanned_count: u64,
    #[serde(default)]
    pub total_symbols: u64,
    #[serde(default)]
    pub min_score: f64,
    #[serde(default)]
    pub limit: u64,
    #[serde(default)]
    pub opportunities: Vec<Opportunity>,
    #[serde(default)]
    pub scan_timestamp: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

// ---------------------------------------------------------------------------
// POST /token
// ---------------------------------------------------------------------------

/// Fixed identity presented when acquiring a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Identity {
    pub user_id: String,
    pub email: String,
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            user_id: "dashboard-user".to_string(),
            email: "dashboard@localhost".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

// ---------------------------------------------------------------------------
// Derived view shared by the sync and store crates
// ---------------------------------------------------------------------------

/// Portfolio figures derived from summary, risk and trade resources.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioMetrics {
    #[serde(
        rename = "totalPnL",
        serialize_with = "rust_decimal::serde::float::serialize"
    )]
    pub total_pnl: Decimal,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub portfolio_value: Decimal,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub win_rate: Decimal,
    pub total_trades: u64,
    pub open_positions: u64,
    #[serde(
        rename = "dailyPnLPercent",
        serialize_with = "rust_decimal::serde::float::serialize"
    )]
    pub daily_pnl_percent: Decimal,
    pub computed_at: DateTime<Utc>,
}
