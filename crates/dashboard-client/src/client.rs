use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

use crate::backend::TradingBackend;
use crate::endpoints;
use crate::error::{ApiError, ClientError, ClientResult};
use crate::models::*;
use crate::session::{SessionManager, TokenStore};
use crate::ClientConfig;

/// Hook invoked when the backend rejects the session.
///
/// Navigation lives outside this crate; the hook is told once per expired
/// session, not once per rejected request.
pub trait LoginRedirect: Send + Sync {
    fn redirect_to_login(&self, error: &ApiError);
}

/// Redirect hook for headless use: records the event in the log.
pub struct LogRedirect {
    login_url: String,
}

impl LogRedirect {
    pub fn new(login_url: impl Into<String>) -> Self {
        Self {
            login_url: login_url.into(),
        }
    }
}

impl LoginRedirect for LogRedirect {
    fn redirect_to_login(&self, error: &ApiError) {
        tracing::warn!(
            request_id = error.request_id.as_deref().unwrap_or("-"),
            "Session expired, re-authentication required at {}",
            self.login_url
        );
    }
}

/// Strip the `{ "data": ... }` envelope some endpoints wrap their payload in.
pub fn unwrap_envelope(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// HTTP client for the trading backend.
///
/// Every call goes through one pipeline: bearer token, uniform timeout,
/// envelope unwrap, error normalization. Nothing is retried here.
pub struct DashboardClient {
    http: Client,
    base_url: String,
    session: Arc<SessionManager>,
    redirect: Arc<dyn LoginRedirect>,
}

impl DashboardClient {
    pub fn new(
        config: &ClientConfig,
        token_store: Arc<dyn TokenStore>,
        redirect: Arc<dyn LoginRedirect>,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(config.timeout).build()?;
        let session = Arc::new(SessionManager::new(
            http.clone(),
            &config.base_url,
            config.identity.clone(),
            token_store,
        ));

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            session,
            redirect,
        })
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_value(&self, path: &str, query: &[(&str, String)]) -> ClientResult<Value> {
        let url = endpoints::url(&self.base_url, path);
        let ticket = self.session.ticket();

        let mut request = self.http.get(&url).query(query);
        if let Some(token) = &ticket.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            let err = ApiError::from_transport(&e);
            tracing::warn!("GET {} failed: {}", path, err);
            ClientError::Fetch(err)
        })?;

        let status = response.status();
        let request_id = response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = ApiError::from_response_body(status.as_u16(), &body, request_id);

            if status == StatusCode::UNAUTHORIZED {
                if self.session.expire(ticket.generation) {
                    tracing::warn!("GET {} rejected the session token", path);
                    self.redirect.redirect_to_login(&err);
                }
                return Err(ClientError::AuthExpired(err));
            }

            tracing::warn!("GET {} failed: {}", path, err);
            return Err(ClientError::Fetch(err));
        }

        let body: Value = response.json().await.map_err(|e| {
            let err = if e.is_decode() {
                ApiError::new(status.as_u16(), "INVALID_RESPONSE", e.to_string())
            } else {
                ApiError::from_transport(&e)
            };
            ClientError::Fetch(err)
        })?;

        Ok(unwrap_envelope(body))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> ClientResult<T> {
        let value = self.get_value(path, query).await?;
        decode(path, value)
    }
}

fn decode<T: DeserializeOwned>(path: &str, value: Value) -> ClientResult<T> {
    serde_json::from_value(value).map_err(|e| {
        ClientError::Fetch(ApiError::new(
            StatusCode::OK.as_u16(),
            "INVALID_RESPONSE",
            format!("unexpected {} payload: {}", path, e),
        ))
    })
}

#[async_trait]
impl TradingBackend for DashboardClient {
    async fn get_positions(&self) -> ClientResult<PositionsResponse> {
        self.get(endpoints::POSITIONS, &[]).await
    }

    async fn get_portfolio_summary(&self) -> ClientResult<PortfolioSummary> {
        self.get(endpoints::PORTFOLIO_SUMMARY, &[]).await
    }

    async fn get_risk_adjustments(&self) -> ClientResult<RiskAdjustments> {
        self.get(endpoints::RISK_ADJUSTMENTS, &[]).await
    }

    async fn get_trades(&self, limit: u32) -> ClientResult<Vec<TradeRecord>> {
        let value = self
            .get_value(endpoints::TRADES, &[("limit", limit.to_string())])
            .await?;
        let list = match value {
            Value::Object(mut map) => map.remove("trades").unwrap_or(Value::Array(Vec::new())),
            other => other,
        };
        decode(endpoints::TRADES, list)
    }

    async fn get_trade_stats(&self) -> ClientResult<TradeStats> {
        let value = self.get_value(endpoints::TRADE_STATISTICS, &[]).await?;
        TradeStats::from_value(value).map_err(|e| {
            ClientError::Fetch(ApiError::new(
                StatusCode::OK.as_u16(),
                "INVALID_RESPONSE",
                format!("unexpected {} payload: {}", endpoints::TRADE_STATISTICS, e),
            ))
        })
    }

    async fn get_scout(&self, query: ScoutQuery) -> ClientResult<ScoutResponse> {
        self.get(
            endpoints::SCOUT,
            &[
                ("limit", query.limit.to_string()),
                ("min_score", query.min_score.to_string()),
                ("offset", query.offset.to_string()),
            ],
        )
        .await
    }

    fn backend_name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MemoryTokenStore, Session};
    use crate::test_support::spawn_backend;
    use axum::{
        extract::{Query, State},
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::get,
        Json, Router,
    };
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingRedirect {
        count: AtomicUsize,
    }

    impl LoginRedirect for CountingRedirect {
        fn redirect_to_login(&self, _error: &ApiError) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn auth_header(headers: &HeaderMap) -> Value {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(|v| json!(v))
            .unwrap_or(Value::Null)
    }

    fn backend() -> Router {
        Router::new()
            .route(
                "/portfolio-summary",
                get(|| async { Json(json!({"data": {"total_gain": "150.5", "total_positions": 3}})) }),
            )
            .route(
                "/risk-adjustments",
                get(|| async { Json(json!({"account_balance": 10000})) }),
            )
            .route(
                "/positions",
                get(|headers: HeaderMap| async move {
                    Json(json!({
                        "count": 1,
                        "positions": [{"symbol": "AAPL", "qty": "2", "current_price": "101.5"}],
                        "risk_status": {"enabled": false},
                        "timestamp": "2024-01-01T00:00:00Z",
                        "auth": auth_header(&headers)
                    }))
                }),
            )
            .route(
                "/trades",
                get(|Query(q): Query<HashMap<String, String>>| async move {
                    let limit: usize = q.get("limit").and_then(|l| l.parse().ok()).unwrap_or(0);
                    let trades: Vec<Value> = (0..limit)
                        .map(|i| json!({"symbol": "AAPL", "profit_loss": i}))
                        .collect();
                    Json(json!({"data": {"trades": trades}}))
                }),
            )
            .route(
                "/trades/statistics",
                get(|| async { Json(json!({"data": {"win_rate": 0.6, "total_trades": 20}})) }),
            )
            .route(
                "/scout",
                get(|Query(q): Query<HashMap<String, String>>| async move {
                    Json(json!({
                        "scanned_count": 40,
                        "total_symbols": 500,
                        "min_score": q.get("min_score").and_then(|s| s.parse::<f64>().ok()),
                        "limit": q.get("limit").and_then(|s| s.parse::<u64>().ok()),
                        "opportunities": [{"symbol": "AMD", "score": 81.5, "signal": "breakout"}],
                        "scan_timestamp": "2024-01-01T00:00:00Z",
                        "message": format!("offset={}", q.get("offset").cloned().unwrap_or_default())
                    }))
                }),
            )
    }

    fn client(base: &str, store: Arc<dyn TokenStore>, redirect: Arc<dyn LoginRedirect>) -> DashboardClient {
        let config = ClientConfig {
            base_url: base.to_string(),
            ..ClientConfig::default()
        };
        DashboardClient::new(&config, store, redirect).unwrap()
    }

    #[tokio::test]
    async fn unwraps_enveloped_and_bare_payloads() {
        let base = spawn_backend(backend()).await;
        let api = client(&base, Arc::new(MemoryTokenStore::new()), Arc::new(CountingRedirect::default()));

        let summary = tokio_test::assert_ok!(api.get_portfolio_summary().await);
        assert_eq!(summary.total_gain(), dec!(150.5));
        assert_eq!(summary.total_positions(), 3);

        let risk = api.get_risk_adjustments().await.unwrap();
        assert_eq!(risk.account_balance(), dec!(10000));

        let stats = api.get_trade_stats().await.unwrap();
        assert_eq!(
            stats,
            TradeStats::Precomputed {
                win_rate: dec!(0.6),
                total_trades: 20
            }
        );
    }

    #[tokio::test]
    async fn bearer_token_attached_only_when_cached() {
        let base = spawn_backend(backend()).await;

        let anonymous = client(&base, Arc::new(MemoryTokenStore::new()), Arc::new(CountingRedirect::default()));
        let positions = anonymous.get_positions().await.unwrap();
        assert_eq!(positions.count, 1);
        assert_eq!(positions.positions[0].current_price, dec!(101.5));

        // The handler echoes the header back; read it through the raw pipeline.
        let raw = anonymous.get_value(endpoints::POSITIONS, &[]).await.unwrap();
        assert_eq!(raw["auth"], Value::Null);

        let store = Arc::new(MemoryTokenStore::with_session(Session::new("secret")));
        let authed = client(&base, store, Arc::new(CountingRedirect::default()));
        let raw = authed.get_value(endpoints::POSITIONS, &[]).await.unwrap();
        assert_eq!(raw["auth"], json!("Bearer secret"));
    }

    #[tokio::test]
    async fn trades_and_scout_pass_query_parameters() {
        let base = spawn_backend(backend()).await;
        let api = client(&base, Arc::new(MemoryTokenStore::new()), Arc::new(CountingRedirect::default()));

        let trades = api.get_trades(4).await.unwrap();
        assert_eq!(trades.len(), 4);
        assert_eq!(trades[3].realized_pnl, Some(dec!(3)));

        let scout = api
            .get_scout(ScoutQuery {
                limit: 5,
                min_score: 70.0,
                offset: 10,
            })
            .await
            .unwrap();
        assert_eq!(scout.limit, 5);
        assert_eq!(scout.min_score, 70.0);
        assert_eq!(scout.message.as_deref(), Some("offset=10"));
        assert_eq!(scout.opportunities[0].symbol, "AMD");
        assert_eq!(scout.opportunities[0].extra["signal"], json!("breakout"));
    }

    #[tokio::test]
    async fn non_success_status_is_normalized() {
        let app = Router::new().route(
            "/positions",
            get(|| async {
                let mut headers = HeaderMap::new();
                headers.insert("x-request-id", "req-42".parse().unwrap());
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    headers,
                    Json(json!({"code": "BROKER_DOWN", "message": "broker unavailable"})),
                )
                    .into_response()
            }),
        );
        let base = spawn_backend(app).await;
        let redirect = Arc::new(CountingRedirect::default());
        let store = Arc::new(MemoryTokenStore::with_session(Session::new("keep-me")));
        let api = client(&base, store, redirect.clone());

        let err = api.get_positions().await.unwrap_err();
        let ClientError::Fetch(api_err) = err else {
            panic!("expected fetch error, got {:?}", err);
        };
        assert_eq!(api_err.status, 500);
        assert_eq!(api_err.code, "BROKER_DOWN");
        assert_eq!(api_err.request_id.as_deref(), Some("req-42"));
        assert_eq!(redirect.count.load(Ordering::SeqCst), 0);
        assert!(api.session().current().is_some());
    }

    #[tokio::test]
    async fn concurrent_unauthorized_responses_redirect_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/portfolio-summary",
                get(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    (StatusCode::UNAUTHORIZED, Json(json!({"detail": "token expired"})))
                }),
            )
            .with_state(hits.clone());
        let base = spawn_backend(app).await;

        let redirect = Arc::new(CountingRedirect::default());
        let store = Arc::new(MemoryTokenStore::with_session(Session::new("stale")));
        let api = client(&base, store.clone(), redirect.clone());

        let (a, b, c) = tokio::join!(
            api.get_portfolio_summary(),
            api.get_portfolio_summary(),
            api.get_portfolio_summary()
        );

        for result in [a, b, c] {
            let err = result.unwrap_err();
            assert!(err.is_auth_expired());
            assert_eq!(err.status(), 401);
            assert_eq!(err.api_error().message, "token expired");
        }
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(redirect.count.load(Ordering::SeqCst), 1);
        assert!(api.session().current().is_none());
        assert!(store.load().is_none());

        // A later, separate failure is a new event.
        tokio_test::assert_err!(api.get_portfolio_summary().await);
        assert_eq!(redirect.count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let app = Router::new().route(
            "/risk-adjustments",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Json(json!({"account_balance": 1}))
            }),
        );
        let base = spawn_backend(app).await;
        let config = ClientConfig {
            base_url: base,
            timeout: Duration::from_millis(100),
            ..ClientConfig::default()
        };
        let api = DashboardClient::new(
            &config,
            Arc::new(MemoryTokenStore::new()),
            Arc::new(CountingRedirect::default()),
        )
        .unwrap();

        let err = api.get_risk_adjustments().await.unwrap_err();
        assert_eq!(err.api_error().code, "TIMEOUT");
        assert_eq!(err.status(), 0);
    }

    #[tokio::test]
    async fn malformed_payload_is_invalid_response() {
        let app = Router::new().route("/positions", get(|| async { Json(json!({"data": "oops"})) }));
        let base = spawn_backend(app).await;
        let api = client(&base, Arc::new(MemoryTokenStore::new()), Arc::new(CountingRedirect::default()));

        let err = api.get_positions().await.unwrap_err();
        assert_eq!(err.api_error().code, "INVALID_RESPONSE");
    }

    #[test]
    fn envelope_unwrap_rules() {
        assert_eq!(unwrap_envelope(json!({"data": {"a": 1}})), json!({"a": 1}));
        assert_eq!(unwrap_envelope(json!({"a": 1})), json!({"a": 1}));
        assert_eq!(unwrap_envelope(json!([1, 2])), json!([1, 2]));
        assert_eq!(unwrap_envelope(json!({"data": null})), Value::Null);
    }
}
