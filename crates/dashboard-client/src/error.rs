use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Status used for failures that never produced an HTTP response.
pub const NO_STATUS: u16 = 0;

/// Normalized shape of every failed backend call.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("[{status}] {code}: {message}")]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    pub status: u16,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ApiError {
    pub fn new(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            details: None,
            request_id: None,
        }
    }

    /// Map a transport-level failure (connect, timeout, body read).
    pub fn from_transport(err: &reqwest::Error) -> Self {
        let code = if err.is_timeout() {
            "TIMEOUT"
        } else {
            "NETWORK_ERROR"
        };
        let status = err.status().map(|s| s.as_u16()).unwrap_or(NO_STATUS);
        Self::new(status, code, err.to_string())
    }

    /// Build from a non-2xx response body.
    ///
    /// Backends in the wild answer with `{code, message}`, `{detail}`,
    /// `{error: "..."}` or `{error: {code, message, details}}`, so every
    /// variant is probed before falling back to the status text.
    pub fn from_response_body(
        status: u16,
        body: &str,
        header_request_id: Option<String>,
    ) -> Self {
        let parsed: Option<Value> = serde_json::from_str(body).ok();
        let root = parsed.as_ref();
        let nested = root.and_then(|v| v.get("error")).filter(|e| e.is_object());
        let source = nested.or(root);

        let field = |key: &str| -> Option<String> {
            source
                .and_then(|v| v.get(key))
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        let code = field("code").unwrap_or_else(|| default_code(status).to_string());
        let message = field("message")
            .or_else(|| field("detail"))
            .or_else(|| {
                root.and_then(|v| v.get("error"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| {
                if body.trim().is_empty() || parsed.is_some() {
                    format!("Request failed with status {}", status)
                } else {
                    body.trim().to_string()
                }
            });
        let details = source.and_then(|v| v.get("details")).cloned();
        let request_id = header_request_id.or_else(|| {
            root.and_then(|v| v.get("request_id").or_else(|| v.get("requestId")))
                .and_then(Value::as_str)
                .map(str::to_string)
        });

        Self {
            status,
            code,
            message,
            details,
            request_id,
        }
    }
}

fn default_code(status: u16) -> &'static str {
    match status {
        400 => "BAD_REQUEST",
        401 => "UNAUTHORIZED",
        403 => "FORBIDDEN",
        404 => "NOT_FOUND",
        408 => "TIMEOUT",
        429 => "RATE_LIMITED",
        500..=599 => "SERVER_ERROR",
        _ => "HTTP_ERROR",
    }
}

/// Failure taxonomy surfaced by the client crate.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    /// Token issuance failed; nothing was cached.
    #[error("session acquisition failed: {0}")]
    Session(ApiError),

    /// A resource call came back 401; the cached token has been dropped.
    #[error("session expired: {0}")]
    AuthExpired(ApiError),

    /// Any other network, timeout, decode or non-2xx failure.
    #[error("resource fetch failed: {0}")]
    Fetch(ApiError),
}

impl ClientError {
    pub fn api_error(&self) -> &ApiError {
        match self {
            ClientError::Session(e) | ClientError::AuthExpired(e) | ClientError::Fetch(e) => e,
        }
    }

    pub fn status(&self) -> u16 {
        self.api_error().status
    }

    pub fn is_auth_expired(&self) -> bool {
        matches!(self, ClientError::AuthExpired(_))
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_error_body() {
        let err = ApiError::from_response_body(
            422,
            r#"{"code":"INVALID_LIMIT","message":"limit too large","details":{"max":500}}"#,
            Some("req-1".into()),
        );
        assert_eq!(err.status, 422);
        assert_eq!(err.code, "INVALID_LIMIT");
        assert_eq!(err.message, "limit too large");
        assert_eq!(err.details, Some(serde_json::json!({"max": 500})));
        assert_eq!(err.request_id.as_deref(), Some("req-1"));
    }

    #[test]
    fn parses_nested_error_object() {
        let err = ApiError::from_response_body(
            500,
            r#"{"error":{"code":"DB_DOWN","message":"database unavailable"},"request_id":"abc"}"#,
            None,
        );
        assert_eq!(err.code, "DB_DOWN");
        assert_eq!(err.message, "database unavailable");
        assert_eq!(err.request_id.as_deref(), Some("abc"));
    }

    #[test]
    fn string_error_and_detail_fields() {
        let err = ApiError::from_response_body(403, r#"{"error":"forbidden"}"#, None);
        assert_eq!(err.code, "FORBIDDEN");
        assert_eq!(err.message, "forbidden");

        let err = ApiError::from_response_body(404, r#"{"detail":"Not Found"}"#, None);
        assert_eq!(err.code, "NOT_FOUND");
        assert_eq!(err.message, "Not Found");
    }

    #[test]
    fn plain_text_body_becomes_message() {
        let err = ApiError::from_response_body(502, "Bad Gateway", None);
        assert_eq!(err.code, "SERVER_ERROR");
        assert_eq!(err.message, "Bad Gateway");

        let err = ApiError::from_response_body(503, "", None);
        assert_eq!(err.message, "Request failed with status 503");
    }

    #[test]
    fn serializes_camel_case_without_empty_optionals() {
        let err = ApiError::new(404, "NOT_FOUND", "missing");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status": 404, "code": "NOT_FOUND", "message": "missing"})
        );
    }
}
