// src/errors.rs - Request-level error taxonomy
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;

/// Failures that reach the caller. AI provider errors and timeouts degrade
/// the result instead and never appear here.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatchError {
    #[error("{0}")]
    Validation(String),

    #[error("missing or invalid API key")]
    Unauthorized,

    #[error("rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("candidate source unavailable: {0}")]
    CandidateSourceUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl MatchError {
    pub fn validation(message: impl Into<String>) -> Self {
        MatchError::Validation(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            MatchError::Validation(_) => StatusCode::BAD_REQUEST,
            MatchError::Unauthorized => StatusCode::UNAUTHORIZED,
            MatchError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            MatchError::CandidateSourceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            MatchError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable `error` field of the response body.
    pub fn code(&self) -> &'static str {
        match self {
            MatchError::Validation(_) => "validation_error",
            MatchError::Unauthorized => "unauthorized",
            MatchError::RateLimited { .. } => "rate_limit_exceeded",
            MatchError::CandidateSourceUnavailable(_) => "candidate_source_unavailable",
            MatchError::Internal(_) => "internal_error",
        }
    }
}

impl From<anyhow::Error> for MatchError {
    fn from(err: anyhow::Error) -> Self {
        MatchError::Internal(format!("{:#}", err))
    }
}

/// A `MatchError` bound to the request it belongs to.
#[derive(Debug)]
pub struct ApiError {
    pub error: MatchError,
    pub request_id: String,
}

impl ApiError {
    pub fn new(error: MatchError, request_id: impl Into<String>) -> Self {
        Self {
            error,
            request_id: request_id.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.error.status_code();
        let mut body = json!({
            "success": false,
            "error": self.error.code(),
            "message": self.error.to_string(),
            "requestId": self.request_id,
        });

        let retry_after = match &self.error {
            MatchError::RateLimited { retry_after_secs } => {
                body["retryAfter"] = json!(retry_after_secs);
                Some(*retry_after_secs)
            }
            _ => None,
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(MatchError::validation("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(MatchError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            MatchError::RateLimited { retry_after_secs: 3 }.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            MatchError::CandidateSourceUnavailable("down".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            MatchError::from(anyhow::anyhow!("boom")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_rate_limited_response_carries_retry_after() {
        let response = ApiError::new(MatchError::RateLimited { retry_after_secs: 7 }, "req-1").into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).and_then(|v| v.to_str().ok()),
            Some("7")
        );
    }
}
