//! Error types for SaaSKit Web
//!
//! Component errors built on `thiserror`: [`ConfigError`] for startup,
//! [`StoreError`] for record stores and [`ProviderError`] for the payment
//! provider. HTTP handlers speak [`ApiError`], which knows how to render
//! itself as a response without leaking internal detail to the caller.

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::rate_limit::RateLimitDecision;

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Required environment variable is not set
    #[error("{0} environment variable not set")]
    MissingVar(&'static str),

    /// Environment variable is set but unusable
    #[error("Invalid value for {var}: {message}")]
    InvalidValue {
        /// Variable name
        var: &'static str,
        /// What was wrong with it
        message: String,
    },
}

/// Record storage errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Backend could not be reached or refused the operation; safe to retry
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Payment provider API errors
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Transport-level failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider answered with an error status
    #[error("Provider API error {status}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Provider error message
        message: String,
    },

    /// Provider answered with something we could not use
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

/// Result type alias for storage operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

// =============================================================================
// HTTP API Errors
// =============================================================================

/// Error returned by JSON API handlers
#[derive(Debug)]
pub enum ApiError {
    /// No authenticated principal
    Unauthorized,

    /// Request body failed validation
    Validation(serde_json::Value),

    /// Request was understood but cannot be served
    BadRequest(String),

    /// Record missing or not owned by the caller
    NotFound,

    /// Caller exceeded their request budget
    RateLimited {
        /// Decision that blocked the request
        decision: RateLimitDecision,
        /// Time the decision was made
        now: DateTime<Utc>,
    },

    /// Anything else; detail is logged, not returned
    Internal(String),
}

impl ApiError {
    /// HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match self {
            ApiError::Unauthorized => (status, Json(json!({ "error": "Unauthorized" }))).into_response(),
            ApiError::Validation(details) => (status, Json(json!({ "error": details }))).into_response(),
            ApiError::BadRequest(message) => (status, Json(json!({ "error": message }))).into_response(),
            ApiError::NotFound => (status, Json(json!({ "error": "Not found" }))).into_response(),
            ApiError::RateLimited { decision, now } => {
                let body = Json(json!({
                    "error": "Rate limit exceeded",
                    "reset": decision.reset_at.timestamp_millis(),
                }));
                let mut response = (status, body).into_response();
                let headers = response.headers_mut();
                for (name, value) in decision.headers(now) {
                    if let (Ok(name), Ok(value)) = (
                        HeaderName::from_bytes(name.as_bytes()),
                        HeaderValue::from_str(&value),
                    ) {
                        headers.insert(name, value);
                    }
                }
                response
            }
            ApiError::Internal(detail) => {
                error!(error = %detail, "Request failed");
                (status, Json(json!({ "error": "Internal server error" }))).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::Unavailable("connection reset".to_string());
        assert_eq!(err.to_string(), "Storage unavailable: connection reset");
    }

    #[test]
    fn test_config_error() {
        let err = ConfigError::MissingVar("STRIPE_WEBHOOK_SECRET");
        assert_eq!(
            err.to_string(),
            "STRIPE_WEBHOOK_SECRET environment variable not set"
        );
    }

    #[test]
    fn test_provider_api_error() {
        let err = ProviderError::Api {
            status: 402,
            message: "Card declined".to_string(),
        };
        assert!(err.to_string().contains("402"));
        assert!(err.to_string().contains("Card declined"));
    }

    #[test]
    fn test_store_error_is_internal_for_api() {
        let err = ApiError::from(StoreError::Unavailable("down".into()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_api_error_status_codes() {
        assert_eq!(ApiError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Validation(json!({})).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::Internal("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_rate_limited_response_carries_headers() {
        let now = Utc::now();
        let decision = RateLimitDecision {
            allowed: false,
            limit: 10,
            remaining: 0,
            reset_at: now + chrono::Duration::seconds(42),
        };

        let response = ApiError::RateLimited { decision, now }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
        assert_eq!(response.headers()["retry-after"], "42");
    }
}
