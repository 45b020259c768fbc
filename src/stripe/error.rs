//! Webhook error types and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::error::StoreError;

/// Errors raised while verifying or applying a webhook delivery
#[derive(Error, Debug)]
pub enum StripeWebhookError {
    /// No `stripe-signature` header on the request
    #[error("Missing stripe-signature header")]
    MissingSignature,

    /// Header present but not in `t=...,v1=...` form
    #[error("Malformed signature header: {0}")]
    MalformedSignatureHeader(String),

    /// No `v1` signature matched the payload
    #[error("No signatures found matching the expected signature for payload")]
    SignatureMismatch,

    /// Signature timestamp is older than the allowed tolerance
    #[error("Signature timestamp is {age_secs}s old, tolerance is {tolerance_secs}s")]
    TimestampOutsideTolerance {
        /// Age of the signature
        age_secs: i64,
        /// Configured tolerance
        tolerance_secs: u64,
    },

    /// Verified payload could not be parsed
    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    /// Subscription store failed while applying the event
    #[error("Subscription storage failed: {0}")]
    Storage(#[from] StoreError),
}

/// Result type for webhook operations
pub type StripeWebhookResult<T> = std::result::Result<T, StripeWebhookError>;

impl StripeWebhookError {
    /// Whether this is an authentication failure on the delivery itself
    pub fn is_signature_error(&self) -> bool {
        matches!(
            self,
            Self::MissingSignature
                | Self::MalformedSignatureHeader(_)
                | Self::SignatureMismatch
                | Self::TimestampOutsideTolerance { .. }
        )
    }

    /// Whether the provider should re-deliver the event
    ///
    /// Every storage failure answers `503`, so every storage failure is
    /// retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// HTTP status code returned to the provider
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    fn public_message(&self) -> &'static str {
        if self.is_signature_error() {
            "Invalid signature"
        } else if matches!(self, Self::InvalidPayload(_)) {
            "Invalid payload"
        } else {
            "Temporarily unavailable"
        }
    }
}

impl IntoResponse for StripeWebhookError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            Json(json!({ "error": self.public_message() })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_errors_are_bad_request() {
        for err in [
            StripeWebhookError::MissingSignature,
            StripeWebhookError::SignatureMismatch,
            StripeWebhookError::MalformedSignatureHeader("x".into()),
        ] {
            assert!(err.is_signature_error());
            assert!(!err.is_retryable());
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn test_storage_error_is_retryable() {
        let err = StripeWebhookError::from(StoreError::Unavailable("timeout".into()));
        assert!(err.is_retryable());
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_retryable_exactly_when_service_unavailable() {
        for err in [
            StripeWebhookError::MissingSignature,
            StripeWebhookError::SignatureMismatch,
            StripeWebhookError::MalformedSignatureHeader("x".into()),
            StripeWebhookError::TimestampOutsideTolerance {
                age_secs: 900,
                tolerance_secs: 300,
            },
            StripeWebhookError::InvalidPayload("bad".into()),
            StripeWebhookError::Storage(StoreError::Unavailable("down".into())),
        ] {
            assert_eq!(
                err.is_retryable(),
                err.status_code() == StatusCode::SERVICE_UNAVAILABLE,
                "{err}"
            );
        }
    }

    #[test]
    fn test_public_message_hides_detail() {
        let err = StripeWebhookError::Storage(StoreError::Unavailable("db at 10.0.0.3".into()));
        assert_eq!(err.public_message(), "Temporarily unavailable");
    }
}
