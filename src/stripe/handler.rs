//! Webhook HTTP endpoint.
//!
//! The body is taken as raw bytes: the signature covers the exact payload,
//! so it must be verified before any JSON parsing.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, instrument, warn};

use crate::app::AppState;
use crate::stripe::signature::SIGNATURE_HEADER;

/// `POST /api/stripe/webhook`
///
/// - `200 {"received": true}` for processed or ignored events
/// - `400` for signature or payload failures (not retried)
/// - `503` for storage failures (the provider re-delivers)
#[instrument(skip_all)]
pub async fn stripe_webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    match state.reconciler.handle_provider_event(&body, signature).await {
        Ok(ack) => {
            state.metrics.record_webhook_ack(&ack.outcome);
            (StatusCode::OK, Json(json!({ "received": true }))).into_response()
        }
        Err(err) => {
            state.metrics.record_webhook_error(&err);
            if err.is_retryable() {
                error!(error = %err, "Webhook processing failed, provider will retry");
            } else {
                warn!(error = %err, "Webhook rejected");
            }
            err.into_response()
        }
    }
}
