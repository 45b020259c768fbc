//! Billing endpoints: plan catalog, checkout, billing portal and the
//! caller's subscription.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use crate::app::AppState;
use crate::auth::CurrentPrincipal;
use crate::error::ApiError;
use crate::stripe::{CheckoutSessionRequest, PortalSessionRequest};

/// `POST /api/stripe/checkout` body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutBody {
    #[serde(default)]
    pub plan_id: Option<String>,
}

/// `GET /api/plans`
#[instrument(skip_all)]
pub async fn list_plans_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "plans": state.plans.plans() }))
}

/// `GET /api/billing/subscription`
///
/// The caller's subscription record, or `null` when they never checked out.
#[instrument(skip_all, fields(user_id = %principal.id))]
pub async fn subscription_handler(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
) -> Result<Json<Value>, ApiError> {
    let record = state.subscriptions.find_by_user(&principal.id).await?;
    Ok(Json(json!({ "subscription": record })))
}

/// `POST /api/stripe/checkout`
#[instrument(skip_all, fields(user_id = %principal.id))]
pub async fn checkout_handler(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    body: Result<Json<CheckoutBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let plan_id = body.ok().and_then(|Json(body)| body.plan_id).unwrap_or_default();

    let Some((plan, price_id)) = state.plans.checkout_price(&plan_id) else {
        warn!(plan_id = %plan_id, "Checkout requested for invalid plan");
        return Err(ApiError::BadRequest("Invalid plan".to_string()));
    };

    let request = CheckoutSessionRequest::new(
        &state.config.app_url,
        principal.id.clone(),
        Some(principal.email.clone()),
        plan.id,
        price_id,
    );
    let session = state.payments.create_checkout_session(&request).await?;

    info!(plan = %plan.id, session_id = %session.id, "Checkout session created");
    Ok(Json(json!({ "url": session.url })))
}

/// `POST /api/stripe/portal`
#[instrument(skip_all, fields(user_id = %principal.id))]
pub async fn portal_handler(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
) -> Result<Json<Value>, ApiError> {
    let customer_ref = state
        .subscriptions
        .find_by_user(&principal.id)
        .await?
        .and_then(|record| record.external_customer_ref)
        .filter(|customer| !customer.is_empty())
        .ok_or(ApiError::NotFound)?;

    let request = PortalSessionRequest::new(&state.config.app_url, customer_ref);
    let session = state.payments.create_portal_session(&request).await?;

    Ok(Json(json!({ "url": session.url })))
}
