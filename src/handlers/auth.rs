//! Current-user endpoint.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::instrument;

use crate::auth::MaybePrincipal;

/// `GET /api/auth`
///
/// `200 {"user": {...}}` for an authenticated caller, `401 {"user": null}`
/// otherwise.
#[instrument(skip_all)]
pub async fn current_user_handler(MaybePrincipal(principal): MaybePrincipal) -> Response {
    match principal {
        Some(user) => (StatusCode::OK, Json(json!({ "user": user }))).into_response(),
        None => (StatusCode::UNAUTHORIZED, Json(json!({ "user": null }))).into_response(),
    }
}
