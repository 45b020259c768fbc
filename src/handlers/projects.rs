//! Project CRUD endpoints.
//!
//! Every query is scoped to the caller, so a foreign or malformed id answers
//! `404` exactly like a missing one.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::app::AppState;
use crate::auth::CurrentPrincipal;
use crate::error::ApiError;
use crate::projects::{CreateProjectBody, Project, UpdateProjectBody, ValidationErrors};
use crate::rate_limit::DEFAULT_LIMIT;

/// Reads per caller per window
pub const LIST_LIMIT: u32 = DEFAULT_LIMIT;

/// Creates per caller per window
pub const CREATE_LIMIT: u32 = 10;

fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound)
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ValidationErrors::form(rejection.body_text()).into())
}

/// `GET /api/projects`
#[instrument(skip_all, fields(user_id = %principal.id))]
pub async fn list_projects(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
) -> Result<Json<Value>, ApiError> {
    state.throttle("projects", &format!("projects:{}", principal.id), LIST_LIMIT)?;

    let projects = state.projects.list_for_user(&principal.id).await?;
    Ok(Json(json!({ "data": projects })))
}

/// `POST /api/projects`
#[instrument(skip_all, fields(user_id = %principal.id))]
pub async fn create_project(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    body: Result<Json<CreateProjectBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    state.throttle(
        "projects:create",
        &format!("projects:create:{}", principal.id),
        CREATE_LIMIT,
    )?;

    let new = json_body(body)?.validate()?;
    let project = Project::create(new, principal.id.clone(), principal.org_id.clone(), Utc::now());
    let project = state.projects.insert(project).await?;

    info!(project_id = %project.id, "Project created");
    Ok((StatusCode::CREATED, Json(json!({ "data": project }))).into_response())
}

/// `GET /api/projects/{id}`
#[instrument(skip_all, fields(user_id = %principal.id))]
pub async fn get_project(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id)?;
    let project = state
        .projects
        .find_for_user(id, &principal.id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(json!({ "data": project })))
}

/// `PUT /api/projects/{id}`
#[instrument(skip_all, fields(user_id = %principal.id))]
pub async fn update_project(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
    body: Result<Json<UpdateProjectBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let changes = json_body(body)?.validate()?;
    let id = parse_id(&id)?;

    let project = state
        .projects
        .update_for_user(id, &principal.id, &changes)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(json!({ "data": project })))
}

/// `DELETE /api/projects/{id}`
#[instrument(skip_all, fields(user_id = %principal.id))]
pub async fn delete_project(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    if !state.projects.delete_for_user(id, &principal.id).await? {
        return Err(ApiError::NotFound);
    }

    info!(project_id = %id, "Project deleted");
    Ok(StatusCode::NO_CONTENT)
}
