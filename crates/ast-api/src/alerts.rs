//! ---
//! ast_section: "05-http-facade"
//! ast_subsection: "module"
//! ast_type: "source"
//! ast_scope: "code"
//! ast_description: "Alert endpoints."
//! ast_version: "v0.1.0"
//! ast_owner: "tbd"
//! ---
use std::sync::Arc;

use ast_core::{AlertResolution, AlertStats};
use ast_store::Record;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::ApiState;
use crate::trucks::DeletedResponse;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AlertQuery {
    truck_id: Option<String>,
    severity: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RecentQuery {
    #[serde(default = "default_recent_limit")]
    limit: usize,
}

fn default_recent_limit() -> usize {
    10
}

pub(crate) async fn list(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<AlertQuery>,
) -> Result<Json<Vec<Record>>, ApiError> {
    let alerts = if let Some(truck_id) = &query.truck_id {
        state.alerts.by_truck(truck_id).await?
    } else if let Some(severity) = &query.severity {
        state.alerts.by_severity(severity).await?
    } else if query.status.as_deref() == Some("active") {
        state.alerts.active().await?
    } else {
        state.alerts.list().await?
    };
    Ok(Json(alerts))
}

pub(crate) async fn create(
    State(state): State<Arc<ApiState>>,
    Json(payload): Json<Record>,
) -> Result<(StatusCode, Json<Record>), ApiError> {
    let alert = state.alerts.create(payload).await?;
    Ok((StatusCode::CREATED, Json(alert)))
}

pub(crate) async fn get(
    State(state): State<Arc<ApiState>>,
    Path(alert_id): Path<String>,
) -> Result<Json<Record>, ApiError> {
    Ok(Json(state.alerts.get(&alert_id).await?))
}

pub(crate) async fn update(
    State(state): State<Arc<ApiState>>,
    Path(alert_id): Path<String>,
    Json(fields): Json<Record>,
) -> Result<Json<Record>, ApiError> {
    Ok(Json(state.alerts.update(&alert_id, fields).await?))
}

pub(crate) async fn resolve(
    State(state): State<Arc<ApiState>>,
    Path(alert_id): Path<String>,
    payload: Option<Json<AlertResolution>>,
) -> Result<Json<Record>, ApiError> {
    let resolution = payload.map(|Json(r)| r).unwrap_or_default();
    Ok(Json(state.alerts.resolve(&alert_id, resolution).await?))
}

pub(crate) async fn delete(
    State(state): State<Arc<ApiState>>,
    Path(alert_id): Path<String>,
) -> Result<Json<DeletedResponse>, ApiError> {
    state.alerts.delete(&alert_id).await?;
    Ok(Json(DeletedResponse {
        message: format!("Alert {alert_id} deleted successfully"),
    }))
}

pub(crate) async fn recent(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<RecentQuery>,
) -> Result<Json<Vec<Record>>, ApiError> {
    Ok(Json(state.alerts.recent(query.limit).await?))
}

pub(crate) async fn stats(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<AlertStats>, ApiError> {
    Ok(Json(state.alerts.stats().await?))
}
