//! ---
//! ast_section: "05-http-facade"
//! ast_subsection: "module"
//! ast_type: "source"
//! ast_scope: "code"
//! ast_description: "Truck fleet endpoints."
//! ast_version: "v0.1.0"
//! ast_owner: "tbd"
//! ---
use std::sync::Arc;

use ast_core::{TruckLocation, TruckStats, TruckStatus, TruckTelemetry};
use ast_store::Record;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::error::ApiError;
use crate::state::ApiState;

#[derive(Debug, Serialize)]
pub(crate) struct DeletedResponse {
    pub(crate) message: String,
}

pub(crate) async fn list(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<Vec<Record>>, ApiError> {
    Ok(Json(state.trucks.list().await?))
}

pub(crate) async fn create(
    State(state): State<Arc<ApiState>>,
    Json(payload): Json<Record>,
) -> Result<(StatusCode, Json<Record>), ApiError> {
    let truck = state.trucks.create(payload).await?;
    Ok((StatusCode::CREATED, Json(truck)))
}

pub(crate) async fn get(
    State(state): State<Arc<ApiState>>,
    Path(truck_id): Path<String>,
) -> Result<Json<Record>, ApiError> {
    Ok(Json(state.trucks.get(&truck_id).await?))
}

pub(crate) async fn update(
    State(state): State<Arc<ApiState>>,
    Path(truck_id): Path<String>,
    Json(fields): Json<Record>,
) -> Result<Json<Record>, ApiError> {
    Ok(Json(state.trucks.update(&truck_id, fields).await?))
}

pub(crate) async fn delete(
    State(state): State<Arc<ApiState>>,
    Path(truck_id): Path<String>,
) -> Result<Json<DeletedResponse>, ApiError> {
    state.trucks.delete(&truck_id).await?;
    Ok(Json(DeletedResponse {
        message: format!("Truck {truck_id} deleted successfully"),
    }))
}

pub(crate) async fn location(
    State(state): State<Arc<ApiState>>,
    Path(truck_id): Path<String>,
) -> Result<Json<TruckLocation>, ApiError> {
    Ok(Json(state.trucks.location(&truck_id).await?))
}

pub(crate) async fn status(
    State(state): State<Arc<ApiState>>,
    Path(truck_id): Path<String>,
) -> Result<Json<TruckStatus>, ApiError> {
    Ok(Json(state.trucks.status(&truck_id).await?))
}

pub(crate) async fn telemetry(
    State(state): State<Arc<ApiState>>,
    Path(truck_id): Path<String>,
) -> Result<Json<TruckTelemetry>, ApiError> {
    Ok(Json(state.trucks.telemetry(&truck_id).await?))
}

pub(crate) async fn stats(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<TruckStats>, ApiError> {
    Ok(Json(state.trucks.stats().await?))
}
