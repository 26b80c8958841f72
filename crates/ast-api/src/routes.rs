//! ---
//! ast_section: "05-http-facade"
//! ast_subsection: "module"
//! ast_type: "source"
//! ast_scope: "code"
//! ast_description: "Delivery route endpoints."
//! ast_version: "v0.1.0"
//! ast_owner: "tbd"
//! ---
use std::sync::Arc;

use ast_core::RouteStats;
use ast_store::Record;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::ApiState;
use crate::trucks::DeletedResponse;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RouteQuery {
    truck_id: Option<String>,
    status: Option<String>,
}

pub(crate) async fn list(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<RouteQuery>,
) -> Result<Json<Vec<Record>>, ApiError> {
    let routes = if let Some(truck_id) = &query.truck_id {
        state.routes.by_truck(truck_id).await?
    } else if let Some(status) = &query.status {
        state.routes.by_status(status).await?
    } else {
        state.routes.list().await?
    };
    Ok(Json(routes))
}

pub(crate) async fn create(
    State(state): State<Arc<ApiState>>,
    Json(payload): Json<Record>,
) -> Result<(StatusCode, Json<Record>), ApiError> {
    let route = state.routes.create(payload).await?;
    Ok((StatusCode::CREATED, Json(route)))
}

pub(crate) async fn get(
    State(state): State<Arc<ApiState>>,
    Path(route_id): Path<String>,
) -> Result<Json<Record>, ApiError> {
    Ok(Json(state.routes.get(&route_id).await?))
}

pub(crate) async fn update(
    State(state): State<Arc<ApiState>>,
    Path(route_id): Path<String>,
    Json(fields): Json<Record>,
) -> Result<Json<Record>, ApiError> {
    Ok(Json(state.routes.update(&route_id, fields).await?))
}

pub(crate) async fn delete(
    State(state): State<Arc<ApiState>>,
    Path(route_id): Path<String>,
) -> Result<Json<DeletedResponse>, ApiError> {
    state.routes.delete(&route_id).await?;
    Ok(Json(DeletedResponse {
        message: format!("Route {route_id} deleted successfully"),
    }))
}

pub(crate) async fn start(
    State(state): State<Arc<ApiState>>,
    Path(route_id): Path<String>,
) -> Result<Json<Record>, ApiError> {
    Ok(Json(state.routes.start(&route_id).await?))
}

pub(crate) async fn complete(
    State(state): State<Arc<ApiState>>,
    Path(route_id): Path<String>,
) -> Result<Json<Record>, ApiError> {
    Ok(Json(state.routes.complete(&route_id).await?))
}

pub(crate) async fn stats(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<RouteStats>, ApiError> {
    Ok(Json(state.routes.stats().await?))
}
