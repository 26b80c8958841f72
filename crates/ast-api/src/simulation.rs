//! ---
//! ast_section: "05-http-facade"
//! ast_subsection: "module"
//! ast_type: "source"
//! ast_scope: "code"
//! ast_description: "Simulation session endpoints."
//! ast_version: "v0.1.0"
//! ast_owner: "tbd"
//! ---
use std::sync::Arc;

use ast_sim::{SessionResult, SessionSpec, StartAck, StopAck};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::ApiState;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct StatusQuery {
    id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct StopRequest {
    session_id: Option<String>,
}

/// Accepts an optional session config; an absent or empty body starts a
/// session with the defaults.
pub(crate) async fn start(
    State(state): State<Arc<ApiState>>,
    payload: Option<Json<SessionSpec>>,
) -> Result<(StatusCode, Json<StartAck>), ApiError> {
    let spec = payload.map(|Json(spec)| spec).unwrap_or_default();
    let ack = state.registry.start(spec)?;
    Ok((StatusCode::ACCEPTED, Json(ack)))
}

/// With `?id=` returns one session's snapshot; without it, the digest list
/// of every known session.
pub(crate) async fn status(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<StatusQuery>,
) -> Result<Response, ApiError> {
    match query.id {
        Some(id) => {
            let snapshot = state.registry.status(&id)?;
            Ok(Json(snapshot).into_response())
        }
        None => Ok(Json(state.registry.digest()).into_response()),
    }
}

pub(crate) async fn stop(
    State(state): State<Arc<ApiState>>,
    payload: Option<Json<StopRequest>>,
) -> Result<(StatusCode, Json<StopAck>), ApiError> {
    let request = payload.map(|Json(r)| r).unwrap_or_default();
    let ack = state.registry.stop(request.session_id.as_deref())?;
    Ok((StatusCode::ACCEPTED, Json(ack)))
}

pub(crate) async fn result(
    State(state): State<Arc<ApiState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionResult>, ApiError> {
    Ok(Json(state.registry.result(&session_id)?))
}
