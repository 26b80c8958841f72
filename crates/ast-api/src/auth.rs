//! ---
//! ast_section: "05-http-facade"
//! ast_subsection: "module"
//! ast_type: "source"
//! ast_scope: "code"
//! ast_description: "Login, logout, and registration endpoints."
//! ast_version: "v0.1.0"
//! ast_owner: "tbd"
//! ---
use std::sync::Arc;

use ast_core::issue_token;
use ast_store::Record;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiError;
use crate::state::ApiState;

#[derive(Debug, Deserialize)]
pub(crate) struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct LoginResponse {
    token: String,
    user: Record,
}

#[derive(Debug, Serialize)]
pub(crate) struct MessageResponse {
    message: String,
}

pub(crate) async fn login(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user = state
        .users
        .authenticate(&request.username, &request.password)
        .await?;
    let token = issue_token(&request.username);
    info!(user = %request.username, "api login");
    Ok(Json(LoginResponse { token, user }))
}

pub(crate) async fn logout() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "logged out".to_owned(),
    })
}

pub(crate) async fn register(
    State(state): State<Arc<ApiState>>,
    Json(payload): Json<Record>,
) -> Result<(StatusCode, Json<Record>), ApiError> {
    let user = state.users.register(payload).await?;
    Ok((StatusCode::CREATED, Json(user)))
}
