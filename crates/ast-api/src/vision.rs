//! ---
//! ast_section: "05-http-facade"
//! ast_subsection: "module"
//! ast_type: "source"
//! ast_scope: "code"
//! ast_description: "Camera-feed processing endpoints."
//! ast_version: "v0.1.0"
//! ast_owner: "tbd"
//! ---
use std::sync::Arc;

use ast_core::{VisionOutcome, VisionStats};
use ast_store::Record;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::ApiState;

#[derive(Debug, Deserialize)]
pub(crate) struct ProcessRequest {
    image: String,
    truck_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DetectionsQuery {
    #[serde(default = "default_detection_limit")]
    limit: usize,
}

fn default_detection_limit() -> usize {
    10
}

pub(crate) async fn process(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<ProcessRequest>,
) -> Result<Json<VisionOutcome>, ApiError> {
    let outcome = state
        .vision
        .process_image(&request.image, request.truck_id.as_deref())
        .await?;
    Ok(Json(outcome))
}

pub(crate) async fn detections(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<DetectionsQuery>,
) -> Result<Json<Vec<Record>>, ApiError> {
    Ok(Json(state.vision.recent_detections(query.limit).await?))
}

pub(crate) async fn stats(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<VisionStats>, ApiError> {
    Ok(Json(state.vision.stats().await?))
}
