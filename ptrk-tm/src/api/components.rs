//! Component endpoints used by the milestone update source

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use ptrk_common::progress::{Component, NewComponent, ProgressUpdate};
use ptrk_common::MilestoneState;
use serde::Deserialize;
use uuid::Uuid;

use super::ApiError;
use crate::AppState;

/// POST /api/components
pub async fn register_component(
    State(state): State<AppState>,
    Json(new): Json<NewComponent>,
) -> Result<(StatusCode, Json<Component>), ApiError> {
    let component = state.engine.register_component(new).await?;
    Ok((StatusCode::CREATED, Json(component)))
}

#[derive(Debug, Deserialize)]
pub struct ComponentListQuery {
    pub component_type: String,
}

/// GET /api/projects/:project_id/components?component_type=...
pub async fn list_components(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Query(query): Query<ComponentListQuery>,
) -> Result<Json<Vec<Component>>, ApiError> {
    let components = state
        .engine
        .list_components(project_id, &query.component_type)
        .await?;
    Ok(Json(components))
}

/// GET /api/components/:component_id
pub async fn get_component(
    State(state): State<AppState>,
    Path(component_id): Path<Uuid>,
) -> Result<Json<Component>, ApiError> {
    Ok(Json(state.engine.get_component(component_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct MilestoneUpdateBody {
    /// Merged over the stored state
    pub milestones: MilestoneState,
}

/// PUT /api/components/:component_id/milestones
pub async fn update_milestones(
    State(state): State<AppState>,
    Path(component_id): Path<Uuid>,
    Json(body): Json<MilestoneUpdateBody>,
) -> Result<Json<ProgressUpdate>, ApiError> {
    let update = state
        .engine
        .apply_milestone_update(component_id, &body.milestones)
        .await?;
    Ok(Json(update))
}
