//! Template administration endpoints
//!
//! Component types appear in paths percent-encoded (`Field%20Weld`).

use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use ptrk_common::audit::TemplateChangeRecord;
use ptrk_common::recalc::RecalcOutcome;
use ptrk_common::templates::store::CloneReport;
use ptrk_common::{
    AffectedPreview, Error, Template, TemplateState, UpdateResult, UpdateTemplateRequest,
    WeightEntry,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ApiError, RequestActor};
use crate::AppState;

/// Effective template with its lifecycle position and last change
#[derive(Debug, Serialize)]
pub struct TemplateResponse {
    pub template: Template,
    pub state: TemplateState,
    /// "Last modified by X at T, affecting N components"
    pub last_change: Option<TemplateChangeRecord>,
}

/// GET /api/projects/:project_id/templates/:component_type
pub async fn get_template(
    State(state): State<AppState>,
    Path((project_id, component_type)): Path<(Uuid, String)>,
) -> Result<Json<TemplateResponse>, ApiError> {
    let engine = &state.engine;
    let template = engine.get_effective_template(project_id, &component_type).await?;
    let template_state = engine.template_state(project_id, &component_type).await?;
    let last_change = engine.latest_change(project_id, &component_type).await?;

    Ok(Json(TemplateResponse {
        template,
        state: template_state,
        last_change,
    }))
}

/// GET /api/projects/:project_id/templates/:component_type/preview
///
/// Affected-component count shown before the operator commits an edit.
pub async fn preview_update(
    State(state): State<AppState>,
    Path((project_id, component_type)): Path<(Uuid, String)>,
) -> Result<Json<AffectedPreview>, ApiError> {
    Ok(Json(
        state.engine.preview_affected_count(project_id, &component_type).await?,
    ))
}

/// Body of a weight edit
#[derive(Debug, Deserialize)]
pub struct UpdateTemplateBody {
    pub new_weights: Vec<WeightEntry>,
    #[serde(default)]
    pub apply_to_existing: bool,
    /// Version shown in the editor; omit when editing the system default
    #[serde(default)]
    pub expected_version: Option<i64>,
}

/// PUT /api/projects/:project_id/templates/:component_type
pub async fn update_template(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path((project_id, component_type)): Path<(Uuid, String)>,
    Json(body): Json<UpdateTemplateBody>,
) -> Result<Json<UpdateResult>, ApiError> {
    let request = UpdateTemplateRequest {
        project_id,
        component_type,
        new_weights: body.new_weights,
        apply_to_existing: body.apply_to_existing,
        expected_version: body.expected_version,
    };

    let result = state
        .engine
        .update_template_cancellable(&actor, request, &state.shutdown.child_token())
        .await?;
    Ok(Json(result))
}

/// GET /api/projects/:project_id/templates/:component_type/history
pub async fn get_history(
    State(state): State<AppState>,
    Path((project_id, component_type)): Path<(Uuid, String)>,
) -> Result<Json<Vec<TemplateChangeRecord>>, ApiError> {
    Ok(Json(state.engine.change_history(project_id, &component_type).await?))
}

/// GET /api/projects/:project_id/history
///
/// Template changes across every component type of the project.
pub async fn get_project_history(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<TemplateChangeRecord>>, ApiError> {
    Ok(Json(state.engine.project_change_history(project_id).await?))
}

/// POST /api/projects/:project_id/templates/:component_type/recalculate
pub async fn recalculate(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path((project_id, component_type)): Path<(Uuid, String)>,
) -> Result<Json<RecalcOutcome>, ApiError> {
    let outcome = state
        .engine
        .recalculate(&actor, project_id, &component_type, &state.shutdown.child_token())
        .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CloneBody {
    #[serde(default)]
    pub force: bool,
}

impl CloneBody {
    /// An empty body means a plain clone; anything else must parse
    fn parse(body: &[u8]) -> Result<Self, ApiError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body).map_err(|e| {
            ApiError(Error::InvalidInput(format!("clone request body: {}", e)))
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ClonedTemplateSummary {
    pub component_type: String,
    pub version: i64,
    pub replaced_version: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CloneResponse {
    pub project_id: Uuid,
    pub skipped: bool,
    pub cloned: Vec<ClonedTemplateSummary>,
}

impl CloneResponse {
    fn from_report(project_id: Uuid, report: CloneReport) -> Self {
        Self {
            project_id,
            skipped: report.skipped,
            cloned: report
                .cloned
                .into_iter()
                .map(|c| ClonedTemplateSummary {
                    replaced_version: c.replaced.map(|t| t.version),
                    component_type: c.template.component_type,
                    version: c.template.version,
                })
                .collect(),
        }
    }
}

/// POST /api/projects/:project_id/clone-templates
///
/// Body is optional; `{"force": true}` replaces existing project templates.
pub async fn clone_templates(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(project_id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<CloneResponse>, ApiError> {
    let force = CloneBody::parse(&body)?.force;
    let report = state
        .engine
        .clone_system_templates(&actor, project_id, force)
        .await?;
    Ok(Json(CloneResponse::from_report(project_id, report)))
}
