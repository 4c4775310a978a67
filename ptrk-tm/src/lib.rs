//! ptrk-tm library - Template Manager service
//!
//! HTTP/JSON surface over the progress engine for the template
//! administration UI and the milestone update source.

use axum::Router;
use ptrk_common::ProgressEngine;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

pub mod api;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: ProgressEngine,
    /// Cancelled on shutdown; in-flight recalculations roll back
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(engine: ProgressEngine) -> Self {
        Self {
            engine,
            shutdown: CancellationToken::new(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post, put};

    let templates = Router::new()
        .route(
            "/api/projects/:project_id/templates/:component_type",
            get(api::get_template).put(api::update_template),
        )
        .route(
            "/api/projects/:project_id/templates/:component_type/preview",
            get(api::preview_update),
        )
        .route(
            "/api/projects/:project_id/templates/:component_type/history",
            get(api::get_history),
        )
        .route(
            "/api/projects/:project_id/templates/:component_type/recalculate",
            post(api::recalculate),
        )
        .route(
            "/api/projects/:project_id/history",
            get(api::get_project_history),
        )
        .route(
            "/api/projects/:project_id/clone-templates",
            post(api::clone_templates),
        );

    let components = Router::new()
        .route(
            "/api/projects/:project_id/components",
            get(api::list_components),
        )
        .route("/api/components", post(api::register_component))
        .route("/api/components/:component_id", get(api::get_component))
        .route(
            "/api/components/:component_id/milestones",
            put(api::update_milestones),
        );

    Router::new()
        .merge(templates)
        .merge(components)
        .route("/api/events", get(api::event_stream))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
