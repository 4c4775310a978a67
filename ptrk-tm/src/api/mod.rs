//! HTTP API handlers for ptrk-tm

pub mod auth;
pub mod components;
pub mod error;
pub mod health;
pub mod sse;
pub mod templates;

pub use auth::RequestActor;
pub use components::{get_component, list_components, register_component, update_milestones};
pub use error::ApiError;
pub use health::health_routes;
pub use sse::event_stream;
pub use templates::{
    clone_templates, get_history, get_project_history, get_template, preview_update, recalculate,
    update_template,
};
