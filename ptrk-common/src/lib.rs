//! # PTRK Common Library
//!
//! Milestone progress engine shared by the PTRK services:
//! - Milestone weight templates (system defaults and project overrides)
//! - Weight validation and the percent-complete calculator
//! - Atomic recalculation of cached progress after a weight change
//! - Append-only template change audit trail
//! - Database initialization, configuration loading and engine events

pub mod audit;
pub mod auth;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod events;
pub mod locks;
pub mod progress;
pub mod recalc;
pub mod sse;
pub mod templates;
pub mod time;

pub use auth::{Actor, Role};
pub use engine::{AffectedPreview, ProgressEngine, UpdateResult, UpdateTemplateRequest};
pub use error::{Error, Result};
pub use events::{EngineEvent, EventBus};
pub use progress::{calculate_percent, MilestoneState, MilestoneValue};
pub use templates::{Template, TemplateScope, TemplateState, WeightEntry};
