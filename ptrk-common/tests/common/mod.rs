//! Shared fixtures for engine integration tests

#![allow(dead_code)]

use ptrk_common::config::EngineSettings;
use ptrk_common::progress::{Component, NewComponent};
use ptrk_common::{Actor, MilestoneState, MilestoneValue, ProgressEngine, Role, WeightEntry};
use tempfile::TempDir;
use uuid::Uuid;

/// Engine over a fresh, seeded database in a temporary directory
///
/// Keep the `TempDir` alive for the duration of the test.
pub async fn engine() -> (TempDir, ProgressEngine) {
    engine_with(EngineSettings::default()).await
}

pub async fn engine_with(settings: EngineSettings) -> (TempDir, ProgressEngine) {
    let dir = TempDir::new().unwrap();
    let engine = ProgressEngine::open(&dir.path().join("ptrk.db"), &settings)
        .await
        .unwrap();
    (dir, engine)
}

pub fn project_manager() -> Actor {
    Actor::new("pm-alice", Role::ProjectManager)
}

pub fn foreman() -> Actor {
    Actor::new("foreman-bob", Role::Foreman)
}

pub fn weights(pairs: &[(&str, i32)]) -> Vec<WeightEntry> {
    pairs.iter().map(|(m, w)| WeightEntry::new(m, *w)).collect()
}

pub fn done(names: &[&str]) -> MilestoneState {
    names
        .iter()
        .map(|n| (n.to_string(), MilestoneValue::Done(true)))
        .collect()
}

/// Field Weld override from the administration scenarios
pub fn field_weld_override() -> Vec<WeightEntry> {
    weights(&[
        ("Fit-Up", 20),
        ("Weld Made", 50),
        ("Punch", 10),
        ("Test", 15),
        ("Restore", 5),
    ])
}

pub async fn add_component(
    engine: &ProgressEngine,
    project_id: Uuid,
    component_type: &str,
    state: MilestoneState,
) -> Component {
    engine
        .register_component(NewComponent {
            project_id,
            component_type: component_type.to_string(),
            milestone_state: state,
        })
        .await
        .unwrap()
}

/// Cached percentages read straight from the table, ordered by id
pub async fn stored_percents(engine: &ProgressEngine, project_id: Uuid) -> Vec<(String, i64)> {
    sqlx::query_as("SELECT id, percent_complete FROM components WHERE project_id = ? ORDER BY id")
        .bind(project_id.to_string())
        .fetch_all(engine.pool())
        .await
        .unwrap()
}

pub async fn audit_count(engine: &ProgressEngine) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM template_changes")
        .fetch_one(engine.pool())
        .await
        .unwrap()
}
