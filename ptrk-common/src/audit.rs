//! Template change audit trail
//!
//! Append-only. Records are written inside the same transaction as the
//! template swap they describe, so a rolled-back change leaves no record.
//! There is no update or delete path; the table's triggers reject both.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::templates::WeightEntry;
use crate::time;
use crate::Result;

/// One immutable audit entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateChangeRecord {
    pub id: i64,
    pub project_id: Uuid,
    pub component_type: String,
    pub actor: String,
    pub old_weights: Vec<WeightEntry>,
    pub new_weights: Vec<WeightEntry>,
    pub applied_to_existing: bool,
    pub affected_component_count: i64,
    /// Project template version produced by the change
    pub new_version: i64,
    pub changed_at: DateTime<Utc>,
}

/// Fields of a change about to be recorded
#[derive(Debug, Clone)]
pub struct TemplateChange {
    pub project_id: Uuid,
    pub component_type: String,
    pub actor: String,
    pub old_weights: Vec<WeightEntry>,
    pub new_weights: Vec<WeightEntry>,
    pub applied_to_existing: bool,
    pub affected_component_count: i64,
    pub new_version: i64,
}

type ChangeRow = (i64, String, String, String, String, String, bool, i64, i64, String);

fn row_to_record(row: ChangeRow) -> Result<TemplateChangeRecord> {
    let (
        id,
        project_id,
        component_type,
        actor,
        old_weights,
        new_weights,
        applied_to_existing,
        affected_component_count,
        new_version,
        changed_at,
    ) = row;

    Ok(TemplateChangeRecord {
        id,
        project_id: time::parse_uuid("project_id", &project_id)?,
        component_type,
        actor,
        old_weights: serde_json::from_str(&old_weights)?,
        new_weights: serde_json::from_str(&new_weights)?,
        applied_to_existing,
        affected_component_count,
        new_version,
        changed_at: time::parse_stored("changed_at", &changed_at)?,
    })
}

/// Append one change record
pub async fn record_change(
    conn: &mut SqliteConnection,
    change: &TemplateChange,
) -> Result<TemplateChangeRecord> {
    let changed_at = time::now();

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO template_changes (
            project_id, component_type, actor, old_weights, new_weights,
            applied_to_existing, affected_component_count, new_version, changed_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(change.project_id.to_string())
    .bind(&change.component_type)
    .bind(&change.actor)
    .bind(serde_json::to_string(&change.old_weights)?)
    .bind(serde_json::to_string(&change.new_weights)?)
    .bind(change.applied_to_existing)
    .bind(change.affected_component_count)
    .bind(change.new_version)
    .bind(time::to_storage(&changed_at))
    .fetch_one(&mut *conn)
    .await?;

    tracing::debug!(
        change_id = id,
        project_id = %change.project_id,
        component_type = %change.component_type,
        "Template change recorded"
    );

    Ok(TemplateChangeRecord {
        id,
        project_id: change.project_id,
        component_type: change.component_type.clone(),
        actor: change.actor.clone(),
        old_weights: change.old_weights.clone(),
        new_weights: change.new_weights.clone(),
        applied_to_existing: change.applied_to_existing,
        affected_component_count: change.affected_component_count,
        new_version: change.new_version,
        changed_at,
    })
}

/// Read access to the audit trail
#[derive(Clone)]
pub struct AuditLog {
    pool: SqlitePool,
}

impl AuditLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All changes for (project, component type), oldest first
    pub async fn history(
        &self,
        project_id: Uuid,
        component_type: &str,
    ) -> Result<Vec<TemplateChangeRecord>> {
        let rows = sqlx::query_as::<_, ChangeRow>(
            r#"
            SELECT id, project_id, component_type, actor, old_weights, new_weights,
                   applied_to_existing, affected_component_count, new_version, changed_at
            FROM template_changes
            WHERE project_id = ? AND component_type = ?
            ORDER BY id
            "#,
        )
        .bind(project_id.to_string())
        .bind(component_type)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_record).collect()
    }

    /// Most recent change, for "last modified by X at T" displays
    pub async fn latest(
        &self,
        project_id: Uuid,
        component_type: &str,
    ) -> Result<Option<TemplateChangeRecord>> {
        let row = sqlx::query_as::<_, ChangeRow>(
            r#"
            SELECT id, project_id, component_type, actor, old_weights, new_weights,
                   applied_to_existing, affected_component_count, new_version, changed_at
            FROM template_changes
            WHERE project_id = ? AND component_type = ?
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(project_id.to_string())
        .bind(component_type)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_record).transpose()
    }

    /// Changes across every component type of a project, oldest first
    pub async fn project_history(&self, project_id: Uuid) -> Result<Vec<TemplateChangeRecord>> {
        let rows = sqlx::query_as::<_, ChangeRow>(
            r#"
            SELECT id, project_id, component_type, actor, old_weights, new_weights,
                   applied_to_existing, affected_component_count, new_version, changed_at
            FROM template_changes
            WHERE project_id = ?
            ORDER BY id
            "#,
        )
        .bind(project_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_record).collect()
    }
}
