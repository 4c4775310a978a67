//! Component progress persistence
//!
//! Components reference no template directly. The effective template is
//! resolved at calculation time from (project_id, component_type), inside the
//! same transaction that writes the cached `percent_complete`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use super::calculator::{calculate_percent, MilestoneState, MilestoneValue};
use crate::db::{begin_write, retry_on_lock};
use crate::templates::store::resolve_effective;
use crate::templates::{Template, TemplateScope};
use crate::time;
use crate::{Error, Result};

/// A tracked component with its cached progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub id: Uuid,
    pub project_id: Uuid,
    pub component_type: String,
    pub milestone_state: MilestoneState,
    /// Derived from `milestone_state` and the effective template
    pub percent_complete: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Component registration request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewComponent {
    pub project_id: Uuid,
    pub component_type: String,
    #[serde(default)]
    pub milestone_state: MilestoneState,
}

/// Outcome of a single-component milestone update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub component_id: Uuid,
    pub project_id: Uuid,
    pub component_type: String,
    pub previous_percent: u8,
    pub percent_complete: u8,
    pub template_scope: TemplateScope,
    pub template_version: i64,
}

/// Check an incoming milestone state against the template's key set
///
/// Discrete milestones take `true`/`false`; partial milestones take a boolean
/// or a number in `0..=100`.
pub fn check_state(template: &Template, state: &MilestoneState) -> Result<()> {
    for (name, value) in state {
        let Some(milestone) = template.milestone(name) else {
            return Err(Error::InvalidInput(format!(
                "milestone '{}' is not defined by the '{}' template",
                name, template.component_type
            )));
        };

        match (milestone.is_partial, value) {
            (false, MilestoneValue::Fraction(_)) => {
                return Err(Error::InvalidInput(format!(
                    "milestone '{}' is discrete; expected true or false",
                    name
                )));
            }
            (true, MilestoneValue::Fraction(f)) if !f.is_finite() || *f < 0.0 || *f > 100.0 => {
                return Err(Error::InvalidInput(format!(
                    "milestone '{}' completion {} outside 0..=100",
                    name, f
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

type ComponentRow = (String, String, String, String, i64, String, String);

fn row_to_component(row: ComponentRow) -> Result<Component> {
    let (id, project_id, component_type, milestone_state, percent, created_at, updated_at) = row;
    Ok(Component {
        id: time::parse_uuid("id", &id)?,
        project_id: time::parse_uuid("project_id", &project_id)?,
        component_type,
        milestone_state: serde_json::from_str(&milestone_state)?,
        percent_complete: percent.clamp(0, 100) as u8,
        created_at: time::parse_stored("created_at", &created_at)?,
        updated_at: time::parse_stored("updated_at", &updated_at)?,
    })
}

async fn fetch_component(conn: &mut SqliteConnection, component_id: Uuid) -> Result<Component> {
    let row = sqlx::query_as::<_, ComponentRow>(
        r#"
        SELECT id, project_id, component_type, milestone_state, percent_complete, created_at, updated_at
        FROM components
        WHERE id = ?
        "#,
    )
    .bind(component_id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => row_to_component(row),
        None => Err(Error::NotFound(format!("Component {}", component_id))),
    }
}

/// Number of components of one type in a project
pub async fn count_for_template(
    conn: &mut SqliteConnection,
    project_id: Uuid,
    component_type: &str,
) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM components WHERE project_id = ? AND component_type = ?",
    )
    .bind(project_id.to_string())
    .bind(component_type)
    .fetch_one(&mut *conn)
    .await?;

    Ok(count)
}

/// Component registration, lookup and milestone updates
#[derive(Clone)]
pub struct ComponentStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl ComponentStore {
    pub fn new(pool: SqlitePool, max_lock_wait_ms: u64) -> Self {
        Self {
            pool,
            max_lock_wait_ms,
        }
    }

    /// Register a component and compute its initial progress
    pub async fn insert(&self, new: NewComponent) -> Result<Component> {
        retry_on_lock("register_component", self.max_lock_wait_ms, || {
            self.insert_once(&new)
        })
        .await
    }

    async fn insert_once(&self, new: &NewComponent) -> Result<Component> {
        let mut tx = begin_write(&self.pool).await?;
        let template = resolve_effective(&mut tx, new.project_id, &new.component_type).await?;
        check_state(&template, &new.milestone_state)?;

        let now = time::now();
        let component = Component {
            id: Uuid::new_v4(),
            project_id: new.project_id,
            component_type: new.component_type.clone(),
            percent_complete: calculate_percent(&new.milestone_state, &template),
            milestone_state: new.milestone_state.clone(),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO components
                (id, project_id, component_type, milestone_state, percent_complete, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(component.id.to_string())
        .bind(component.project_id.to_string())
        .bind(&component.component_type)
        .bind(serde_json::to_string(&component.milestone_state)?)
        .bind(component.percent_complete as i64)
        .bind(time::to_storage(&now))
        .bind(time::to_storage(&now))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            component_id = %component.id,
            component_type = %component.component_type,
            percent_complete = component.percent_complete,
            "Registered component"
        );
        Ok(component)
    }

    pub async fn get(&self, component_id: Uuid) -> Result<Component> {
        let mut conn = self.pool.acquire().await?;
        fetch_component(&mut conn, component_id).await
    }

    pub async fn list_for_template(
        &self,
        project_id: Uuid,
        component_type: &str,
    ) -> Result<Vec<Component>> {
        let rows = sqlx::query_as::<_, ComponentRow>(
            r#"
            SELECT id, project_id, component_type, milestone_state, percent_complete, created_at, updated_at
            FROM components
            WHERE project_id = ? AND component_type = ?
            ORDER BY id
            "#,
        )
        .bind(project_id.to_string())
        .bind(component_type)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_component).collect()
    }

    /// Apply a milestone state change and refresh the cached percentage
    ///
    /// `update` is merged over the stored state; keys it does not mention keep
    /// their recorded values.
    pub async fn apply_milestone_update(
        &self,
        component_id: Uuid,
        update: &MilestoneState,
    ) -> Result<ProgressUpdate> {
        retry_on_lock("apply_milestone_update", self.max_lock_wait_ms, || {
            self.apply_once(component_id, update)
        })
        .await
    }

    async fn apply_once(
        &self,
        component_id: Uuid,
        update: &MilestoneState,
    ) -> Result<ProgressUpdate> {
        let mut tx = begin_write(&self.pool).await?;

        let component = fetch_component(&mut tx, component_id).await?;
        let template =
            resolve_effective(&mut tx, component.project_id, &component.component_type).await?;
        check_state(&template, update)?;

        let mut merged = component.milestone_state.clone();
        merged.extend(update.iter().map(|(k, v)| (k.clone(), *v)));
        let percent = calculate_percent(&merged, &template);

        sqlx::query(
            "UPDATE components SET milestone_state = ?, percent_complete = ?, updated_at = ? WHERE id = ?",
        )
        .bind(serde_json::to_string(&merged)?)
        .bind(percent as i64)
        .bind(time::to_storage(&time::now()))
        .bind(component_id.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            component_id = %component_id,
            previous = component.percent_complete,
            percent_complete = percent,
            "Milestone update applied"
        );

        Ok(ProgressUpdate {
            component_id,
            project_id: component.project_id,
            component_type: component.component_type,
            previous_percent: component.percent_complete,
            percent_complete: percent,
            template_scope: template.scope,
            template_version: template.version,
        })
    }
}
