//! Template persistence and effective-template resolution
//!
//! Reads go through [`TemplateStore`]. Writes are free functions taking a
//! `&mut SqliteConnection` so callers can compose them inside one
//! transaction together with recalculation and audit writes.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, error};
use uuid::Uuid;

use super::{validate, MilestoneDef, Template, TemplateScope, TemplateState};
use crate::time;
use crate::{Error, Result};

/// Read access to system and project templates
#[derive(Clone)]
pub struct TemplateStore {
    pool: SqlitePool,
}

impl TemplateStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Project override if one is active, else the system template
    pub async fn get_effective_template(
        &self,
        project_id: Uuid,
        component_type: &str,
    ) -> Result<Template> {
        let mut conn = self.pool.acquire().await?;
        resolve_effective(&mut conn, project_id, component_type).await
    }

    pub async fn system_template(&self, component_type: &str) -> Result<Template> {
        let mut conn = self.pool.acquire().await?;
        load_active(&mut conn, &TemplateScope::System, component_type)
            .await?
            .ok_or_else(|| unknown_component_type(component_type))
    }

    pub async fn project_template(
        &self,
        project_id: Uuid,
        component_type: &str,
    ) -> Result<Option<Template>> {
        let mut conn = self.pool.acquire().await?;
        load_active(&mut conn, &TemplateScope::Project(project_id), component_type).await
    }

    pub async fn template_state(
        &self,
        project_id: Uuid,
        component_type: &str,
    ) -> Result<TemplateState> {
        let mut conn = self.pool.acquire().await?;
        template_state(&mut conn, project_id, component_type).await
    }

    /// Component types with an active system template
    pub async fn component_types(&self) -> Result<Vec<String>> {
        let mut conn = self.pool.acquire().await?;
        component_types(&mut conn).await
    }
}

fn unknown_component_type(component_type: &str) -> Error {
    Error::NotFound(format!(
        "No system template for component type '{}'",
        component_type
    ))
}

fn describe_version(version: Option<i64>) -> String {
    match version {
        Some(v) => format!("v{}", v),
        None => "system default".to_string(),
    }
}

/// Load the active template for one scope, if any
///
/// Stored templates are re-validated on read; a row set that violates the
/// weight invariant is reported as an internal error rather than used.
pub async fn load_active(
    conn: &mut SqliteConnection,
    scope: &TemplateScope,
    component_type: &str,
) -> Result<Option<Template>> {
    let scope_key = scope.storage_key();

    let header = sqlx::query_as::<_, (i64, String, String)>(
        r#"
        SELECT version, created_by, created_at
        FROM template_versions
        WHERE scope = ? AND component_type = ? AND is_active = 1
        "#,
    )
    .bind(&scope_key)
    .bind(component_type)
    .fetch_optional(&mut *conn)
    .await?;

    let Some((version, created_by, created_at)) = header else {
        return Ok(None);
    };

    let rows = sqlx::query_as::<_, (String, i32, bool)>(
        r#"
        SELECT milestone_name, weight, is_partial
        FROM template_milestones
        WHERE scope = ? AND component_type = ? AND version = ?
        ORDER BY position
        "#,
    )
    .bind(&scope_key)
    .bind(component_type)
    .bind(version)
    .fetch_all(&mut *conn)
    .await?;

    let template = Template {
        scope: *scope,
        component_type: component_type.to_string(),
        version,
        milestones: rows
            .into_iter()
            .map(|(name, weight, is_partial)| MilestoneDef {
                name,
                weight,
                is_partial,
            })
            .collect(),
        created_by,
        created_at: time::parse_stored("created_at", &created_at)?,
    };

    if let Err(violation) = validate(&template.weights()) {
        error!(
            scope = %scope,
            component_type,
            version,
            %violation,
            "Stored template violates weight invariant"
        );
        return Err(Error::Internal(format!(
            "Stored {} template '{}' v{} is invalid: {}",
            scope, component_type, version, violation
        )));
    }

    Ok(Some(template))
}

/// Walk the lookup chain `[project, system]` and return the first active template
pub async fn resolve_effective(
    conn: &mut SqliteConnection,
    project_id: Uuid,
    component_type: &str,
) -> Result<Template> {
    for scope in TemplateScope::lookup_chain(project_id) {
        if let Some(template) = load_active(conn, &scope, component_type).await? {
            debug!(
                project_id = %project_id,
                component_type,
                scope = %template.scope,
                version = template.version,
                "Resolved effective template"
            );
            return Ok(template);
        }
    }
    Err(unknown_component_type(component_type))
}

pub async fn active_version(
    conn: &mut SqliteConnection,
    scope: &TemplateScope,
    component_type: &str,
) -> Result<Option<i64>> {
    let version = sqlx::query_scalar::<_, i64>(
        "SELECT version FROM template_versions WHERE scope = ? AND component_type = ? AND is_active = 1",
    )
    .bind(scope.storage_key())
    .bind(component_type)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(version)
}

pub async fn template_state(
    conn: &mut SqliteConnection,
    project_id: Uuid,
    component_type: &str,
) -> Result<TemplateState> {
    if active_version(conn, &TemplateScope::System, component_type).await?.is_none() {
        return Err(unknown_component_type(component_type));
    }

    Ok(
        match active_version(conn, &TemplateScope::Project(project_id), component_type).await? {
            Some(version) => TemplateState::ProjectActive { version },
            None => TemplateState::NoProjectOverride,
        },
    )
}

pub async fn component_types(conn: &mut SqliteConnection) -> Result<Vec<String>> {
    let types = sqlx::query_scalar::<_, String>(
        r#"
        SELECT component_type
        FROM template_versions
        WHERE scope = 'system' AND is_active = 1
        ORDER BY component_type
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(types)
}

/// Write a new active version for (scope, component_type)
///
/// Deactivates the previous version in the same statement sequence, so the
/// partial unique index never sees two active rows. Must run inside a
/// transaction for the swap to be atomic.
pub async fn insert_version(
    conn: &mut SqliteConnection,
    scope: &TemplateScope,
    component_type: &str,
    milestones: Vec<MilestoneDef>,
    created_by: &str,
) -> Result<Template> {
    let weights: Vec<_> = milestones
        .iter()
        .map(|m| super::WeightEntry::new(&m.name, m.weight))
        .collect();
    validate(&weights)?;

    let scope_key = scope.storage_key();
    let created_at = time::now();

    let version: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(version), 0) + 1 FROM template_versions WHERE scope = ? AND component_type = ?",
    )
    .bind(&scope_key)
    .bind(component_type)
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query(
        "UPDATE template_versions SET is_active = 0 WHERE scope = ? AND component_type = ? AND is_active = 1",
    )
    .bind(&scope_key)
    .bind(component_type)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO template_versions (scope, component_type, version, is_active, created_by, created_at)
        VALUES (?, ?, ?, 1, ?, ?)
        "#,
    )
    .bind(&scope_key)
    .bind(component_type)
    .bind(version)
    .bind(created_by)
    .bind(time::to_storage(&created_at))
    .execute(&mut *conn)
    .await?;

    for (position, milestone) in milestones.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO template_milestones
                (scope, component_type, version, position, milestone_name, weight, is_partial)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&scope_key)
        .bind(component_type)
        .bind(version)
        .bind(position as i64)
        .bind(&milestone.name)
        .bind(milestone.weight)
        .bind(milestone.is_partial)
        .execute(&mut *conn)
        .await?;
    }

    debug!(scope = %scope, component_type, version, "Template version written");

    Ok(Template {
        scope: *scope,
        component_type: component_type.to_string(),
        version,
        milestones,
        created_by: created_by.to_string(),
        created_at,
    })
}

/// Replace the active project template, checking the caller's version token
///
/// `expected_version` is the project version the caller last read (`None`
/// when it was looking at the system default). A mismatch means another
/// writer got there first.
pub async fn swap_project_template(
    conn: &mut SqliteConnection,
    project_id: Uuid,
    component_type: &str,
    expected_version: Option<i64>,
    milestones: Vec<MilestoneDef>,
    actor: &str,
) -> Result<Template> {
    let scope = TemplateScope::Project(project_id);
    let active = active_version(conn, &scope, component_type).await?;

    if active != expected_version {
        return Err(Error::ConcurrencyConflict(format!(
            "template '{}' for project {} is at {}, request was based on {}; refetch and retry",
            component_type,
            project_id,
            describe_version(active),
            describe_version(expected_version)
        )));
    }

    insert_version(conn, &scope, component_type, milestones, actor).await
}

/// One project template produced by a clone
#[derive(Debug, Clone)]
pub struct ClonedTemplate {
    pub template: Template,
    /// Project template that was active before a forced re-clone
    pub replaced: Option<Template>,
}

#[derive(Debug, Clone, Default)]
pub struct CloneReport {
    pub cloned: Vec<ClonedTemplate>,
    /// True when project templates already existed and `force` was not set
    pub skipped: bool,
}

/// Copy every active system template into project scope
///
/// No-op when the project already has any active template, unless `force`
/// is set, in which case every project template is replaced by a fresh copy
/// of the system template as a new version.
pub async fn clone_system_templates(
    conn: &mut SqliteConnection,
    project_id: Uuid,
    force: bool,
    actor: &str,
) -> Result<CloneReport> {
    let scope = TemplateScope::Project(project_id);

    let existing: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM template_versions WHERE scope = ? AND is_active = 1",
    )
    .bind(scope.storage_key())
    .fetch_one(&mut *conn)
    .await?;

    if existing > 0 && !force {
        debug!(
            project_id = %project_id,
            existing,
            "Project templates already exist, clone skipped"
        );
        return Ok(CloneReport {
            cloned: Vec::new(),
            skipped: true,
        });
    }

    let mut cloned = Vec::new();
    for component_type in component_types(conn).await? {
        let system = load_active(conn, &TemplateScope::System, &component_type)
            .await?
            .ok_or_else(|| unknown_component_type(&component_type))?;
        let replaced = load_active(conn, &scope, &component_type).await?;
        let template =
            insert_version(conn, &scope, &component_type, system.milestones.clone(), actor).await?;
        cloned.push(ClonedTemplate { template, replaced });
    }

    Ok(CloneReport {
        cloned,
        skipped: false,
    })
}
