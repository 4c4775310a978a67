//! Progress engine orchestration
//!
//! [`ProgressEngine`] composes the template store, recalculation, audit log,
//! keyed writer locks and event bus into the operations exposed to the
//! administration UI and the milestone update source.
//!
//! Every template mutation for one (project, component type) runs under that
//! key's writer lock and inside a single SQLite transaction: the swap, the
//! optional recalculation and the audit record commit together or not at all.
//! Events are emitted only after commit.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{self, AuditLog, TemplateChange, TemplateChangeRecord};
use crate::auth::Actor;
use crate::config::EngineSettings;
use crate::db;
use crate::events::{EngineEvent, EventBus};
use crate::locks::{KeyedLocks, TemplateKey};
use crate::progress::components;
use crate::progress::{Component, ComponentStore, MilestoneState, NewComponent, ProgressUpdate};
use crate::recalc::{recalculate_in, RecalcOutcome, RecalculationEngine};
use crate::templates::seed::seed_system_templates;
use crate::templates::store::{self, CloneReport};
use crate::templates::{
    apply_weights, validate, Template, TemplateState, TemplateStore, WeightEntry,
};
use crate::time;
use crate::{Error, Result};

/// A weight edit submitted by the administration UI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateTemplateRequest {
    pub project_id: Uuid,
    pub component_type: String,
    /// One entry per milestone of the current template, in any order
    pub new_weights: Vec<WeightEntry>,
    /// Recompute existing components before returning
    #[serde(default)]
    pub apply_to_existing: bool,
    /// Project version the editor was showing; `None` for the system default
    #[serde(default)]
    pub expected_version: Option<i64>,
}

/// Result of a committed template update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateResult {
    pub project_id: Uuid,
    pub component_type: String,
    /// Project version replaced, `None` when the project used the system default
    pub previous_version: Option<i64>,
    pub new_version: i64,
    /// Components recomputed; 0 when not applied to existing
    pub affected_count: usize,
    pub change: TemplateChangeRecord,
}

/// Affected-component count shown before an update is committed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AffectedPreview {
    pub project_id: Uuid,
    pub component_type: String,
    pub affected_count: i64,
    pub template_state: TemplateState,
}

/// Engine facade shared by the service's handlers
#[derive(Clone)]
pub struct ProgressEngine {
    pool: SqlitePool,
    templates: TemplateStore,
    components: ComponentStore,
    audit: AuditLog,
    recalc: RecalculationEngine,
    locks: Arc<KeyedLocks>,
    events: EventBus,
}

impl ProgressEngine {
    pub fn new(pool: SqlitePool, settings: &EngineSettings) -> Self {
        Self {
            templates: TemplateStore::new(pool.clone()),
            components: ComponentStore::new(pool.clone(), settings.max_lock_wait_ms),
            audit: AuditLog::new(pool.clone()),
            recalc: RecalculationEngine::new(pool.clone(), settings.recalc_chunk_size),
            locks: Arc::new(KeyedLocks::new()),
            events: EventBus::new(settings.event_capacity),
            pool,
        }
    }

    /// Open (creating if needed) the database at `db_path`, seed system
    /// templates and build an engine over it
    pub async fn open(db_path: &Path, settings: &EngineSettings) -> Result<Self> {
        settings.validate()?;
        let pool = db::init_database_with_timeout(db_path, settings.busy_timeout_ms).await?;
        seed_system_templates(&pool).await?;
        Ok(Self::new(pool, settings))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    pub async fn get_effective_template(
        &self,
        project_id: Uuid,
        component_type: &str,
    ) -> Result<Template> {
        self.templates.get_effective_template(project_id, component_type).await
    }

    pub async fn template_state(
        &self,
        project_id: Uuid,
        component_type: &str,
    ) -> Result<TemplateState> {
        self.templates.template_state(project_id, component_type).await
    }

    /// How many components an `apply_to_existing` update would recompute
    pub async fn preview_affected_count(
        &self,
        project_id: Uuid,
        component_type: &str,
    ) -> Result<AffectedPreview> {
        let mut conn = self.pool.acquire().await?;
        let template_state = store::template_state(&mut conn, project_id, component_type).await?;
        let affected_count =
            components::count_for_template(&mut conn, project_id, component_type).await?;

        Ok(AffectedPreview {
            project_id,
            component_type: component_type.to_string(),
            affected_count,
            template_state,
        })
    }

    /// Replace a project's template weights
    pub async fn update_template(
        &self,
        actor: &Actor,
        request: UpdateTemplateRequest,
    ) -> Result<UpdateResult> {
        self.update_template_cancellable(actor, request, &CancellationToken::new())
            .await
    }

    /// [`update_template`](Self::update_template) with a cancellable recalculation
    ///
    /// Cancelling rolls back the template swap along with the recalculation.
    pub async fn update_template_cancellable(
        &self,
        actor: &Actor,
        request: UpdateTemplateRequest,
        cancel: &CancellationToken,
    ) -> Result<UpdateResult> {
        actor.ensure_may_manage_templates()?;

        let UpdateTemplateRequest {
            project_id,
            component_type,
            new_weights,
            apply_to_existing,
            expected_version,
        } = request;

        if let Err(violation) = validate(&new_weights) {
            warn!(
                project_id = %project_id,
                component_type = %component_type,
                actor = %actor.id,
                %violation,
                "Template update rejected"
            );
            return Err(violation.into());
        }

        let key = TemplateKey::new(project_id, &component_type);
        let _guard = self.locks.try_acquire(&key).inspect_err(|e| {
            warn!(key = %key, actor = %actor.id, "{}", e);
        })?;

        let mut tx = db::begin_write(&self.pool).await?;

        let current = store::resolve_effective(&mut tx, project_id, &component_type).await?;
        let milestones = apply_weights(&current.milestones, &new_weights).map_err(|violation| {
            warn!(
                project_id = %project_id,
                component_type = %component_type,
                %violation,
                "Template update rejected"
            );
            Error::from(violation)
        })?;

        let previous_version = current.project_version();
        let template = store::swap_project_template(
            &mut tx,
            project_id,
            &component_type,
            expected_version,
            milestones,
            &actor.id,
        )
        .await
        .inspect_err(|e| {
            if matches!(e, Error::ConcurrencyConflict(_)) {
                warn!(key = %key, actor = %actor.id, "{}", e);
            }
        })?;

        let started = Instant::now();
        let affected_count = if apply_to_existing {
            match recalculate_in(&mut tx, project_id, &template, self.recalc.chunk_size(), cancel)
                .await
            {
                Ok(outcome) => outcome.affected_count,
                Err(e) => {
                    self.emit_recalc_failed(project_id, &component_type, &e);
                    return Err(e);
                }
            }
        } else {
            0
        };

        let change = audit::record_change(
            &mut tx,
            &TemplateChange {
                project_id,
                component_type: component_type.clone(),
                actor: actor.id.clone(),
                old_weights: current.weights(),
                new_weights: template.weights(),
                applied_to_existing: apply_to_existing,
                affected_component_count: affected_count as i64,
                new_version: template.version,
            },
        )
        .await?;

        tx.commit().await.map_err(|e| Error::TransactionFailure {
            processed: affected_count,
            reason: format!("commit failed: {}", e),
        })?;

        info!(
            project_id = %project_id,
            component_type = %component_type,
            actor = %actor.id,
            previous_version = ?previous_version,
            new_version = template.version,
            applied_to_existing = apply_to_existing,
            affected_count,
            "Template updated"
        );

        let now = time::now();
        self.events.emit_lossy(EngineEvent::TemplateUpdated {
            project_id,
            component_type: component_type.clone(),
            version: template.version,
            actor: actor.id.clone(),
            applied_to_existing: apply_to_existing,
            affected_count,
            timestamp: now,
        });
        if apply_to_existing {
            self.events.emit_lossy(EngineEvent::RecalculationCompleted {
                project_id,
                component_type: component_type.clone(),
                template_version: template.version,
                affected_count,
                duration_ms: started.elapsed().as_millis() as u64,
                timestamp: now,
            });
        }

        Ok(UpdateResult {
            project_id,
            component_type,
            previous_version,
            new_version: template.version,
            affected_count,
            change,
        })
    }

    /// Copy system templates into a project
    ///
    /// A forced re-clone replaces every existing project template, recomputes
    /// the components that used it and audits each replacement. First-time
    /// clones produce weights identical to what the project already used and
    /// are not audited.
    pub async fn clone_system_templates(
        &self,
        actor: &Actor,
        project_id: Uuid,
        force: bool,
    ) -> Result<CloneReport> {
        actor.ensure_may_manage_templates()?;

        let keys: Vec<TemplateKey> = self
            .templates
            .component_types()
            .await?
            .iter()
            .map(|ct| TemplateKey::new(project_id, ct))
            .collect();
        let _guards = self.locks.try_acquire_all(&keys)?;

        let mut tx = db::begin_write(&self.pool).await?;
        let report = store::clone_system_templates(&mut tx, project_id, force, &actor.id).await?;

        let cancel = CancellationToken::new();
        for cloned in &report.cloned {
            let Some(replaced) = &cloned.replaced else {
                continue;
            };
            let outcome = recalculate_in(
                &mut tx,
                project_id,
                &cloned.template,
                self.recalc.chunk_size(),
                &cancel,
            )
            .await?;

            audit::record_change(
                &mut tx,
                &TemplateChange {
                    project_id,
                    component_type: cloned.template.component_type.clone(),
                    actor: actor.id.clone(),
                    old_weights: replaced.weights(),
                    new_weights: cloned.template.weights(),
                    applied_to_existing: true,
                    affected_component_count: outcome.affected_count as i64,
                    new_version: cloned.template.version,
                },
            )
            .await?;
        }

        tx.commit().await?;

        if report.skipped {
            info!(project_id = %project_id, "Project already has templates, clone skipped");
            return Ok(report);
        }

        let component_types: Vec<String> = report
            .cloned
            .iter()
            .map(|c| c.template.component_type.clone())
            .collect();
        info!(
            project_id = %project_id,
            actor = %actor.id,
            forced = force,
            count = component_types.len(),
            "System templates cloned"
        );
        self.events.emit_lossy(EngineEvent::TemplatesCloned {
            project_id,
            component_types,
            forced: force,
            actor: actor.id.clone(),
            timestamp: time::now(),
        });

        Ok(report)
    }

    /// Recompute cached progress for one (project, type) on demand
    pub async fn recalculate(
        &self,
        actor: &Actor,
        project_id: Uuid,
        component_type: &str,
        cancel: &CancellationToken,
    ) -> Result<RecalcOutcome> {
        actor.ensure_may_manage_templates()?;
        let _guard = self.locks.try_acquire(&TemplateKey::new(project_id, component_type))?;

        let started = Instant::now();
        match self.recalc.recalculate_for_template(project_id, component_type, cancel).await {
            Ok(outcome) => {
                self.events.emit_lossy(EngineEvent::RecalculationCompleted {
                    project_id,
                    component_type: component_type.to_string(),
                    template_version: outcome.template_version,
                    affected_count: outcome.affected_count,
                    duration_ms: started.elapsed().as_millis() as u64,
                    timestamp: time::now(),
                });
                Ok(outcome)
            }
            Err(e) => {
                self.emit_recalc_failed(project_id, component_type, &e);
                Err(e)
            }
        }
    }

    pub async fn register_component(&self, new: NewComponent) -> Result<Component> {
        self.components.insert(new).await
    }

    pub async fn get_component(&self, component_id: Uuid) -> Result<Component> {
        self.components.get(component_id).await
    }

    pub async fn list_components(
        &self,
        project_id: Uuid,
        component_type: &str,
    ) -> Result<Vec<Component>> {
        self.components
            .list_for_template(project_id, component_type)
            .await
    }

    /// Record a milestone change from the update source
    pub async fn apply_milestone_update(
        &self,
        component_id: Uuid,
        update: &MilestoneState,
    ) -> Result<ProgressUpdate> {
        let result = self.components.apply_milestone_update(component_id, update).await?;

        if result.previous_percent != result.percent_complete {
            self.events.emit_lossy(EngineEvent::ComponentProgressChanged {
                component_id,
                project_id: result.project_id,
                component_type: result.component_type.clone(),
                previous_percent: result.previous_percent,
                percent_complete: result.percent_complete,
                timestamp: time::now(),
            });
        }
        Ok(result)
    }

    pub async fn change_history(
        &self,
        project_id: Uuid,
        component_type: &str,
    ) -> Result<Vec<TemplateChangeRecord>> {
        self.audit.history(project_id, component_type).await
    }

    pub async fn project_change_history(
        &self,
        project_id: Uuid,
    ) -> Result<Vec<TemplateChangeRecord>> {
        self.audit.project_history(project_id).await
    }

    pub async fn latest_change(
        &self,
        project_id: Uuid,
        component_type: &str,
    ) -> Result<Option<TemplateChangeRecord>> {
        self.audit.latest(project_id, component_type).await
    }

    fn emit_recalc_failed(&self, project_id: Uuid, component_type: &str, error: &Error) {
        self.events.emit_lossy(EngineEvent::RecalculationFailed {
            project_id,
            component_type: component_type.to_string(),
            reason: error.to_string(),
            timestamp: time::now(),
        });
    }
}
