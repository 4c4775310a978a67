//! Batch recalculation of cached progress after a template change
//!
//! A pass recomputes `percent_complete` for every component of one type in
//! one project against a single template snapshot.
//!
//! **Atomicity:** the whole pass runs in one SQLite transaction. Components
//! are read and written in bounded chunks (keyset pagination by id) to keep
//! memory flat, but no chunk is committed on its own. Any failure, including
//! cancellation, drops the transaction and every component keeps its prior
//! value. Retrying is always safe: the pass is idempotent for a given
//! snapshot.
//!
//! **Cancellation:** the token is checked before each chunk. A cancelled pass
//! has committed nothing.

use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::begin_write;
use crate::progress::{calculate_percent, MilestoneState};
use crate::templates::store::resolve_effective;
use crate::templates::Template;
use crate::time;
use crate::{Error, Result};

/// Default components per chunk
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Summary of a completed pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecalcOutcome {
    pub project_id: Uuid,
    pub component_type: String,
    /// Template version the pass was computed with
    pub template_version: i64,
    /// Components recomputed (reported as the affected count)
    pub affected_count: usize,
    /// Components whose cached value actually changed
    pub changed_count: usize,
    pub chunks: usize,
}

/// Runs recalculation passes
#[derive(Clone)]
pub struct RecalculationEngine {
    pool: SqlitePool,
    chunk_size: usize,
}

impl RecalculationEngine {
    pub fn new(pool: SqlitePool, chunk_size: usize) -> Self {
        Self {
            pool,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Recompute every component of (project, type) against the current effective template
    ///
    /// The template is loaded once, inside the pass transaction, and used for
    /// every component.
    pub async fn recalculate_for_template(
        &self,
        project_id: Uuid,
        component_type: &str,
        cancel: &CancellationToken,
    ) -> Result<RecalcOutcome> {
        let started = Instant::now();
        let mut tx = begin_write(&self.pool).await?;

        let template = resolve_effective(&mut tx, project_id, component_type).await?;
        let outcome =
            recalculate_in(&mut tx, project_id, &template, self.chunk_size, cancel).await?;

        tx.commit().await.map_err(|e| Error::TransactionFailure {
            processed: outcome.affected_count,
            reason: format!("commit failed: {}", e),
        })?;

        info!(
            project_id = %project_id,
            component_type,
            template_version = outcome.template_version,
            affected_count = outcome.affected_count,
            changed_count = outcome.changed_count,
            duration_ms = started.elapsed().as_millis() as u64,
            "Recalculation committed"
        );

        Ok(outcome)
    }
}

/// Recalculate inside a caller-owned transaction
///
/// Does not commit. Errors are reported as `TransactionFailure` (or
/// `Cancelled`) and the caller must drop the transaction.
pub async fn recalculate_in(
    conn: &mut SqliteConnection,
    project_id: Uuid,
    template: &Template,
    chunk_size: usize,
    cancel: &CancellationToken,
) -> Result<RecalcOutcome> {
    let mut outcome = RecalcOutcome {
        project_id,
        component_type: template.component_type.clone(),
        template_version: template.version,
        affected_count: 0,
        changed_count: 0,
        chunks: 0,
    };

    match run_pass(conn, project_id, template, chunk_size.max(1), cancel, &mut outcome).await {
        Ok(()) => Ok(outcome),
        Err(Error::Cancelled(reason)) => {
            warn!(
                project_id = %project_id,
                component_type = %template.component_type,
                processed = outcome.affected_count,
                "Recalculation cancelled, rolling back"
            );
            Err(Error::Cancelled(reason))
        }
        Err(e) => {
            warn!(
                project_id = %project_id,
                component_type = %template.component_type,
                processed = outcome.affected_count,
                error = %e,
                "Recalculation failed, rolling back"
            );
            Err(Error::TransactionFailure {
                processed: outcome.affected_count,
                reason: e.to_string(),
            })
        }
    }
}

async fn run_pass(
    conn: &mut SqliteConnection,
    project_id: Uuid,
    template: &Template,
    chunk_size: usize,
    cancel: &CancellationToken,
    outcome: &mut RecalcOutcome,
) -> Result<()> {
    let project_key = project_id.to_string();
    let mut after_id = String::new();

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled(format!(
                "recalculation of '{}' cancelled after {} components",
                template.component_type, outcome.affected_count
            )));
        }

        let chunk = sqlx::query_as::<_, (String, String, i64)>(
            r#"
            SELECT id, milestone_state, percent_complete
            FROM components
            WHERE project_id = ? AND component_type = ? AND id > ?
            ORDER BY id
            LIMIT ?
            "#,
        )
        .bind(&project_key)
        .bind(&template.component_type)
        .bind(&after_id)
        .bind(chunk_size as i64)
        .fetch_all(&mut *conn)
        .await?;

        if chunk.is_empty() {
            return Ok(());
        }

        let updated_at = time::to_storage(&time::now());
        for (id, state_json, previous) in &chunk {
            let state: MilestoneState = serde_json::from_str(state_json).map_err(|e| {
                Error::Internal(format!("component {} has unreadable milestone state: {}", id, e))
            })?;
            let percent = calculate_percent(&state, template) as i64;

            if percent != *previous {
                sqlx::query(
                    "UPDATE components SET percent_complete = ?, updated_at = ? WHERE id = ?",
                )
                .bind(percent)
                .bind(&updated_at)
                .bind(id)
                .execute(&mut *conn)
                .await?;
                outcome.changed_count += 1;
            }
            outcome.affected_count += 1;
        }

        outcome.chunks += 1;
        debug!(
            component_type = %template.component_type,
            chunk = outcome.chunks,
            processed = outcome.affected_count,
            "Recalculation chunk processed"
        );

        if let Some((last_id, _, _)) = chunk.last() {
            after_id = last_id.clone();
        }
        if chunk.len() < chunk_size {
            return Ok(());
        }

        tokio::task::yield_now().await;
    }
}
