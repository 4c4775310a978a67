//! Database initialization
//!
//! Creates the database file on first run and brings the schema up to date.
//! Safe to call on every startup: every statement is idempotent.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Default SQLite busy timeout
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    init_database_with_timeout(db_path, DEFAULT_BUSY_TIMEOUT_MS).await
}

/// Initialize database with an explicit busy timeout
pub async fn init_database_with_timeout(
    db_path: &Path,
    busy_timeout_ms: u64,
) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Pragmas go on the connect options so every pooled connection gets them.
    // WAL allows readers to proceed while a recalculation pass holds the writer.
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_millis(busy_timeout_ms));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;
    crate::db::migrations::run_migrations(&pool).await?;

    info!("Database busy timeout set to {} ms", busy_timeout_ms);

    Ok(pool)
}

/// Begin a transaction that holds the write lock from its first statement
///
/// Every read-then-write path starts here. A deferred transaction cannot
/// upgrade to a writer once another connection has committed after its first
/// read; SQLite returns SQLITE_BUSY without consulting the busy timeout.
pub async fn begin_write(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>> {
    Ok(pool.begin_with("BEGIN IMMEDIATE").await?)
}

/// Create all tables, indexes and triggers
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_template_tables(pool).await?;
    create_components_table(pool).await?;
    create_template_changes_table(pool).await?;
    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Template headers and milestone rows
///
/// `scope` is either 'system' or a project UUID. The partial unique index
/// guarantees at most one active version per (scope, component_type).
async fn create_template_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS template_versions (
            scope TEXT NOT NULL,
            component_type TEXT NOT NULL,
            version INTEGER NOT NULL CHECK (version > 0),
            is_active INTEGER NOT NULL DEFAULT 0,
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (scope, component_type, version)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_template_versions_active
        ON template_versions(scope, component_type)
        WHERE is_active = 1
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS template_milestones (
            scope TEXT NOT NULL,
            component_type TEXT NOT NULL,
            version INTEGER NOT NULL,
            position INTEGER NOT NULL,
            milestone_name TEXT NOT NULL,
            weight INTEGER NOT NULL CHECK (weight >= 0 AND weight <= 100),
            is_partial INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (scope, component_type, version, milestone_name),
            FOREIGN KEY (scope, component_type, version)
                REFERENCES template_versions(scope, component_type, version)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_components_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS components (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            component_type TEXT NOT NULL,
            milestone_state TEXT NOT NULL DEFAULT '{}',
            percent_complete INTEGER NOT NULL DEFAULT 0
                CHECK (percent_complete >= 0 AND percent_complete <= 100),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Recalculation pages through (project, type) in id order
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_components_project_type
        ON components(project_id, component_type, id)
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Append-only audit log of template changes
///
/// Triggers reject UPDATE and DELETE so the log stays immutable even for
/// writers that bypass the engine.
async fn create_template_changes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS template_changes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id TEXT NOT NULL,
            component_type TEXT NOT NULL,
            actor TEXT NOT NULL,
            old_weights TEXT NOT NULL,
            new_weights TEXT NOT NULL,
            applied_to_existing INTEGER NOT NULL,
            affected_component_count INTEGER NOT NULL CHECK (affected_component_count >= 0),
            new_version INTEGER NOT NULL DEFAULT 0,
            changed_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_template_changes_key
        ON template_changes(project_id, component_type, changed_at)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS template_changes_no_update
        BEFORE UPDATE ON template_changes
        BEGIN
            SELECT RAISE(ABORT, 'template_changes is append-only');
        END
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS template_changes_no_delete
        BEFORE DELETE ON template_changes
        BEGIN
            SELECT RAISE(ABORT, 'template_changes is append-only');
        END
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
