use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::error::Result;

/// Create the collection tables if absent. Idempotent — safe on every
/// startup.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    // Tickets collection
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tickets (
            id TEXT PRIMARY KEY,
            ticket_id TEXT NOT NULL UNIQUE,
            machine_model TEXT NOT NULL,
            serial_number TEXT NOT NULL,
            issue_description TEXT NOT NULL,
            affected_components TEXT NOT NULL DEFAULT '[]',
            customer TEXT NOT NULL,
            reported_date TEXT NOT NULL,
            priority TEXT NOT NULL,
            status TEXT NOT NULL,
            resolution_solution TEXT NOT NULL DEFAULT '',
            root_cause TEXT NOT NULL DEFAULT '',
            resolution_date TEXT,
            technician TEXT NOT NULL DEFAULT '',
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Team-knowledge collection
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS team_knowledge (
            id TEXT PRIMARY KEY,
            employee_id TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            role TEXT NOT NULL,
            skills TEXT NOT NULL DEFAULT '[]',
            certifications TEXT NOT NULL DEFAULT '[]',
            resolved_issues TEXT NOT NULL DEFAULT '[]',
            experience_years INTEGER NOT NULL,
            region TEXT NOT NULL,
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Feedback on AI suggestions
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS feedback (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ticket_id TEXT NOT NULL,
            feedback_score INTEGER NOT NULL,
            feedback_text TEXT,
            suggested_improvements TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_feedback_ticket_id ON feedback(ticket_id)")
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    ensure_schema(&pool).await?;
    pool.close().await;
    Ok(())
}
