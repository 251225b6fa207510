//! `SQLite` schema bootstrap logic.
//!
//! All table definitions use `CREATE TABLE IF NOT EXISTS` so they can be
//! re-run on every startup.

use sqlx::SqlitePool;

use crate::Result;

/// Apply all table definitions to the connected `SQLite` database.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS session_snapshot (
    session_id      TEXT PRIMARY KEY NOT NULL,
    state           TEXT NOT NULL,
    version         INTEGER NOT NULL,
    context         TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS session_record (
    session_id      TEXT PRIMARY KEY NOT NULL,
    workshop_id     TEXT NOT NULL,
    required_active_profile_count INTEGER NOT NULL CHECK(required_active_profile_count >= 1),
    created_at      TEXT NOT NULL,
    deleted_at      TEXT
);

CREATE INDEX IF NOT EXISTS idx_session_record_deleted ON session_record(deleted_at);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
