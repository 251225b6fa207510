//! Session registry repository for `SQLite` persistence.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::catalog::SessionBlueprint;
use crate::models::session::SessionRecord;
use crate::{AppError, Result};

use super::db::Database;

/// Repository wrapper around `SQLite` for session records.
#[derive(Clone)]
pub struct SessionRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct SessionRow {
    session_id: String,
    workshop_id: String,
    required_active_profile_count: i64,
    created_at: String,
    deleted_at: Option<String>,
}

impl SessionRow {
    fn into_record(self) -> Result<SessionRecord> {
        let required_active_profile_count = u32::try_from(self.required_active_profile_count)
            .map_err(|e| AppError::Db(format!("invalid quorum: {e}")))?;
        let created_at = parse_timestamp(&self.created_at, "created_at")?;
        let deleted_at = self
            .deleted_at
            .as_deref()
            .map(|raw| parse_timestamp(raw, "deleted_at"))
            .transpose()?;

        Ok(SessionRecord {
            session_id: self.session_id,
            workshop_id: self.workshop_id,
            required_active_profile_count,
            created_at,
            deleted_at,
        })
    }
}

fn parse_timestamp(raw: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| AppError::Db(format!("invalid {field}: {e}")))
}

impl SessionRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Record that a worker was started for the blueprint's session.
    ///
    /// Keeps the original record, including any deletion mark, when one
    /// already exists.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the upsert fails.
    pub async fn record_started(&self, blueprint: &SessionBlueprint) -> Result<()> {
        let created_at = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO session_record (session_id, workshop_id,
             required_active_profile_count, created_at, deleted_at)
             VALUES (?1, ?2, ?3, ?4, NULL)
             ON CONFLICT(session_id) DO NOTHING",
        )
        .bind(&blueprint.session_id)
        .bind(&blueprint.workshop_id)
        .bind(i64::from(blueprint.required_active_profile_count))
        .bind(&created_at)
        .execute(self.db.as_ref())
        .await?;

        Ok(())
    }

    /// Retrieve a session record.
    ///
    /// Returns `Ok(None)` if the session was never hosted.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_by_id(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let row: Option<SessionRow> =
            sqlx::query_as("SELECT * FROM session_record WHERE session_id = ?1")
                .bind(session_id)
                .fetch_optional(self.db.as_ref())
                .await?;

        row.map(SessionRow::into_record).transpose()
    }

    /// List all session records, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list(&self) -> Result<Vec<SessionRecord>> {
        let rows: Vec<SessionRow> =
            sqlx::query_as("SELECT * FROM session_record ORDER BY created_at ASC")
                .fetch_all(self.db.as_ref())
                .await?;

        rows.into_iter().map(SessionRow::into_record).collect()
    }

    /// Mark a session deleted. Returns `false` if no live record exists.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn mark_deleted(&self, session_id: &str) -> Result<bool> {
        let deleted_at = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE session_record SET deleted_at = ?1
             WHERE session_id = ?2 AND deleted_at IS NULL",
        )
        .bind(&deleted_at)
        .bind(session_id)
        .execute(self.db.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
