//! Durable latest-snapshot store, one row per session.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;

use crate::models::context::SessionContext;
use crate::models::snapshot::Snapshot;
use crate::{AppError, Result};

use super::db::Database;

/// Store of the latest snapshot per session, used for crash recovery and
/// for late subscribers.
///
/// Implementations must be safe to share across sessions.
pub trait SnapshotStore: Send + Sync {
    /// Upsert the snapshot for `session_id`; last write wins.
    ///
    /// # Errors
    ///
    /// Returns an infrastructure error if the store is unreachable.
    fn put<'a>(
        &'a self,
        session_id: &'a str,
        snapshot: &'a Snapshot,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Latest snapshot for `session_id`, if any.
    ///
    /// # Errors
    ///
    /// Returns an infrastructure error if the store is unreachable.
    fn get<'a>(
        &'a self,
        session_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Snapshot>>> + Send + 'a>>;

    /// Drop the snapshot for `session_id`; a missing row is not an error.
    ///
    /// # Errors
    ///
    /// Returns an infrastructure error if the store is unreachable.
    fn delete<'a>(
        &'a self,
        session_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// `SQLite`-backed [`SnapshotStore`].
#[derive(Clone)]
pub struct SnapshotRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct SnapshotRow {
    state: String,
    version: i64,
    context: String,
}

impl SnapshotRow {
    fn into_snapshot(self) -> Result<Snapshot> {
        let context: SessionContext = serde_json::from_str(&self.context)
            .map_err(|e| AppError::Db(format!("invalid snapshot context: {e}")))?;
        let version = u64::try_from(self.version)
            .map_err(|e| AppError::Db(format!("invalid snapshot version: {e}")))?;
        Ok(Snapshot {
            value: self.state,
            version,
            context,
        })
    }
}

impl SnapshotRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    async fn upsert(&self, session_id: &str, snapshot: &Snapshot) -> Result<()> {
        let context = serde_json::to_string(&snapshot.context)
            .map_err(|e| AppError::Db(format!("serialize snapshot context: {e}")))?;
        let version = i64::try_from(snapshot.version)
            .map_err(|e| AppError::Db(format!("snapshot version out of range: {e}")))?;
        let updated_at = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO session_snapshot (session_id, state, version, context, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(session_id) DO UPDATE SET
                state = excluded.state,
                version = excluded.version,
                context = excluded.context,
                updated_at = excluded.updated_at",
        )
        .bind(session_id)
        .bind(&snapshot.value)
        .bind(version)
        .bind(&context)
        .bind(&updated_at)
        .execute(self.db.as_ref())
        .await?;

        Ok(())
    }

    async fn fetch(&self, session_id: &str) -> Result<Option<Snapshot>> {
        let row: Option<SnapshotRow> = sqlx::query_as(
            "SELECT state, version, context FROM session_snapshot WHERE session_id = ?1",
        )
        .bind(session_id)
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(SnapshotRow::into_snapshot).transpose()
    }

    async fn remove(&self, session_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM session_snapshot WHERE session_id = ?1")
            .bind(session_id)
            .execute(self.db.as_ref())
            .await?;
        Ok(())
    }
}

impl SnapshotStore for SnapshotRepo {
    fn put<'a>(
        &'a self,
        session_id: &'a str,
        snapshot: &'a Snapshot,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.upsert(session_id, snapshot))
    }

    fn get<'a>(
        &'a self,
        session_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Snapshot>>> + Send + 'a>> {
        Box::pin(self.fetch(session_id))
    }

    fn delete<'a>(
        &'a self,
        session_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.remove(session_id))
    }
}
