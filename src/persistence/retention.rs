//! Retention service for time-based data purge.
//!
//! Removes the snapshot first, then the session record, for every session
//! deleted longer than `retention_days` ago.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::db::Database;
use crate::Result;

const PURGE_INTERVAL: Duration = Duration::from_secs(3600);

/// Spawn the retention purge background task.
///
/// The task runs hourly, first tick immediately, until `cancel` fires.
#[must_use]
pub fn spawn_retention_task(
    db: Arc<Database>,
    retention_days: u32,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("retention task shutting down");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(err) = purge(&db, retention_days).await {
                        error!(%err, "retention purge failed");
                    }
                }
            }
        }
    })
}

/// Purge sessions deleted more than `retention_days` ago, returning the
/// number of session records removed.
///
/// # Errors
///
/// Returns `AppError::Db` if any delete statement fails.
pub async fn purge(db: &Database, retention_days: u32) -> Result<u64> {
    let cutoff = Utc::now() - chrono::Duration::days(i64::from(retention_days));
    let cutoff_str = cutoff.to_rfc3339();

    let mut tx = db.begin().await?;

    sqlx::query(
        "DELETE FROM session_snapshot WHERE session_id IN \
         (SELECT session_id FROM session_record \
          WHERE deleted_at IS NOT NULL AND deleted_at < ?1)",
    )
    .bind(&cutoff_str)
    .execute(&mut *tx)
    .await?;

    let removed = sqlx::query(
        "DELETE FROM session_record WHERE deleted_at IS NOT NULL AND deleted_at < ?1",
    )
    .bind(&cutoff_str)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    tx.commit().await?;

    info!(retention_days, removed, "retention purge completed");
    Ok(removed)
}
