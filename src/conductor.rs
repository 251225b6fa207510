//! Top-level wiring: database, catalog, workers, gateway, and background
//! services assembled from a [`GlobalConfig`].

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::audit::{AuditEntry, AuditEventType, AuditLogger, AuditObserver, JsonlAuditWriter};
use crate::catalog::{ActivityCatalog, StaticCatalog};
use crate::config::GlobalConfig;
use crate::models::session::SessionRecord;
use crate::orchestrator::broadcaster::StateBroadcaster;
use crate::orchestrator::gateway::ActionGateway;
use crate::orchestrator::observer::{SessionObserver, TracingObserver};
use crate::orchestrator::process_manager::{ProcessInfo, ProcessManager, TaskProcessManager};
use crate::orchestrator::supervisor::SessionSupervisor;
use crate::orchestrator::worker::WorkerDeps;
use crate::persistence::db::{self, Database};
use crate::persistence::retention;
use crate::persistence::session_repo::SessionRepo;
use crate::persistence::snapshot_repo::{SnapshotRepo, SnapshotStore};
use crate::Result;

/// A running orchestrator instance.
pub struct Conductor {
    config: Arc<GlobalConfig>,
    db: Arc<Database>,
    store: Arc<dyn SnapshotStore>,
    sessions: SessionRepo,
    process_manager: Arc<TaskProcessManager>,
    supervisor: Arc<SessionSupervisor>,
    gateway: ActionGateway,
    audit: Option<Arc<dyn AuditLogger>>,
    cancel: CancellationToken,
    retention: Option<JoinHandle<()>>,
}

impl Conductor {
    /// Open the configured database, build the static catalog, and wire
    /// everything together.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the database cannot be opened,
    /// `AppError::Catalog` for invalid workshops, or `AppError::Io` if the
    /// audit directory cannot be created.
    pub async fn start(config: GlobalConfig) -> Result<Self> {
        let db = db::connect(&config.db_path()).await?;
        info!(path = %config.db_path().display(), "database connected");
        let catalog = StaticCatalog::from_config(&config)?;
        Self::start_with(config, db, Arc::new(catalog))
    }

    /// Wire a conductor over an existing database and catalog.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if audit logging is enabled and its directory
    /// cannot be created.
    pub fn start_with(
        config: GlobalConfig,
        db: Database,
        catalog: Arc<dyn ActivityCatalog>,
    ) -> Result<Self> {
        let db = Arc::new(db);
        let store: Arc<dyn SnapshotStore> = Arc::new(SnapshotRepo::new(Arc::clone(&db)));
        let sessions = SessionRepo::new(Arc::clone(&db));
        let broadcaster = Arc::new(StateBroadcaster::new(config.broadcast_capacity));

        let mut observers: Vec<Arc<dyn SessionObserver>> = vec![Arc::new(TracingObserver)];
        let audit: Option<Arc<dyn AuditLogger>> = if config.audit.enabled {
            let writer: Arc<dyn AuditLogger> = Arc::new(JsonlAuditWriter::new(config.audit_dir())?);
            observers.push(Arc::new(AuditObserver::new(Arc::clone(&writer))));
            info!(dir = %config.audit_dir().display(), "audit logging enabled");
            Some(writer)
        } else {
            None
        };

        let process_manager = Arc::new(TaskProcessManager::new(WorkerDeps {
            store: Arc::clone(&store),
            broadcaster: Arc::clone(&broadcaster),
            observers: observers.into(),
            mailbox_capacity: config.mailbox_capacity,
            idle_timeout: config.worker_idle_timeout(),
        }));

        let supervisor = Arc::new(SessionSupervisor::new(
            catalog,
            Arc::clone(&process_manager) as Arc<dyn ProcessManager>,
            sessions.clone(),
            Arc::clone(&broadcaster),
            config.worker.clone(),
        ));
        let gateway = ActionGateway::new(Arc::clone(&supervisor), Arc::clone(&store), broadcaster);

        Ok(Self {
            config: Arc::new(config),
            db,
            store,
            sessions,
            process_manager,
            supervisor,
            gateway,
            audit,
            cancel: CancellationToken::new(),
            retention: None,
        })
    }

    /// Action gateway for participant requests.
    #[must_use]
    pub fn gateway(&self) -> &ActionGateway {
        &self.gateway
    }

    /// Supervisor owning the worker table.
    #[must_use]
    pub fn supervisor(&self) -> &Arc<SessionSupervisor> {
        &self.supervisor
    }

    /// Configuration this instance was started with.
    #[must_use]
    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    /// Snapshot store shared by all workers.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    /// Every session hosted at least once, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn sessions(&self) -> Result<Vec<SessionRecord>> {
        self.sessions.list().await
    }

    /// Worker processes known to the process manager.
    pub async fn processes(&self) -> Vec<ProcessInfo> {
        self.process_manager.list().await
    }

    /// Spawn the hourly retention purge if it is not already running.
    pub fn start_retention(&mut self) {
        if self.retention.is_none() {
            self.retention = Some(retention::spawn_retention_task(
                Arc::clone(&self.db),
                self.config.retention_days,
                self.cancel.clone(),
            ));
            info!(retention_days = self.config.retention_days, "retention service started");
        }
    }

    /// Restart workers for every live session that has a stored snapshot.
    /// Returns the number of workers started.
    ///
    /// A session that fails to resume is logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the session registry cannot be read.
    pub async fn recover(&self) -> Result<usize> {
        self.recover_sessions()
            .instrument(info_span!("startup_recovery"))
            .await
    }

    async fn recover_sessions(&self) -> Result<usize> {
        let mut resumed = 0;
        for record in self.sessions.list().await? {
            if record.is_deleted() {
                continue;
            }
            match self.store.get(&record.session_id).await {
                Ok(Some(_)) => {}
                Ok(None) => continue,
                Err(err) => {
                    warn!(session_id = %record.session_id, %err, "snapshot lookup failed");
                    continue;
                }
            }
            match self.supervisor.find_or_start(&record.session_id).await {
                Ok((_, true)) => resumed += 1,
                Ok((_, false)) => {}
                Err(err) => warn!(session_id = %record.session_id, %err, "failed to resume session"),
            }
        }
        info!(resumed, "startup recovery complete");
        Ok(resumed)
    }

    /// Delete a session: stop its worker, mark it deleted, and close its
    /// broadcast channel. Returns `false` if no live record existed.
    ///
    /// # Errors
    ///
    /// Returns the process manager or registry error.
    pub async fn delete_session(&self, session_id: &str) -> Result<bool> {
        let existed = self.supervisor.delete(session_id).await?;
        if existed {
            self.audit(
                AuditEntry::new(AuditEventType::SessionDeleted).with_session(session_id.into()),
            );
        }
        Ok(existed)
    }

    /// Run the retention purge once, returning the number of sessions
    /// removed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the purge fails.
    pub async fn purge(&self) -> Result<u64> {
        let removed = retention::purge(&self.db, self.config.retention_days).await?;
        if removed > 0 {
            self.audit(
                AuditEntry::new(AuditEventType::SessionsPurged)
                    .with_result(format!("{removed} session(s) removed")),
            );
        }
        Ok(removed)
    }

    /// Stop background tasks and every worker.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.supervisor.shutdown().await;
        if let Some(handle) = self.retention {
            if let Err(err) = handle.await {
                warn!(%err, "retention task ended abnormally");
            }
        }
        self.db.close().await;
        info!("conductor shut down");
    }

    fn audit(&self, entry: AuditEntry) {
        if let Some(logger) = &self.audit {
            if let Err(err) = logger.log_entry(entry) {
                warn!(%err, "failed to write audit entry");
            }
        }
    }
}
