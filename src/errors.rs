//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
///
/// Rejected actions (failed guards, stale activity ids) are not errors and
/// never appear here; they resolve to an unchanged snapshot.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Activity catalog lookup or plan validation failure.
    Catalog(String),
    /// Persistence failure when interacting with `SQLite`.
    Db(String),
    /// The process manager hosting session workers failed or is unreachable.
    ProcessManager(String),
    /// A session worker stopped before it processed the request.
    WorkerStopped(String),
    /// The session id resolves to neither a running worker nor a snapshot.
    UnresolvableSession(String),
    /// Snapshot encoding or decoding failure.
    Serialization(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl AppError {
    /// Whether this error stems from shared infrastructure (store, process
    /// manager, worker mailbox) rather than from the caller's request.
    #[must_use]
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Self::Db(_) | Self::ProcessManager(_) | Self::WorkerStopped(_) | Self::Io(_)
        )
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Catalog(msg) => write!(f, "catalog: {msg}"),
            Self::Db(msg) => write!(f, "db: {msg}"),
            Self::ProcessManager(msg) => write!(f, "process manager: {msg}"),
            Self::WorkerStopped(msg) => write!(f, "worker stopped: {msg}"),
            Self::UnresolvableSession(msg) => write!(f, "unresolvable session: {msg}"),
            Self::Serialization(msg) => write!(f, "serialization: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
