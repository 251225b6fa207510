#![forbid(unsafe_code)]

//! Real-time orchestration of collaborative workshop sessions.
//!
//! Each session runs a state machine inside its own worker; participants
//! act through the [`orchestrator::gateway::ActionGateway`] and observe
//! accepted snapshots through a per-session broadcast.

pub mod audit;
pub mod catalog;
pub mod conductor;
pub mod config;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod persistence;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
