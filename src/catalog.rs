//! Read-only activity catalog.
//!
//! The catalog is the boundary to whatever owns workshops and sessions
//! (normally a relational store). The orchestrator only needs one query:
//! which workshop plan and quorum does a session id play?

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::config::GlobalConfig;
use crate::models::activity::{ActivityPlan, PlannedActivity};
use crate::{AppError, Result};

/// Everything a worker needs to host a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionBlueprint {
    /// Session identifier.
    pub session_id: String,
    /// Workshop the plan came from.
    pub workshop_id: String,
    /// Quorum for start and phase advance.
    pub required_active_profile_count: u32,
    /// Ordered activity plan.
    pub plan: Arc<ActivityPlan>,
}

/// Resolves session ids to blueprints.
pub trait ActivityCatalog: Send + Sync {
    /// Look up the blueprint for `session_id`; `Ok(None)` if unknown.
    ///
    /// # Errors
    ///
    /// Returns an infrastructure error if the backing store fails.
    fn blueprint(
        &self,
        session_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<SessionBlueprint>>> + Send + '_>>;
}

#[derive(Debug, Clone)]
struct Workshop {
    required_active_profile_count: u32,
    plan: Arc<ActivityPlan>,
}

/// In-memory catalog, populated from configuration or by hand.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    workshops: HashMap<String, Workshop>,
    sessions: HashMap<String, String>,
}

impl StaticCatalog {
    /// Empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from the `[[workshops]]` and `[[sessions]]` tables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Catalog` if a workshop plan is invalid.
    pub fn from_config(config: &GlobalConfig) -> Result<Self> {
        let mut catalog = Self::new();
        for workshop in &config.workshops {
            catalog.insert_workshop(
                &workshop.id,
                workshop.required_active_profile_count,
                workshop.plan()?,
            )?;
        }
        for session in &config.sessions {
            catalog.bind_session(&session.id, &session.workshop_id)?;
        }
        Ok(catalog)
    }

    /// Builder-style [`insert_workshop`](Self::insert_workshop).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Catalog` if the plan or quorum is invalid.
    pub fn with_workshop(
        mut self,
        workshop_id: &str,
        required_active_profile_count: u32,
        activities: Vec<PlannedActivity>,
    ) -> Result<Self> {
        let plan = ActivityPlan::new(activities)?;
        self.insert_workshop(workshop_id, required_active_profile_count, plan)?;
        Ok(self)
    }

    /// Builder-style [`bind_session`](Self::bind_session).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Catalog` if the workshop is unknown.
    pub fn with_session(mut self, session_id: &str, workshop_id: &str) -> Result<Self> {
        self.bind_session(session_id, workshop_id)?;
        Ok(self)
    }

    /// Register or replace a workshop.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Catalog` if the quorum is zero.
    pub fn insert_workshop(
        &mut self,
        workshop_id: &str,
        required_active_profile_count: u32,
        plan: ActivityPlan,
    ) -> Result<()> {
        if required_active_profile_count == 0 {
            return Err(AppError::Catalog(format!(
                "workshop '{workshop_id}' quorum must be at least 1"
            )));
        }
        self.workshops.insert(
            workshop_id.to_owned(),
            Workshop {
                required_active_profile_count,
                plan: Arc::new(plan),
            },
        );
        Ok(())
    }

    /// Bind a session id to a known workshop.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Catalog` if the workshop is unknown.
    pub fn bind_session(&mut self, session_id: &str, workshop_id: &str) -> Result<()> {
        if !self.workshops.contains_key(workshop_id) {
            return Err(AppError::Catalog(format!(
                "unknown workshop '{workshop_id}' for session '{session_id}'"
            )));
        }
        self.sessions
            .insert(session_id.to_owned(), workshop_id.to_owned());
        Ok(())
    }

    fn lookup(&self, session_id: &str) -> Option<SessionBlueprint> {
        let workshop_id = self.sessions.get(session_id)?;
        let workshop = self.workshops.get(workshop_id)?;
        Some(SessionBlueprint {
            session_id: session_id.to_owned(),
            workshop_id: workshop_id.clone(),
            required_active_profile_count: workshop.required_active_profile_count,
            plan: Arc::clone(&workshop.plan),
        })
    }
}

impl ActivityCatalog for StaticCatalog {
    fn blueprint(
        &self,
        session_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<SessionBlueprint>>> + Send + '_>> {
        let found = self.lookup(session_id);
        Box::pin(async move { Ok(found) })
    }
}
