//! crates/attendance_core/src/session_manager.rs
//!
//! The single source of truth for which session is active and which token
//! currently unlocks it. The manager is passive: it never rotates on its own,
//! callers (the dashboard) drive the cadence.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{NewSession, Session};
use crate::error::{AttendanceError, AttendanceResult};
use crate::ports::{PortError, SessionStore, UniqueConstraint};
use crate::token::{generate_distinct, generate_token, MAX_TOKEN_ATTEMPTS};

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Starts a class for `owner`, ending the owner's previous active session
    /// in the same atomic step.
    pub async fn start_session(&self, owner: &str) -> AttendanceResult<Session> {
        let owner = owner.trim();
        if owner.is_empty() {
            return Err(AttendanceError::InvalidSubmission(
                "owner must not be empty".to_string(),
            ));
        }

        for attempt in 1..=MAX_TOKEN_ATTEMPTS {
            let new = NewSession {
                id: Uuid::new_v4(),
                owner: owner.to_string(),
                token: generate_token(),
                created_at: Utc::now(),
            };
            match self.store.activate_session(new).await {
                Ok(session) => {
                    info!("Session {} started for {}", session.id, session.owner);
                    return Ok(session);
                }
                // A token collision or a concurrent start for the same owner:
                // another attempt deactivates the winner and uses a fresh token.
                Err(PortError::UniqueViolation(
                    constraint @ (UniqueConstraint::ActiveToken | UniqueConstraint::ActiveOwner),
                )) => {
                    warn!(
                        "Starting session for {} hit {:?} (attempt {}/{})",
                        owner, constraint, attempt, MAX_TOKEN_ATTEMPTS
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AttendanceError::StorageFailure(format!(
            "could not start a session for {} after {} attempts",
            owner, MAX_TOKEN_ATTEMPTS
        )))
    }

    /// Ends a session. Ending an already ended session is a no-op.
    pub async fn end_session(&self, session_id: Uuid) -> AttendanceResult<Session> {
        let session = self
            .store
            .deactivate_session(session_id)
            .await?
            .ok_or(AttendanceError::NotFound(session_id))?;
        info!("Session {} ended", session_id);
        Ok(session)
    }

    /// Replaces the session's token with a new one and returns it. The old token
    /// stops validating as soon as this returns.
    pub async fn rotate_token(&self, session_id: Uuid) -> AttendanceResult<String> {
        let current = self.session(session_id).await?;
        if !current.is_active {
            return Err(AttendanceError::InvalidState(session_id));
        }

        for attempt in 1..=MAX_TOKEN_ATTEMPTS {
            let token = generate_distinct(&current.token);
            match self.store.replace_token(session_id, &token).await {
                Ok(Some(session)) => {
                    info!("Token rotated for session {}", session_id);
                    return Ok(session.token);
                }
                // Ended (or removed) between the read above and the update.
                Ok(None) => {
                    return match self.store.find_session(session_id).await? {
                        Some(_) => Err(AttendanceError::InvalidState(session_id)),
                        None => Err(AttendanceError::NotFound(session_id)),
                    };
                }
                Err(PortError::UniqueViolation(UniqueConstraint::ActiveToken)) => {
                    warn!(
                        "Token collision rotating session {} (attempt {}/{})",
                        session_id, attempt, MAX_TOKEN_ATTEMPTS
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AttendanceError::StorageFailure(format!(
            "could not rotate the token of session {} after {} attempts",
            session_id, MAX_TOKEN_ATTEMPTS
        )))
    }

    pub async fn session(&self, session_id: Uuid) -> AttendanceResult<Session> {
        self.store
            .find_session(session_id)
            .await?
            .ok_or(AttendanceError::NotFound(session_id))
    }

    pub async fn active_session(&self, owner: &str) -> AttendanceResult<Option<Session>> {
        Ok(self.store.find_active_session(owner.trim()).await?)
    }

    /// The active session `token` currently unlocks, if any. A point-in-time read.
    pub async fn session_for_token(&self, token: &str) -> AttendanceResult<Option<Session>> {
        Ok(self.store.find_active_by_token(token).await?)
    }
}
