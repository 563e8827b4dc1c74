//! Alder Break Glass - emergency elevated-access sessions
//!
//! Break-glass access is a documented, audited override for authorized
//! administrators. Everything done while a session is active is tagged
//! with that session for post-incident review; ending the session is an
//! ordinary administrative act, deliberately untagged, so reviewers can
//! separate "done under emergency authority" from "ending the emergency".

#![deny(unsafe_code)]

use alder_access::PermissionEngine;
use alder_audit::{entity, AuditAction, AuditEntryDraft, AuditError, AuditLog, EntryTagger};
use alder_types::{Actor, SessionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Minimum length of a break-glass justification.
pub const MIN_REASON_LENGTH: usize = 20;

/// An emergency access session. At most one active session per user.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BreakGlassSession {
    pub id: SessionId,
    pub user_id: UserId,
    pub user_name: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    pub activated_at: DateTime<Utc>,
    pub is_active: bool,
    /// Number of audited actions attributed to the session. Activation
    /// itself counts, so this starts at 1.
    pub action_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deactivated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deactivated_by: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deactivated_by_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deactivation_note: Option<String>,
}

/// Inputs for activating a session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActivationRequest {
    pub user_id: UserId,
    pub user_name: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
}

/// Break-glass errors. Messages keep the substrings the call contract
/// promises ("not found", "already deactivated", "already has an active
/// break-glass session").
#[derive(Debug, Error)]
pub enum BreakGlassError {
    #[error("Break-glass reason must be at least {minimum} characters")]
    ReasonTooShort { minimum: usize },

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("User account is inactive: {0}")]
    UserInactive(String),

    #[error("User {0} is not authorized for break-glass access")]
    NotAuthorized(String),

    #[error("User {0} already has an active break-glass session")]
    SessionAlreadyActive(String),

    #[error("Break-glass session not found: {0}")]
    SessionNotFound(String),

    #[error("Break-glass session {0} is already deactivated")]
    AlreadyDeactivated(String),

    #[error("Break-glass session {0} is not active")]
    SessionNotActive(String),

    #[error("Access error: {0}")]
    Access(#[from] alder_access::AccessError),

    #[error("Audit error: {0}")]
    Audit(#[from] AuditError),

    #[error("Lock error")]
    LockError,
}

/// Manages emergency access sessions: Inactive -> Active -> Inactive.
pub struct BreakGlassController {
    sessions: RwLock<HashMap<SessionId, BreakGlassSession>>,
    directory: Arc<PermissionEngine>,
    audit: Arc<AuditLog>,
}

impl BreakGlassController {
    pub fn new(directory: Arc<PermissionEngine>, audit: Arc<AuditLog>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            directory,
            audit,
        }
    }

    /// Activate an emergency session for an authorized administrator.
    ///
    /// The activation entry is tagged as a break-glass action and carries
    /// the new session id; the justification travels as the change note.
    pub fn activate(
        &self,
        request: ActivationRequest,
    ) -> Result<BreakGlassSession, BreakGlassError> {
        if request.reason.trim().len() < MIN_REASON_LENGTH {
            return Err(BreakGlassError::ReasonTooShort {
                minimum: MIN_REASON_LENGTH,
            });
        }

        let user = self
            .directory
            .find_user(&request.user_id)?
            .ok_or_else(|| BreakGlassError::UserNotFound(request.user_id.0.clone()))?;
        if !user.is_active {
            return Err(BreakGlassError::UserInactive(request.user_id.0.clone()));
        }
        if !self.is_authorized(&request.user_id)? {
            return Err(BreakGlassError::NotAuthorized(request.user_id.0.clone()));
        }

        let session = {
            // Duplicate check and insert must share one critical section.
            let mut sessions = self.sessions.write().map_err(|_| BreakGlassError::LockError)?;
            if sessions
                .values()
                .any(|session| session.user_id == request.user_id && session.is_active)
            {
                return Err(BreakGlassError::SessionAlreadyActive(
                    request.user_id.0.clone(),
                ));
            }

            let session = BreakGlassSession {
                id: SessionId::generate(),
                user_id: request.user_id.clone(),
                user_name: request.user_name.clone(),
                reason: request.reason.clone(),
                authentication_method: request.authentication_method.clone(),
                ip_address: request.ip_address.clone(),
                activated_at: Utc::now(),
                is_active: true,
                action_count: 1,
                deactivated_at: None,
                deactivated_by: None,
                deactivated_by_name: None,
                deactivation_note: None,
            };
            sessions.insert(session.id.clone(), session.clone());
            session
        };

        let actor = Actor::new(request.user_id.as_str(), request.user_name.clone());
        self.audit.append(
            AuditEntryDraft::new(
                AuditAction::ActivateBreakGlass,
                entity::BREAK_GLASS_SESSION,
                session.id.as_str(),
                &actor,
            )
            .with_note(request.reason)
            .under_break_glass(session.id.clone()),
        )?;

        tracing::warn!(
            user = %session.user_id,
            session = %session.id,
            "break-glass session activated"
        );
        Ok(session)
    }

    /// End a session. The deactivation entry is deliberately NOT tagged
    /// as a break-glass action.
    pub fn deactivate(
        &self,
        session_id: &SessionId,
        deactivated_by: &Actor,
        note: Option<String>,
    ) -> Result<BreakGlassSession, BreakGlassError> {
        let session = {
            let mut sessions = self.sessions.write().map_err(|_| BreakGlassError::LockError)?;
            let session = sessions
                .get_mut(session_id)
                .ok_or_else(|| BreakGlassError::SessionNotFound(session_id.0.clone()))?;
            if !session.is_active {
                return Err(BreakGlassError::AlreadyDeactivated(session_id.0.clone()));
            }

            session.is_active = false;
            session.deactivated_at = Some(Utc::now());
            session.deactivated_by = Some(deactivated_by.id.clone());
            session.deactivated_by_name = Some(deactivated_by.name.clone());
            session.deactivation_note = note.clone();
            session.clone()
        };

        let mut draft = AuditEntryDraft::new(
            AuditAction::DeactivateBreakGlass,
            entity::BREAK_GLASS_SESSION,
            session_id.as_str(),
            deactivated_by,
        );
        if let Some(note) = note {
            draft = draft.with_note(note);
        }
        self.audit.append(draft)?;

        tracing::info!(session = %session_id, by = %deactivated_by.id, "break-glass session deactivated");
        Ok(session)
    }

    /// Tally one privileged operation against an active session.
    pub fn increment_action_count(&self, session_id: &SessionId) -> Result<u64, BreakGlassError> {
        let mut sessions = self.sessions.write().map_err(|_| BreakGlassError::LockError)?;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| BreakGlassError::SessionNotFound(session_id.0.clone()))?;
        if !session.is_active {
            return Err(BreakGlassError::SessionNotActive(session_id.0.clone()));
        }
        session.action_count += 1;
        Ok(session.action_count)
    }

    /// The user's active session, if any.
    pub fn active_session(
        &self,
        user_id: &UserId,
    ) -> Result<Option<BreakGlassSession>, BreakGlassError> {
        let sessions = self.sessions.read().map_err(|_| BreakGlassError::LockError)?;
        Ok(sessions
            .values()
            .find(|session| session.user_id == *user_id && session.is_active)
            .cloned())
    }

    /// All sessions for a user, newest activation first.
    pub fn sessions_for_user(
        &self,
        user_id: &UserId,
        active_only: bool,
    ) -> Result<Vec<BreakGlassSession>, BreakGlassError> {
        let sessions = self.sessions.read().map_err(|_| BreakGlassError::LockError)?;
        let mut found: Vec<BreakGlassSession> = sessions
            .values()
            .filter(|session| session.user_id == *user_id)
            .filter(|session| !active_only || session.is_active)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.activated_at.cmp(&a.activated_at));
        Ok(found)
    }

    pub fn get_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<BreakGlassSession>, BreakGlassError> {
        let sessions = self.sessions.read().map_err(|_| BreakGlassError::LockError)?;
        Ok(sessions.get(session_id).cloned())
    }

    /// Every session in the store, newest activation first.
    pub fn all_sessions(&self, active_only: bool) -> Result<Vec<BreakGlassSession>, BreakGlassError> {
        let sessions = self.sessions.read().map_err(|_| BreakGlassError::LockError)?;
        let mut found: Vec<BreakGlassSession> = sessions
            .values()
            .filter(|session| !active_only || session.is_active)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.activated_at.cmp(&a.activated_at));
        Ok(found)
    }

    /// True only for active users whose roles carry the break-glass
    /// capability (the Admin wildcard satisfies it).
    pub fn is_authorized(&self, user_id: &UserId) -> Result<bool, BreakGlassError> {
        Ok(self
            .directory
            .user_has_capability(user_id, "breakglass", "activate")?)
    }
}

impl EntryTagger for BreakGlassController {
    /// Tag entries produced while the acting user has an active session.
    ///
    /// Session lifecycle entries are exempt: activation tags itself, and
    /// deactivation must stay an ordinary administrative event.
    fn tag(&self, draft: AuditEntryDraft) -> AuditEntryDraft {
        if matches!(
            draft.action,
            AuditAction::ActivateBreakGlass | AuditAction::DeactivateBreakGlass
        ) {
            return draft;
        }

        let Ok(mut sessions) = self.sessions.write() else {
            return draft;
        };
        let active = sessions
            .values_mut()
            .find(|session| session.user_id == draft.user_id && session.is_active)
            .map(|session| {
                session.action_count += 1;
                session.id.clone()
            });
        drop(sessions);

        match active {
            Some(session_id) => draft.under_break_glass(session_id),
            None => draft,
        }
    }
}
