//! Token lifecycle management.
//!
//! The manager exclusively owns the token material of every session. Each
//! session sits behind its own `tokio::sync::Mutex`, which serializes
//! writers per session (a refresh cannot race a use-then-expire check)
//! while leaving independent sessions free of any shared lock.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::error::AuthError;
use crate::smart::session::{SessionState, SmartSession, TokenSet};

#[derive(Debug, Default)]
pub struct TokenLifecycleManager {
    sessions: Arc<RwLock<HashMap<Uuid, Arc<Mutex<SmartSession>>>>>,
}

impl TokenLifecycleManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fresh Unauthenticated session and returns its id.
    pub async fn create_session(&self) -> Uuid {
        let session = SmartSession::new();
        let id = session.id;
        self.sessions
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(session)));
        debug!(session = %id, "session created");
        id
    }

    /// Handle to one session. Callers hold the returned mutex across flow
    /// operations; that lock is what gives single-writer-per-session.
    pub async fn session(&self, id: Uuid) -> Result<Arc<Mutex<SmartSession>>, AuthError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(AuthError::UnknownSession { id })
    }

    /// Installs issued tokens on a session, authorizing it if it was
    /// pending (or re-authorizing after expiry).
    pub async fn issue(&self, id: Uuid, tokens: TokenSet) -> Result<(), AuthError> {
        let session = self.session(id).await?;
        let mut session = session.lock().await;
        match session.state() {
            SessionState::AuthorizationPending | SessionState::Expired => {
                session.tokens = Some(tokens);
                session.transition(SessionState::Authorized)?;
            }
            SessionState::Authorized => {
                session.tokens = Some(tokens);
            }
            other => {
                return Err(AuthError::InvalidTransition {
                    from: other.to_string(),
                    to: SessionState::Authorized.to_string(),
                });
            }
        }
        session.refresh_attempted = false;
        Ok(())
    }

    /// The session's access token, after the local expiry check.
    pub async fn current_access_token(&self, id: Uuid) -> Result<String, AuthError> {
        let session = self.session(id).await?;
        let mut session = session.lock().await;
        session.access_token().map(str::to_string)
    }

    /// Revokes a session in place. Idempotent; the session entry remains
    /// until [`TokenLifecycleManager::remove`].
    pub async fn revoke(&self, id: Uuid) -> Result<(), AuthError> {
        let session = self.session(id).await?;
        let mut session = session.lock().await;
        if session.state() != SessionState::Revoked {
            session.transition(SessionState::Revoked)?;
        }
        debug!(session = %id, "session revoked");
        Ok(())
    }

    /// Destroys a session and its token material.
    pub async fn remove(&self, id: Uuid) {
        self.sessions.write().await.remove(&id);
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl Clone for TokenLifecycleManager {
    fn clone(&self) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
        }
    }
}
