//! SMART session state machine.
//!
//! The session lifecycle is an explicit enum plus a transition table, not
//! scattered flags: every state change goes through
//! [`SmartSession::transition`], which rejects anything the table does not
//! permit.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AuthError;
use crate::smart::pkce::PkceVerifier;
use crate::smart::scopes::ScopeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    AuthorizationPending,
    Authorized,
    Expired,
    Revoked,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Unauthenticated => "unauthenticated",
            SessionState::AuthorizationPending => "authorization-pending",
            SessionState::Authorized => "authorized",
            SessionState::Expired => "expired",
            SessionState::Revoked => "revoked",
        }
    }

    /// The legal transitions. Revoked is terminal; everything may revoke.
    /// AuthorizationPending re-enters itself so a failed callback can be
    /// retried with fresh PKCE material.
    pub fn can_transition(self, to: SessionState) -> bool {
        use SessionState::*;
        match (self, to) {
            (Revoked, _) => false,
            (_, Revoked) => true,
            (Unauthenticated, AuthorizationPending) => true,
            (AuthorizationPending, AuthorizationPending) => true,
            (AuthorizationPending, Authorized) => true,
            (Authorized, Expired) => true,
            (Expired, Authorized) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Issued token material. Held in memory only, for the session's lifetime.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl TokenSet {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

// Token material never appears in logs.
impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"..")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| ".."),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// One user's SMART authorization session.
///
/// Created at login start, destroyed on logout/revocation or terminal
/// refresh failure. The PKCE verifier lives only between
/// `begin_authorization` and the code exchange.
#[derive(Debug, Clone)]
pub struct SmartSession {
    pub id: Uuid,
    state: SessionState,
    pub(crate) pkce: Option<PkceVerifier>,
    pub(crate) auth_state: Option<String>,
    pub(crate) tokens: Option<TokenSet>,
    pub(crate) granted_scopes: ScopeSet,
    /// At most one refresh attempt per expired use.
    pub(crate) refresh_attempted: bool,
}

impl SmartSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Unauthenticated,
            pkce: None,
            auth_state: None,
            tokens: None,
            granted_scopes: ScopeSet::new(),
            refresh_attempted: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn granted_scopes(&self) -> &ScopeSet {
        &self.granted_scopes
    }

    /// Applies a state change, or fails with `InvalidTransition`.
    pub(crate) fn transition(&mut self, to: SessionState) -> Result<(), AuthError> {
        if !self.state.can_transition(to) {
            return Err(AuthError::InvalidTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        self.state = to;
        if to == SessionState::Revoked {
            // Terminal: drop all secret material immediately.
            self.pkce = None;
            self.auth_state = None;
            self.tokens = None;
            self.refresh_attempted = false;
        }
        Ok(())
    }

    /// Local expiry check, applied before any token use.
    pub(crate) fn check_expiry(&mut self) {
        if self.state == SessionState::Authorized
            && self.tokens.as_ref().is_some_and(TokenSet::is_expired)
        {
            // Authorized -> Expired is always legal per the table.
            let _ = self.transition(SessionState::Expired);
        }
    }

    /// The current access token if the session is Authorized and fresh.
    pub fn access_token(&mut self) -> Result<&str, AuthError> {
        self.check_expiry();
        match self.state {
            SessionState::Authorized => self
                .tokens
                .as_ref()
                .map(|t| t.access_token.as_str())
                .ok_or(AuthError::ExpiredToken),
            _ => Err(AuthError::ExpiredToken),
        }
    }
}

impl Default for SmartSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn transition_table() {
        use SessionState::*;
        assert!(Unauthenticated.can_transition(AuthorizationPending));
        // Restarting a pending flow is legal.
        assert!(AuthorizationPending.can_transition(AuthorizationPending));
        assert!(AuthorizationPending.can_transition(Authorized));
        assert!(Authorized.can_transition(Expired));
        assert!(Expired.can_transition(Authorized));
        for state in [Unauthenticated, AuthorizationPending, Authorized, Expired] {
            assert!(state.can_transition(Revoked));
        }
        // Revoked is terminal.
        for state in [Unauthenticated, AuthorizationPending, Authorized, Expired, Revoked] {
            assert!(!Revoked.can_transition(state));
        }
        // Illegal jumps.
        assert!(!Unauthenticated.can_transition(Authorized));
        assert!(!AuthorizationPending.can_transition(Expired));
    }

    #[test]
    fn illegal_transition_is_typed() {
        let mut session = SmartSession::new();
        let err = session.transition(SessionState::Authorized).unwrap_err();
        assert!(matches!(err, AuthError::InvalidTransition { .. }));
        assert_eq!(session.state(), SessionState::Unauthenticated);
    }

    #[test]
    fn revoke_drops_all_material() {
        let mut session = SmartSession::new();
        session.transition(SessionState::AuthorizationPending).unwrap();
        session.pkce = Some(crate::smart::pkce::PkceVerifier::generate());
        session.auth_state = Some("abc".into());
        session.transition(SessionState::Revoked).unwrap();
        assert!(session.pkce.is_none());
        assert!(session.auth_state.is_none());
        assert!(session.tokens.is_none());
    }

    #[test]
    fn expiry_flips_authorized_to_expired() {
        let mut session = SmartSession::new();
        session.transition(SessionState::AuthorizationPending).unwrap();
        session.transition(SessionState::Authorized).unwrap();
        session.tokens = Some(TokenSet {
            access_token: "tok".into(),
            refresh_token: None,
            expires_at: Utc::now() - Duration::seconds(1),
        });
        assert!(matches!(
            session.access_token(),
            Err(AuthError::ExpiredToken)
        ));
        assert_eq!(session.state(), SessionState::Expired);
    }

    #[test]
    fn token_set_debug_redacts() {
        let tokens = TokenSet {
            access_token: "secret-access".into(),
            refresh_token: Some("secret-refresh".into()),
            expires_at: Utc::now(),
        };
        let rendered = format!("{tokens:?}");
        assert!(!rendered.contains("secret"));
    }
}
