//! The SMART on FHIR authorization-code + PKCE flow.
//!
//! `SmartFlow` drives a [`SmartSession`] through the state machine against
//! an external authorization server reached via the [`AuthorizationServer`]
//! trait. The trait keeps the HTTP transport out of the core; a reqwest
//! implementation ships behind the `http-client` feature.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::error::AuthError;
use crate::smart::pkce::{self, CODE_CHALLENGE_METHOD, PkceVerifier};
use crate::smart::scopes::{ScopeSet, SmartScope};
use crate::smart::session::{SessionState, SmartSession, TokenSet};

/// Fallback token lifetime when the server omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// SMART client configuration. Constructed explicitly by the caller; there
/// is no ambient/global configuration.
#[derive(Clone)]
pub struct SmartConfig {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: Url,
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    /// FHIR base URL of the server being authorized against; sent as the
    /// `aud` parameter when present.
    pub fhir_base_url: Option<Url>,
}

// The client secret never appears in logs.
impl std::fmt::Debug for SmartConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| ".."))
            .field("redirect_uri", &self.redirect_uri.as_str())
            .field("authorization_endpoint", &self.authorization_endpoint.as_str())
            .field("token_endpoint", &self.token_endpoint.as_str())
            .finish()
    }
}

/// Standard OAuth2 token response JSON (RFC 6749 §5.1, SMART extensions).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    /// Patient-in-context claim from SMART launch flows.
    #[serde(default)]
    pub patient: Option<String>,
}

/// Parameters for the authorization-code grant POST.
pub struct CodeExchange<'a> {
    pub code: &'a str,
    pub code_verifier: &'a str,
    pub redirect_uri: &'a Url,
    pub client_id: &'a str,
    pub client_secret: Option<&'a str>,
}

// The grant code and verifier never appear in logs.
impl std::fmt::Debug for CodeExchange<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeExchange")
            .field("code", &"..")
            .field("code_verifier", &"..")
            .field("redirect_uri", &self.redirect_uri.as_str())
            .field("client_id", &self.client_id)
            .finish()
    }
}

/// The external OAuth2 token endpoint.
#[async_trait]
pub trait AuthorizationServer: Send + Sync {
    async fn exchange_code(&self, request: CodeExchange<'_>) -> Result<TokenResponse, AuthError>;

    async fn refresh_token(
        &self,
        refresh_token: &str,
        client_id: &str,
        client_secret: Option<&str>,
    ) -> Result<TokenResponse, AuthError>;
}

/// Orchestrates the authorization handshake for one session at a time.
/// Stateless itself; all per-user state lives in the session.
#[derive(Clone)]
pub struct SmartFlow {
    config: SmartConfig,
    server: Arc<dyn AuthorizationServer>,
}

impl SmartFlow {
    pub fn new(config: SmartConfig, server: Arc<dyn AuthorizationServer>) -> Self {
        Self { config, server }
    }

    pub fn config(&self) -> &SmartConfig {
        &self.config
    }

    /// Unauthenticated -> AuthorizationPending. Callable again on a
    /// pending session: a restart discards any previous PKCE material and
    /// issues fresh values, which is how a failed callback is retried.
    ///
    /// Generates the PKCE pair and anti-forgery state, stores them on the
    /// session, and returns the redirect URL for the authorization server.
    pub fn begin_authorization(
        &self,
        session: &mut SmartSession,
        scopes: &ScopeSet,
    ) -> Result<Url, AuthError> {
        session.transition(SessionState::AuthorizationPending)?;

        let verifier = PkceVerifier::generate();
        let state = pkce::generate_state();

        let mut authorize_url = self.config.authorization_endpoint.clone();
        {
            let mut query = authorize_url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.config.client_id)
                .append_pair("redirect_uri", self.config.redirect_uri.as_str())
                .append_pair("scope", &scopes.to_string())
                .append_pair("state", &state)
                .append_pair("code_challenge", &verifier.challenge())
                .append_pair("code_challenge_method", CODE_CHALLENGE_METHOD);
            if let Some(aud) = &self.config.fhir_base_url {
                query.append_pair("aud", aud.as_str());
            }
        }

        session.pkce = Some(verifier);
        session.auth_state = Some(state);
        debug!(session = %session.id, "authorization started");
        Ok(authorize_url)
    }

    /// AuthorizationPending -> Authorized.
    ///
    /// Validates the anti-CSRF state and exchanges the code for tokens. On
    /// any failure the session stays AuthorizationPending, but the PKCE
    /// verifier is discarded: a retry must restart at
    /// [`SmartFlow::begin_authorization`] with fresh material.
    pub async fn handle_callback(
        &self,
        session: &mut SmartSession,
        code: &str,
        returned_state: &str,
    ) -> Result<(), AuthError> {
        if session.state() != SessionState::AuthorizationPending {
            return Err(AuthError::InvalidTransition {
                from: session.state().to_string(),
                to: SessionState::Authorized.to_string(),
            });
        }

        // Taken up front so stale material is never reused, whatever the
        // outcome below.
        let verifier = session.pkce.take();
        let issued_state = session.auth_state.take();

        let matches = issued_state
            .as_deref()
            .is_some_and(|issued| pkce::state_matches(issued, returned_state));
        if !matches {
            warn!(session = %session.id, "callback state mismatch");
            return Err(AuthError::StateMismatch);
        }

        let verifier = verifier.ok_or(AuthError::StateMismatch)?;

        let response = self
            .server
            .exchange_code(CodeExchange {
                code,
                code_verifier: verifier.as_str(),
                redirect_uri: &self.config.redirect_uri,
                client_id: &self.config.client_id,
                client_secret: self.config.client_secret.as_deref(),
            })
            .await?;

        self.install_tokens(session, response)?;
        session.transition(SessionState::Authorized)?;
        session.refresh_attempted = false;
        debug!(session = %session.id, "authorization complete");
        Ok(())
    }

    /// Expired -> Authorized via the refresh grant. A failed refresh is
    /// terminal: the session is revoked and the caller must restart at
    /// Unauthenticated.
    pub async fn refresh(&self, session: &mut SmartSession) -> Result<(), AuthError> {
        session.check_expiry();
        if session.state() != SessionState::Expired {
            return Err(AuthError::InvalidTransition {
                from: session.state().to_string(),
                to: SessionState::Authorized.to_string(),
            });
        }

        let Some(refresh_token) = session
            .tokens
            .as_ref()
            .and_then(|t| t.refresh_token.clone())
        else {
            session.transition(SessionState::Revoked)?;
            return Err(AuthError::ReauthenticationRequired);
        };

        session.refresh_attempted = true;
        match self
            .server
            .refresh_token(
                &refresh_token,
                &self.config.client_id,
                self.config.client_secret.as_deref(),
            )
            .await
        {
            Ok(response) => {
                self.install_tokens(session, response)?;
                session.transition(SessionState::Authorized)?;
                session.refresh_attempted = false;
                debug!(session = %session.id, "token refreshed");
                Ok(())
            }
            Err(err) => {
                warn!(session = %session.id, error = %err, "refresh failed; revoking session");
                session.transition(SessionState::Revoked)?;
                Err(AuthError::ReauthenticationRequired)
            }
        }
    }

    /// Current access token, refreshing at most once if it has expired.
    pub async fn ensure_access_token(
        &self,
        session: &mut SmartSession,
    ) -> Result<String, AuthError> {
        session.check_expiry();
        if session.state() == SessionState::Expired && !session.refresh_attempted {
            self.refresh(session).await?;
        }
        session.access_token().map(str::to_string)
    }

    /// Any state -> Revoked. Idempotent.
    pub fn revoke(&self, session: &mut SmartSession) -> Result<(), AuthError> {
        if session.state() == SessionState::Revoked {
            return Ok(());
        }
        session.transition(SessionState::Revoked)
    }

    /// Local scope enforcement; never touches the network.
    pub fn require_scope(
        &self,
        session: &SmartSession,
        required: &SmartScope,
    ) -> Result<(), AuthError> {
        session.granted_scopes().require(required)
    }

    fn install_tokens(
        &self,
        session: &mut SmartSession,
        response: TokenResponse,
    ) -> Result<(), AuthError> {
        // Clamp rather than wrap or panic on absurd server-supplied
        // lifetimes.
        let lifetime = match response.expires_in {
            Some(secs) => i64::try_from(secs)
                .ok()
                .and_then(Duration::try_seconds)
                .unwrap_or(Duration::MAX),
            None => Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS),
        };

        // A refresh that omits refresh_token keeps the previous one
        // (RFC 6749 §6).
        let refresh_token = response.refresh_token.or_else(|| {
            session
                .tokens
                .as_ref()
                .and_then(|t| t.refresh_token.clone())
        });

        if let Some(scope) = &response.scope {
            session.granted_scopes = ScopeSet::parse_lenient(scope);
        }
        session.tokens = Some(TokenSet {
            access_token: response.access_token,
            refresh_token,
            expires_at: Utc::now()
                .checked_add_signed(lifetime)
                .unwrap_or(chrono::DateTime::<Utc>::MAX_UTC),
        });
        Ok(())
    }
}

impl std::fmt::Debug for SmartFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartFlow")
            .field("config", &self.config)
            .finish()
    }
}
