use thiserror::Error;

use crate::resource::ResourceType;

/// Crate-level error umbrella. Subsystems return their own focused error
/// types; this enum exists for callers that funnel everything through one
/// `Result`.
#[derive(Error, Debug)]
pub enum FhirPortalError {
    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    UnknownSystem(#[from] UnknownSystemError),

    #[error("Store error: {message}")]
    Store { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

/// A coded value named a terminology system the registry has never seen.
/// Callers must treat this as a hard validation failure, not a pass-through.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown code system: {system}")]
pub struct UnknownSystemError {
    pub system: String,
}

impl UnknownSystemError {
    pub fn new(system: impl Into<String>) -> Self {
        Self {
            system: system.into(),
        }
    }
}

/// Reference-graph failures. The whole bundle is rejected on any of these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    /// In-bundle reference cycle. `path` names every hop, e.g.
    /// `Observation/A -> Condition/B -> Observation/A`.
    #[error("Cyclic reference chain: {path}")]
    CyclicReference { path: String },

    #[error("Referenced resource does not exist: {target_type}/{target_id}")]
    UnknownTarget {
        target_type: ResourceType,
        target_id: String,
    },

    #[error("Reference lookup failed: {message}")]
    Lookup { message: String },
}

/// SMART on FHIR authorization failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The callback `state` did not match the one issued at
    /// `begin_authorization` (anti-CSRF). The session stays
    /// AuthorizationPending; the flow must be restarted for a fresh verifier.
    #[error("Authorization callback state does not match the issued state")]
    StateMismatch,

    /// Non-2xx from the token endpoint during code exchange.
    #[error("Token exchange failed (status {status}): {detail}")]
    TokenExchange { status: u16, detail: String },

    /// The access token is past `expires_at`. Recoverable via `refresh()`.
    #[error("Access token has expired")]
    ExpiredToken,

    /// Refresh failed; the session is Revoked and the caller must restart
    /// the flow from Unauthenticated.
    #[error("Session requires re-authentication")]
    ReauthenticationRequired,

    /// The operation's required scope is not covered by the granted set.
    /// Raised locally, before any network call.
    #[error("Insufficient scope: requires '{required}', granted [{granted}]")]
    InsufficientScope { required: String, granted: String },

    /// The session is not in a state that permits the requested transition.
    #[error("Invalid session transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Unknown session: {id}")]
    UnknownSession { id: uuid::Uuid },

    #[error("Malformed scope: {scope}")]
    MalformedScope { scope: String },

    /// Transport-level failure talking to the authorization server.
    #[error("Authorization server request failed: {message}")]
    Http { message: String },
}

pub type Result<T> = std::result::Result<T, FhirPortalError>;
