//! SMART on FHIR authorization: PKCE, scopes, the session state machine,
//! and the OAuth2 flow against an external authorization server.

pub mod client;
pub mod flow;
pub mod pkce;
pub mod scopes;
pub mod session;

#[cfg(feature = "http-client")]
pub mod http;

pub use client::{FederatedClient, FhirBackend};
pub use flow::{AuthorizationServer, CodeExchange, SmartConfig, SmartFlow, TokenResponse};
pub use pkce::{CODE_CHALLENGE_METHOD, PkceVerifier, generate_state};
pub use scopes::{ScopeAccess, ScopeContext, ScopeResource, ScopeSet, SmartScope};
pub use session::{SessionState, SmartSession, TokenSet};

#[cfg(feature = "http-client")]
pub use http::HttpAuthorizationServer;
