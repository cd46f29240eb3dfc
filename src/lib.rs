//! # FHIR Portal Core
//!
//! The engine of a FHIR R4 patient portal: resource validation with
//! terminology-bound coding, cross-resource reference resolution, and the
//! SMART on FHIR authorization flow with token lifecycle management.
//!
//! HTTP routing, persistence, and the UI live outside this crate and plug
//! in through the [`store::ResourceStore`] and
//! [`smart::AuthorizationServer`] traits.
//!
//! ## Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use fhir_portal_core::*;
//! use serde_json::json;
//!
//! let registry = Arc::new(CodeSystemRegistry::r4_default());
//! let validator = ResourceValidator::new(registry);
//!
//! let outcome = validator.validate(
//!     ResourceType::Observation,
//!     &json!({
//!         "resourceType": "Observation",
//!         "status": "final",
//!         "code": {"coding": [{"system": "http://loinc.org", "code": "8302-2"}]},
//!         "subject": {"reference": "Patient/123"},
//!     }),
//! );
//! assert!(outcome.is_valid());
//! ```

pub mod capability;
pub mod error;
pub mod portal;
pub mod reference;
pub mod resource;
pub mod search;
pub mod smart;
pub mod store;
pub mod terminology;
pub mod token;
pub mod validation;

pub use error::{AuthError, FhirPortalError, ResolutionError, Result, UnknownSystemError};
pub use portal::{BundleOutcome, PortalCore};
pub use reference::{BundleIndex, ReferenceResolver};
pub use resource::{
    Address, CodeableConcept, Coding, Condition, ContactPoint, HumanName, Identifier,
    MedicationRequest, Meta, Observation, Patient, Quantity, Resource, ResourceReference,
    ResourceType,
};
pub use search::{PatientSearch, searchset_bundle};
pub use smart::{
    AuthorizationServer, FederatedClient, FhirBackend, ScopeSet, SessionState, SmartConfig,
    SmartFlow, SmartScope, SmartSession, TokenResponse, TokenSet,
};
pub use store::{MemoryStore, ResourceStore};
pub use terminology::{CodeSystemRegistry, CodeValidator, RegexCodeValidator};
pub use token::TokenLifecycleManager;
pub use validation::{IssueKind, ResourceValidator, ValidationIssue, ValidationOutcome};

#[cfg(feature = "http-client")]
pub use smart::HttpAuthorizationServer;
