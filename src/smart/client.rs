//! Outbound federation: fetching resources from an external FHIR server
//! under a SMART session.
//!
//! The pipeline is scope check (local), then token (refreshing at most
//! once), then the backend call, then validation of the returned resource
//! through the same validator inbound resources go through. A scope
//! failure never reaches the network.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{FhirPortalError, Result};
use crate::resource::{Resource, ResourceType};
use crate::smart::flow::SmartFlow;
use crate::smart::scopes::SmartScope;
use crate::smart::session::SmartSession;
use crate::validation::ResourceValidator;

/// Transport to an external FHIR server. The access token is passed per
/// call; implementations attach it as a Bearer credential.
#[async_trait]
pub trait FhirBackend: Send + Sync {
    async fn read(
        &self,
        resource_type: ResourceType,
        id: &str,
        access_token: &str,
    ) -> Result<Value>;
}

/// Client for federated reads against an external FHIR server.
pub struct FederatedClient {
    flow: SmartFlow,
    backend: Arc<dyn FhirBackend>,
    validator: ResourceValidator,
}

impl FederatedClient {
    pub fn new(flow: SmartFlow, backend: Arc<dyn FhirBackend>, validator: ResourceValidator) -> Self {
        Self {
            flow,
            backend,
            validator,
        }
    }

    pub fn flow(&self) -> &SmartFlow {
        &self.flow
    }

    /// Reads and validates one resource from the external server.
    pub async fn read(
        &self,
        session: &mut SmartSession,
        resource_type: ResourceType,
        id: &str,
    ) -> Result<Resource> {
        let required = SmartScope::patient_read(resource_type);
        self.flow.require_scope(session, &required)?;

        let token = self.flow.ensure_access_token(session).await?;
        let body = self.backend.read(resource_type, id, &token).await?;

        debug!(%resource_type, id, "validating federated resource");
        self.validator
            .validate(resource_type, &body)
            .into_resource()
            .map_err(|issues| FhirPortalError::Validation {
                message: format!(
                    "external {resource_type} failed validation: {}",
                    issues
                        .iter()
                        .map(|i| format!("{}: {}", i.path, i.message))
                        .collect::<Vec<_>>()
                        .join("; ")
                ),
            })
    }
}
