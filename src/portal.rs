//! Portal facade: the inbound create/update/bundle pipeline.
//!
//! Routing adapters call these entry points; the pipeline is validate
//! (structural + coding), resolve (graph integrity), stamp `meta`, then
//! persist through the [`ResourceStore`] boundary.

use std::sync::Arc;

use tracing::debug;

use crate::error::{FhirPortalError, Result};
use crate::reference::{BundleIndex, ReferenceResolver};
use crate::resource::{Meta, Resource, ResourceType};
use crate::store::ResourceStore;
use crate::terminology::CodeSystemRegistry;
use crate::validation::{ResourceValidator, ValidationIssue, ValidationOutcome};

/// Outcome of a transactional bundle submission. Rejection carries the
/// issues per entry index; the bundle is all-or-nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum BundleOutcome {
    Applied(Vec<Resource>),
    Rejected(Vec<(usize, Vec<ValidationIssue>)>),
}

pub struct PortalCore {
    validator: ResourceValidator,
    resolver: ReferenceResolver,
    store: Arc<dyn ResourceStore>,
}

impl PortalCore {
    pub fn new(registry: Arc<CodeSystemRegistry>, store: Arc<dyn ResourceStore>) -> Self {
        Self {
            validator: ResourceValidator::new(registry),
            resolver: ReferenceResolver::new(),
            store,
        }
    }

    pub fn validator(&self) -> &ResourceValidator {
        &self.validator
    }

    /// Validates `raw` and, when schema-valid, resolves its references
    /// against the bundle index and the store. Validation defects come
    /// back as `Ok(Invalid(..))`; reference integrity failures are errors
    /// that reject the submission as a whole.
    pub async fn validate_and_resolve(
        &self,
        resource_type: ResourceType,
        raw: &serde_json::Value,
        bundle: &BundleIndex,
    ) -> Result<ValidationOutcome> {
        match self.validator.validate(resource_type, raw) {
            ValidationOutcome::Valid(resource) => {
                let resolved = self
                    .resolver
                    .resolve(resource, bundle, self.store.as_ref())
                    .await?;
                Ok(ValidationOutcome::Valid(resolved))
            }
            invalid => Ok(invalid),
        }
    }

    /// Create: validate, resolve, stamp version 1, persist.
    pub async fn create(
        &self,
        resource_type: ResourceType,
        raw: &serde_json::Value,
    ) -> Result<ValidationOutcome> {
        let outcome = self
            .validate_and_resolve(resource_type, raw, &BundleIndex::new())
            .await?;
        let ValidationOutcome::Valid(mut resource) = outcome else {
            return Ok(outcome);
        };

        *resource.meta_mut() = Meta::initial();
        self.persist(&resource).await?;
        debug!(%resource_type, id = resource.id(), "resource created");
        Ok(ValidationOutcome::Valid(resource))
    }

    /// Update: the target must exist; the stored version is incremented
    /// and `lastUpdated` refreshed. The id is immutable — the stored id
    /// wins over anything in the body.
    pub async fn update(
        &self,
        resource_type: ResourceType,
        id: &str,
        raw: &serde_json::Value,
    ) -> Result<ValidationOutcome> {
        let previous = self
            .store
            .get(resource_type, id)
            .await?
            .ok_or_else(|| FhirPortalError::Store {
                message: format!("{resource_type}/{id} not found"),
            })?;
        let previous_meta: Meta = previous
            .get("meta")
            .cloned()
            .and_then(|m| serde_json::from_value(m).ok())
            .unwrap_or_default();

        let outcome = self
            .validate_and_resolve(resource_type, raw, &BundleIndex::new())
            .await?;
        let ValidationOutcome::Valid(mut resource) = outcome else {
            return Ok(outcome);
        };

        set_resource_id(&mut resource, id);
        *resource.meta_mut() = previous_meta.next();
        self.persist(&resource).await?;
        debug!(%resource_type, id, version = resource.meta().version_id, "resource updated");
        Ok(ValidationOutcome::Valid(resource))
    }

    /// Transactional bundle: every entry must validate, the reference
    /// graph must be acyclic and fully resolvable, then all entries are
    /// persisted. Any defect rejects the bundle whole.
    pub async fn submit_bundle(
        &self,
        entries: Vec<(ResourceType, serde_json::Value)>,
    ) -> Result<BundleOutcome> {
        let mut resources = Vec::with_capacity(entries.len());
        let mut rejections = Vec::new();

        for (index, (resource_type, raw)) in entries.iter().enumerate() {
            match self.validator.validate(*resource_type, raw) {
                ValidationOutcome::Valid(resource) => resources.push(resource),
                ValidationOutcome::Invalid(issues) => rejections.push((index, issues)),
            }
        }
        if !rejections.is_empty() {
            return Ok(BundleOutcome::Rejected(rejections));
        }

        let mut resolved = self
            .resolver
            .resolve_bundle(resources, self.store.as_ref())
            .await?;
        for resource in &mut resolved {
            *resource.meta_mut() = Meta::initial();
            self.persist(resource).await?;
        }
        Ok(BundleOutcome::Applied(resolved))
    }

    async fn persist(&self, resource: &Resource) -> Result<()> {
        let body = resource.to_json()?;
        self.store
            .put(resource.resource_type(), resource.id(), body)
            .await
    }
}

fn set_resource_id(resource: &mut Resource, id: &str) {
    match resource {
        Resource::Patient(p) => p.id = id.to_string(),
        Resource::Observation(o) => o.id = id.to_string(),
        Resource::MedicationRequest(m) => m.id = id.to_string(),
        Resource::Condition(c) => c.id = id.to_string(),
    }
}
