//! Typed FHIR R4 resource model for the portal's closed resource set.
//!
//! The portal supports exactly four resource types. They are modeled as a
//! closed tagged enum with per-type structs rather than anything open-ended:
//! new resource types are closed-set additions.

pub mod schema;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use schema::{FieldDef, FieldKind, ResourceSchema, schema_for};

/// The closed set of resource types this portal serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    Patient,
    Observation,
    MedicationRequest,
    Condition,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Patient => "Patient",
            ResourceType::Observation => "Observation",
            ResourceType::MedicationRequest => "MedicationRequest",
            ResourceType::Condition => "Condition",
        }
    }

    pub const ALL: [ResourceType; 4] = [
        ResourceType::Patient,
        ResourceType::Observation,
        ResourceType::MedicationRequest,
        ResourceType::Condition,
    ];
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Patient" => Ok(ResourceType::Patient),
            "Observation" => Ok(ResourceType::Observation),
            "MedicationRequest" => Ok(ResourceType::MedicationRequest),
            "Condition" => Ok(ResourceType::Condition),
            other => Err(format!("unsupported resource type: {other}")),
        }
    }
}

/// Resource metadata stamp: version plus last-updated instant.
///
/// `version_id` starts at 1 and is incremented by the portal on every
/// update; `last_updated` is refreshed alongside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    pub version_id: u64,
    pub last_updated: DateTime<Utc>,
}

impl Meta {
    /// Stamp for a freshly created resource.
    pub fn initial() -> Self {
        Self {
            version_id: 1,
            last_updated: Utc::now(),
        }
    }

    /// Stamp for the next version of an existing resource.
    pub fn next(&self) -> Self {
        Self {
            version_id: self.version_id + 1,
            last_updated: Utc::now(),
        }
    }
}

impl Default for Meta {
    fn default() -> Self {
        Self::initial()
    }
}

/// A single coded value bound to a terminology system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coding {
    pub system: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl Coding {
    pub fn new(system: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            code: code.into(),
            display: None,
        }
    }

    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }
}

/// FHIR CodeableConcept: one concept, possibly coded in several systems.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeableConcept {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub coding: Vec<Coding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl CodeableConcept {
    pub fn from_coding(coding: Coding) -> Self {
        Self {
            coding: vec![coding],
            text: None,
        }
    }
}

/// FHIR Quantity. The unit must come from a recognized unit system
/// (UCUM by default); that check lives in the validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// A reference from one resource to another.
///
/// Created unresolved at parse time; the reference resolver flips
/// `resolved` once target existence is confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceReference {
    pub target_type: ResourceType,
    pub target_id: String,
    #[serde(default)]
    pub resolved: bool,
}

impl ResourceReference {
    pub fn unresolved(target_type: ResourceType, target_id: impl Into<String>) -> Self {
        Self {
            target_type,
            target_id: target_id.into(),
            resolved: false,
        }
    }

    /// Parses either FHIR reference shape:
    /// `{"reference": "Patient/123"}` or `{"targetType": "Patient", "targetId": "123"}`.
    ///
    /// Contained (`#id`) and absolute/`urn:` references are outside this
    /// portal's closed resource graph and yield `None`.
    pub fn from_json(value: &Value) -> Option<Self> {
        if let Some(reference) = value.get("reference").and_then(Value::as_str) {
            if reference.starts_with('#') || reference.contains(':') {
                return None;
            }
            let (type_part, id_part) = reference.split_once('/')?;
            let target_type = ResourceType::from_str(type_part).ok()?;
            if id_part.is_empty() {
                return None;
            }
            return Some(Self::unresolved(target_type, id_part));
        }

        let type_part = value.get("targetType").and_then(Value::as_str)?;
        let id_part = value.get("targetId").and_then(Value::as_str)?;
        let target_type = ResourceType::from_str(type_part).ok()?;
        if id_part.is_empty() {
            return None;
        }
        Some(Self::unresolved(target_type, id_part))
    }

    /// The `ResourceType/id` form used in FHIR JSON and error messages.
    pub fn fhir_reference(&self) -> String {
        format!("{}/{}", self.target_type, self.target_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanName {
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub r#use: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub given: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub r#use: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub line: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactPoint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub r#use: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: String,
    pub meta: Meta,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identifier: Vec<Identifier>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub name: Vec<HumanName>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub telecom: Vec<ContactPoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub address: Vec<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub id: String,
    pub meta: Meta,
    pub status: String,
    pub code: CodeableConcept,
    pub subject: ResourceReference,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_quantity: Option<Quantity>,
    /// What the observation is about when that differs from the subject.
    /// May point at any supported resource, so cycles are possible here.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub focus: Vec<ResourceReference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationRequest {
    pub id: String,
    pub meta: Meta,
    pub status: String,
    pub intent: String,
    #[serde(rename = "medicationCodeableConcept")]
    pub medication: CodeableConcept,
    pub subject: ResourceReference,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reason_reference: Vec<ResourceReference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub id: String,
    pub meta: Meta,
    pub code: CodeableConcept,
    pub subject: ResourceReference,
    /// Supporting evidence references (flattened from FHIR evidence.detail).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<ResourceReference>,
}

/// A validated portal resource. Construction goes through the
/// `ResourceValidator`; a value of this type has passed structural and
/// coding checks (reference resolution is tracked per reference).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resourceType")]
pub enum Resource {
    Patient(Patient),
    Observation(Observation),
    MedicationRequest(MedicationRequest),
    Condition(Condition),
}

impl Resource {
    pub fn resource_type(&self) -> ResourceType {
        match self {
            Resource::Patient(_) => ResourceType::Patient,
            Resource::Observation(_) => ResourceType::Observation,
            Resource::MedicationRequest(_) => ResourceType::MedicationRequest,
            Resource::Condition(_) => ResourceType::Condition,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Resource::Patient(p) => &p.id,
            Resource::Observation(o) => &o.id,
            Resource::MedicationRequest(m) => &m.id,
            Resource::Condition(c) => &c.id,
        }
    }

    pub fn meta(&self) -> &Meta {
        match self {
            Resource::Patient(p) => &p.meta,
            Resource::Observation(o) => &o.meta,
            Resource::MedicationRequest(m) => &m.meta,
            Resource::Condition(c) => &c.meta,
        }
    }

    pub fn meta_mut(&mut self) -> &mut Meta {
        match self {
            Resource::Patient(p) => &mut p.meta,
            Resource::Observation(o) => &mut o.meta,
            Resource::MedicationRequest(m) => &mut m.meta,
            Resource::Condition(c) => &mut c.meta,
        }
    }

    /// Every outgoing reference, paired with the field path it lives at.
    pub fn references(&self) -> Vec<(String, &ResourceReference)> {
        let mut refs = Vec::new();
        match self {
            Resource::Patient(_) => {}
            Resource::Observation(o) => {
                refs.push(("subject".to_string(), &o.subject));
                for (i, r) in o.focus.iter().enumerate() {
                    refs.push((format!("focus[{i}]"), r));
                }
            }
            Resource::MedicationRequest(m) => {
                refs.push(("subject".to_string(), &m.subject));
                for (i, r) in m.reason_reference.iter().enumerate() {
                    refs.push((format!("reasonReference[{i}]"), r));
                }
            }
            Resource::Condition(c) => {
                refs.push(("subject".to_string(), &c.subject));
                for (i, r) in c.evidence.iter().enumerate() {
                    refs.push((format!("evidence[{i}]"), r));
                }
            }
        }
        refs
    }

    pub fn references_mut(&mut self) -> Vec<&mut ResourceReference> {
        let mut refs = Vec::new();
        match self {
            Resource::Patient(_) => {}
            Resource::Observation(o) => {
                refs.push(&mut o.subject);
                refs.extend(o.focus.iter_mut());
            }
            Resource::MedicationRequest(m) => {
                refs.push(&mut m.subject);
                refs.extend(m.reason_reference.iter_mut());
            }
            Resource::Condition(c) => {
                refs.push(&mut c.subject);
                refs.extend(c.evidence.iter_mut());
            }
        }
        refs
    }

    pub fn all_references_resolved(&self) -> bool {
        self.references().iter().all(|(_, r)| r.resolved)
    }

    /// Canonical JSON form (includes the `resourceType` discriminator).
    pub fn to_json(&self) -> crate::error::Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reference_parses_fhir_reference_string() {
        let r = ResourceReference::from_json(&json!({"reference": "Patient/123"})).unwrap();
        assert_eq!(r.target_type, ResourceType::Patient);
        assert_eq!(r.target_id, "123");
        assert!(!r.resolved);
    }

    #[test]
    fn reference_parses_explicit_target_fields() {
        let r = ResourceReference::from_json(&json!({
            "targetType": "Condition",
            "targetId": "c-9"
        }))
        .unwrap();
        assert_eq!(r.fhir_reference(), "Condition/c-9");
    }

    #[test]
    fn reference_rejects_contained_and_absolute_forms() {
        assert!(ResourceReference::from_json(&json!({"reference": "#local"})).is_none());
        assert!(
            ResourceReference::from_json(&json!({"reference": "urn:uuid:abc"})).is_none()
        );
        assert!(
            ResourceReference::from_json(&json!({"reference": "https://x/Patient/1"})).is_none()
        );
        assert!(ResourceReference::from_json(&json!({"reference": "Practitioner/1"})).is_none());
    }

    #[test]
    fn meta_versioning_increments() {
        let m = Meta::initial();
        assert_eq!(m.version_id, 1);
        assert_eq!(m.next().version_id, 2);
    }

    #[test]
    fn resource_enum_round_trips_with_resource_type_tag() {
        let obs = Resource::Observation(Observation {
            id: "o1".into(),
            meta: Meta::initial(),
            status: "final".into(),
            code: CodeableConcept::from_coding(Coding::new("http://loinc.org", "8302-2")),
            subject: ResourceReference::unresolved(ResourceType::Patient, "123"),
            value_quantity: None,
            focus: Vec::new(),
        });
        let value = obs.to_json().unwrap();
        assert_eq!(value["resourceType"], "Observation");
        let back: Resource = serde_json::from_value(value).unwrap();
        assert_eq!(back.resource_type(), ResourceType::Observation);
        assert_eq!(back.id(), "o1");
    }
}
