//! Static per-type schema tables driving structural validation.
//!
//! Each supported resource type has a fixed table of known fields: whether
//! the field is required, whether it repeats, and how its value is checked
//! (value-set-bound code, terminology-bound CodeableConcept, reference
//! target types, quantity, and so on).

use crate::resource::ResourceType;
use crate::terminology::systems;

/// FHIR R4 `observation-status` value set.
pub const OBSERVATION_STATUS: &[&str] = &[
    "registered",
    "preliminary",
    "final",
    "amended",
    "corrected",
    "cancelled",
    "entered-in-error",
    "unknown",
];

/// FHIR R4 `medicationrequest-status` value set.
pub const MEDICATION_REQUEST_STATUS: &[&str] = &[
    "active",
    "on-hold",
    "cancelled",
    "completed",
    "entered-in-error",
    "stopped",
    "draft",
    "unknown",
];

/// FHIR R4 `medicationrequest-intent` value set.
pub const MEDICATION_REQUEST_INTENT: &[&str] = &[
    "proposal",
    "plan",
    "order",
    "original-order",
    "reflex-order",
    "filler-order",
    "instance-order",
    "option",
];

/// FHIR R4 `administrative-gender` value set.
pub const ADMINISTRATIVE_GENDER: &[&str] = &["male", "female", "other", "unknown"];

/// How a field's value is validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// `code`-typed scalar constrained to a fixed value set.
    Code(&'static [&'static str]),
    /// CodeableConcept whose codings must bind to one of the listed
    /// systems. An empty list means any registered system is acceptable.
    CodeableConcept(&'static [&'static str]),
    /// Reference constrained to the listed target types. An empty list
    /// means any supported resource type.
    Reference(&'static [ResourceType]),
    Quantity,
    Date,
    HumanName,
    Identifier,
    ContactPoint,
    Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub repeating: bool,
}

impl FieldDef {
    const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: true,
            repeating: false,
        }
    }

    const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
            repeating: false,
        }
    }

    const fn repeating(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
            repeating: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ResourceSchema {
    pub resource_type: ResourceType,
    pub fields: &'static [FieldDef],
}

const PATIENT_FIELDS: &[FieldDef] = &[
    FieldDef::repeating("identifier", FieldKind::Identifier),
    FieldDef::repeating("name", FieldKind::HumanName),
    FieldDef::repeating("telecom", FieldKind::ContactPoint),
    FieldDef::repeating("address", FieldKind::Address),
    FieldDef::optional("gender", FieldKind::Code(ADMINISTRATIVE_GENDER)),
    FieldDef::optional("birthDate", FieldKind::Date),
];

const OBSERVATION_FIELDS: &[FieldDef] = &[
    FieldDef::required("status", FieldKind::Code(OBSERVATION_STATUS)),
    FieldDef::required("code", FieldKind::CodeableConcept(&[systems::LOINC])),
    FieldDef::required("subject", FieldKind::Reference(&[ResourceType::Patient])),
    FieldDef::optional("valueQuantity", FieldKind::Quantity),
    FieldDef::repeating("focus", FieldKind::Reference(&[])),
];

const MEDICATION_REQUEST_FIELDS: &[FieldDef] = &[
    FieldDef::required("status", FieldKind::Code(MEDICATION_REQUEST_STATUS)),
    FieldDef::required("intent", FieldKind::Code(MEDICATION_REQUEST_INTENT)),
    FieldDef::required(
        "medicationCodeableConcept",
        FieldKind::CodeableConcept(&[systems::RXNORM]),
    ),
    FieldDef::required("subject", FieldKind::Reference(&[ResourceType::Patient])),
    FieldDef::repeating(
        "reasonReference",
        FieldKind::Reference(&[ResourceType::Condition]),
    ),
];

const CONDITION_FIELDS: &[FieldDef] = &[
    FieldDef::required(
        "code",
        FieldKind::CodeableConcept(&[
            systems::ICD10_CM,
            systems::ICD10,
            systems::SNOMED_CT,
        ]),
    ),
    FieldDef::required("subject", FieldKind::Reference(&[ResourceType::Patient])),
    FieldDef::repeating("evidence", FieldKind::Reference(&[])),
];

/// The fixed schema table for a resource type.
pub fn schema_for(resource_type: ResourceType) -> ResourceSchema {
    let fields = match resource_type {
        ResourceType::Patient => PATIENT_FIELDS,
        ResourceType::Observation => OBSERVATION_FIELDS,
        ResourceType::MedicationRequest => MEDICATION_REQUEST_FIELDS,
        ResourceType::Condition => CONDITION_FIELDS,
    };
    ResourceSchema {
        resource_type,
        fields,
    }
}
