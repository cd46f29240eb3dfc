//! Structural and terminology validation of portal resources.
//!
//! Validation is all-or-nothing per resource: a single pass reports every
//! defect rather than short-circuiting on the first, and only a defect-free
//! resource is lifted into the typed [`Resource`] model. References are
//! constructed unresolved here; resolution is the reference resolver's job,
//! so a resource can be schema-valid before its references exist (e.g. in a
//! transactional bundle).

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::Value;
use tracing::debug;

use crate::resource::schema::{FieldDef, FieldKind, schema_for};
use crate::resource::{
    Address, CodeableConcept, Coding, Condition, ContactPoint, HumanName, Identifier,
    MedicationRequest, Meta, Observation, Patient, Quantity, Resource, ResourceReference,
    ResourceType,
};
use crate::terminology::CodeSystemRegistry;

/// Classification of a single validation defect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssueKind {
    /// A required field is absent.
    MissingField,
    /// A coded value names a system the registry does not know.
    UnknownSystem,
    /// A code fails its system's syntax rules or binding.
    InvalidCode,
    /// A coding carries an empty `code`; invalid regardless of optionality.
    EmptyCode,
    /// A quantity without a recognized unit system, or with a bad unit code.
    InvalidUnit,
    /// A scalar outside its value set, or a reference to a wrong target type.
    InvalidValue,
    /// A field whose JSON shape cannot be interpreted at all.
    MalformedField,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::MissingField => "missing-field",
            IssueKind::UnknownSystem => "unknown-system",
            IssueKind::InvalidCode => "invalid-code",
            IssueKind::EmptyCode => "empty-code",
            IssueKind::InvalidUnit => "invalid-unit",
            IssueKind::InvalidValue => "invalid-value",
            IssueKind::MalformedField => "malformed-field",
        }
    }
}

/// One validation defect, located by a dotted field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub path: String,
    pub kind: IssueKind,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Outcome of validating one resource: a typed resource, or the ordered,
/// de-duplicated list of everything wrong with it. Never partially valid.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    Valid(Resource),
    Invalid(Vec<ValidationIssue>),
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid(_))
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            ValidationOutcome::Valid(_) => &[],
            ValidationOutcome::Invalid(issues) => issues,
        }
    }

    pub fn into_resource(self) -> Result<Resource, Vec<ValidationIssue>> {
        match self {
            ValidationOutcome::Valid(resource) => Ok(resource),
            ValidationOutcome::Invalid(issues) => Err(issues),
        }
    }
}

/// Mutable state threaded through one validation pass: the current field
/// path and the issues collected so far.
#[derive(Debug, Default)]
struct ValidationContext {
    current_path: String,
    path_stack: Vec<String>,
    issues: Vec<ValidationIssue>,
}

impl ValidationContext {
    fn push_path(&mut self, segment: &str) {
        self.path_stack.push(self.current_path.clone());
        if self.current_path.is_empty() {
            self.current_path = segment.to_string();
        } else {
            self.current_path = format!("{}.{}", self.current_path, segment);
        }
    }

    fn pop_path(&mut self) {
        if let Some(previous) = self.path_stack.pop() {
            self.current_path = previous;
        }
    }

    fn add_issue(&mut self, kind: IssueKind, message: impl Into<String>) {
        self.issues
            .push(ValidationIssue::new(self.current_path.clone(), kind, message));
    }

    /// Ordered issues with duplicates at the same path dropped, first
    /// occurrence kept.
    fn into_issues(self) -> Vec<ValidationIssue> {
        let mut seen = HashSet::new();
        self.issues
            .into_iter()
            .filter(|issue| seen.insert((issue.path.clone(), issue.kind)))
            .collect()
    }
}

/// Validates raw FHIR JSON against the per-type schema tables and the code
/// system registry. Stateless apart from the injected registry; safe to
/// share and call concurrently.
#[derive(Debug, Clone)]
pub struct ResourceValidator {
    registry: Arc<CodeSystemRegistry>,
}

impl ResourceValidator {
    pub fn new(registry: Arc<CodeSystemRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &CodeSystemRegistry {
        &self.registry
    }

    /// Validates `raw` as a resource of `resource_type`.
    pub fn validate(&self, resource_type: ResourceType, raw: &Value) -> ValidationOutcome {
        let mut ctx = ValidationContext::default();

        let Some(body) = raw.as_object() else {
            ctx.add_issue(IssueKind::MalformedField, "resource must be a JSON object");
            return ValidationOutcome::Invalid(ctx.into_issues());
        };

        if let Some(declared) = body.get("resourceType").and_then(Value::as_str) {
            if declared != resource_type.as_str() {
                ctx.push_path("resourceType");
                ctx.add_issue(
                    IssueKind::InvalidValue,
                    format!(
                        "declared resourceType '{declared}' does not match '{resource_type}'"
                    ),
                );
                ctx.pop_path();
            }
        }

        let schema = schema_for(resource_type);
        for field in schema.fields {
            match body.get(field.name) {
                None | Some(Value::Null) => {
                    if field.required {
                        ctx.push_path(field.name);
                        ctx.add_issue(
                            IssueKind::MissingField,
                            format!("required field '{}' is missing", field.name),
                        );
                        ctx.pop_path();
                    }
                }
                Some(value) => self.check_field(field, value, &mut ctx),
            }
        }

        let issues = ctx.into_issues();
        if !issues.is_empty() {
            debug!(
                resource_type = %resource_type,
                issue_count = issues.len(),
                "resource failed validation"
            );
            return ValidationOutcome::Invalid(issues);
        }

        match build_resource(resource_type, body) {
            Ok(resource) => ValidationOutcome::Valid(resource),
            Err(issue) => ValidationOutcome::Invalid(vec![issue]),
        }
    }

    fn check_field(&self, field: &FieldDef, value: &Value, ctx: &mut ValidationContext) {
        if field.repeating {
            let Some(items) = value.as_array() else {
                ctx.push_path(field.name);
                ctx.add_issue(
                    IssueKind::MalformedField,
                    format!("field '{}' must be an array", field.name),
                );
                ctx.pop_path();
                return;
            };
            for (i, item) in items.iter().enumerate() {
                ctx.push_path(&format!("{}[{i}]", field.name));
                self.check_single(field.kind, item, ctx);
                ctx.pop_path();
            }
        } else {
            ctx.push_path(field.name);
            self.check_single(field.kind, value, ctx);
            ctx.pop_path();
        }
    }

    fn check_single(&self, kind: FieldKind, value: &Value, ctx: &mut ValidationContext) {
        match kind {
            FieldKind::Code(value_set) => self.check_code_scalar(value_set, value, ctx),
            FieldKind::CodeableConcept(bindings) => self.check_concept(bindings, value, ctx),
            FieldKind::Reference(targets) => check_reference(targets, value, ctx),
            FieldKind::Quantity => self.check_quantity(value, ctx),
            FieldKind::Date => check_date(value, ctx),
            FieldKind::HumanName => check_human_name(value, ctx),
            FieldKind::Identifier => check_identifier(value, ctx),
            FieldKind::ContactPoint => check_contact_point(value, ctx),
            FieldKind::Address => check_address(value, ctx),
        }
    }

    fn check_code_scalar(&self, value_set: &[&str], value: &Value, ctx: &mut ValidationContext) {
        let Some(code) = value.as_str() else {
            ctx.add_issue(IssueKind::MalformedField, "code field must be a string");
            return;
        };
        if code.is_empty() {
            ctx.add_issue(IssueKind::EmptyCode, "code must not be empty");
            return;
        }
        if !value_set.contains(&code) {
            ctx.add_issue(
                IssueKind::InvalidValue,
                format!(
                    "'{}' is not in the value set [{}]",
                    code,
                    value_set.join(", ")
                ),
            );
        }
    }

    fn check_concept(&self, bindings: &[&str], value: &Value, ctx: &mut ValidationContext) {
        let Some(concept) = value.as_object() else {
            ctx.add_issue(
                IssueKind::MalformedField,
                "CodeableConcept must be a JSON object",
            );
            return;
        };

        // Bare `{system, code}` shorthand is accepted as a single coding.
        let codings: Vec<&Value> = match concept.get("coding") {
            Some(Value::Array(items)) => items.iter().collect(),
            Some(_) => {
                ctx.add_issue(IssueKind::MalformedField, "'coding' must be an array");
                return;
            }
            None if concept.contains_key("system") || concept.contains_key("code") => {
                vec![value]
            }
            // An empty coding list is valid for an optional field; required
            // presence was already handled by the schema pass.
            None => Vec::new(),
        };

        for (i, coding) in codings.into_iter().enumerate() {
            ctx.push_path(&format!("coding[{i}]"));
            self.check_coding(bindings, coding, ctx);
            ctx.pop_path();
        }
    }

    fn check_coding(&self, bindings: &[&str], value: &Value, ctx: &mut ValidationContext) {
        let system = value.get("system").and_then(Value::as_str);
        let code = value.get("code").and_then(Value::as_str);

        let Some(code) = code else {
            ctx.add_issue(IssueKind::MalformedField, "coding is missing 'code'");
            return;
        };
        // An empty code is always invalid, regardless of field optionality.
        if code.is_empty() {
            ctx.add_issue(IssueKind::EmptyCode, "coding has an empty 'code'");
            return;
        }
        let Some(system) = system else {
            ctx.add_issue(IssueKind::MalformedField, "coding is missing 'system'");
            return;
        };

        if !bindings.is_empty() && !bindings.contains(&system) {
            ctx.add_issue(
                IssueKind::InvalidCode,
                format!(
                    "system '{}' is not an allowed binding (expected one of [{}])",
                    system,
                    bindings.join(", ")
                ),
            );
            return;
        }

        match self.registry.validate(system, code) {
            Ok(true) => {}
            Ok(false) => ctx.add_issue(
                IssueKind::InvalidCode,
                format!("'{code}' is not a valid {system} code"),
            ),
            Err(err) => ctx.add_issue(IssueKind::UnknownSystem, err.to_string()),
        }
    }

    fn check_quantity(&self, value: &Value, ctx: &mut ValidationContext) {
        let Some(quantity) = value.as_object() else {
            ctx.add_issue(IssueKind::MalformedField, "Quantity must be a JSON object");
            return;
        };

        if !quantity.get("value").is_some_and(Value::is_number) {
            ctx.add_issue(
                IssueKind::MalformedField,
                "Quantity requires a numeric 'value'",
            );
        }

        // Units are never coerced: a quantity must name a recognized unit
        // system and a unit code valid under it.
        let system = quantity.get("system").and_then(Value::as_str);
        let unit_code = quantity
            .get("code")
            .and_then(Value::as_str)
            .or_else(|| quantity.get("unit").and_then(Value::as_str));

        let Some(system) = system else {
            ctx.add_issue(
                IssueKind::InvalidUnit,
                "quantity must declare a unit system",
            );
            return;
        };
        if !self.registry.is_unit_system(system) {
            ctx.add_issue(
                IssueKind::InvalidUnit,
                format!("'{system}' is not a recognized unit system"),
            );
            return;
        }
        let Some(unit_code) = unit_code else {
            ctx.add_issue(
                IssueKind::InvalidUnit,
                "quantity must carry a unit code",
            );
            return;
        };
        match self.registry.validate(system, unit_code) {
            Ok(true) => {}
            Ok(false) => ctx.add_issue(
                IssueKind::InvalidUnit,
                format!("'{unit_code}' is not a valid unit in {system}"),
            ),
            Err(err) => ctx.add_issue(IssueKind::UnknownSystem, err.to_string()),
        }
    }
}

fn check_reference(targets: &[ResourceType], value: &Value, ctx: &mut ValidationContext) {
    let Some(reference) = ResourceReference::from_json(value) else {
        ctx.add_issue(
            IssueKind::MalformedField,
            "reference must be 'ResourceType/id' over the supported types",
        );
        return;
    };
    if !targets.is_empty() && !targets.contains(&reference.target_type) {
        ctx.add_issue(
            IssueKind::InvalidValue,
            format!(
                "reference to {} not allowed here (expected one of [{}])",
                reference.target_type,
                targets
                    .iter()
                    .map(|t| t.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        );
    }
}

fn check_date(value: &Value, ctx: &mut ValidationContext) {
    let Some(text) = value.as_str() else {
        ctx.add_issue(IssueKind::MalformedField, "date must be a string");
        return;
    };
    if NaiveDate::parse_from_str(text, "%Y-%m-%d").is_err() {
        ctx.add_issue(
            IssueKind::InvalidValue,
            format!("'{text}' is not a valid YYYY-MM-DD date"),
        );
    }
}

fn check_human_name(value: &Value, ctx: &mut ValidationContext) {
    if !value.is_object() {
        ctx.add_issue(IssueKind::MalformedField, "name entry must be an object");
    }
}

fn check_identifier(value: &Value, ctx: &mut ValidationContext) {
    let Some(identifier) = value.as_object() else {
        ctx.add_issue(IssueKind::MalformedField, "identifier must be an object");
        return;
    };
    match identifier.get("value").and_then(Value::as_str) {
        Some(v) if !v.is_empty() => {}
        _ => ctx.add_issue(
            IssueKind::MalformedField,
            "identifier requires a non-empty 'value'",
        ),
    }
}

fn check_contact_point(value: &Value, ctx: &mut ValidationContext) {
    if !value.is_object() {
        ctx.add_issue(IssueKind::MalformedField, "telecom entry must be an object");
    }
}

fn check_address(value: &Value, ctx: &mut ValidationContext) {
    if !value.is_object() {
        ctx.add_issue(IssueKind::MalformedField, "address entry must be an object");
    }
}

// ---------------------------------------------------------------------------
// Lifting validated JSON into the typed model
// ---------------------------------------------------------------------------

fn malformed(path: &str, detail: impl std::fmt::Display) -> ValidationIssue {
    ValidationIssue::new(path, IssueKind::MalformedField, detail.to_string())
}

fn resource_id(body: &serde_json::Map<String, Value>) -> String {
    body.get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

fn resource_meta(body: &serde_json::Map<String, Value>) -> Meta {
    body.get("meta")
        .cloned()
        .and_then(|m| serde_json::from_value(m).ok())
        .unwrap_or_default()
}

fn concept_from(value: &Value) -> Option<CodeableConcept> {
    if value.get("coding").is_some() || value.get("text").is_some() {
        return serde_json::from_value(value.clone()).ok();
    }
    // Bare {system, code} shorthand.
    let coding: Coding = serde_json::from_value(value.clone()).ok()?;
    Some(CodeableConcept::from_coding(coding))
}

fn references_from(body: &serde_json::Map<String, Value>, field: &str) -> Vec<ResourceReference> {
    body.get(field)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(ResourceReference::from_json)
                .collect()
        })
        .unwrap_or_default()
}

fn build_resource(
    resource_type: ResourceType,
    body: &serde_json::Map<String, Value>,
) -> Result<Resource, ValidationIssue> {
    let id = resource_id(body);
    let meta = resource_meta(body);

    let resource = match resource_type {
        ResourceType::Patient => {
            let collect = |field: &str| -> Vec<Value> {
                body.get(field)
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default()
            };
            let identifier: Vec<Identifier> = collect("identifier")
                .into_iter()
                .filter_map(|v| serde_json::from_value(v).ok())
                .collect();
            let name: Vec<HumanName> = collect("name")
                .into_iter()
                .filter_map(|v| serde_json::from_value(v).ok())
                .collect();
            let telecom: Vec<ContactPoint> = collect("telecom")
                .into_iter()
                .filter_map(|v| serde_json::from_value(v).ok())
                .collect();
            let address: Vec<Address> = collect("address")
                .into_iter()
                .filter_map(|v| serde_json::from_value(v).ok())
                .collect();
            let birth_date = match body.get("birthDate").and_then(Value::as_str) {
                Some(text) => Some(
                    NaiveDate::from_str(text)
                        .map_err(|e| malformed("birthDate", e))?,
                ),
                None => None,
            };
            Resource::Patient(Patient {
                id,
                meta,
                identifier,
                name,
                telecom,
                address,
                gender: body
                    .get("gender")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                birth_date,
            })
        }
        ResourceType::Observation => {
            let status = body
                .get("status")
                .and_then(Value::as_str)
                .ok_or_else(|| malformed("status", "missing after validation"))?
                .to_string();
            let code = body
                .get("code")
                .and_then(concept_from)
                .ok_or_else(|| malformed("code", "unreadable CodeableConcept"))?;
            let subject = body
                .get("subject")
                .and_then(ResourceReference::from_json)
                .ok_or_else(|| malformed("subject", "unreadable reference"))?;
            let value_quantity: Option<Quantity> = body
                .get("valueQuantity")
                .cloned()
                .and_then(|v| serde_json::from_value(v).ok());
            Resource::Observation(Observation {
                id,
                meta,
                status,
                code,
                subject,
                value_quantity,
                focus: references_from(body, "focus"),
            })
        }
        ResourceType::MedicationRequest => {
            let status = body
                .get("status")
                .and_then(Value::as_str)
                .ok_or_else(|| malformed("status", "missing after validation"))?
                .to_string();
            let intent = body
                .get("intent")
                .and_then(Value::as_str)
                .ok_or_else(|| malformed("intent", "missing after validation"))?
                .to_string();
            let medication = body
                .get("medicationCodeableConcept")
                .and_then(concept_from)
                .ok_or_else(|| {
                    malformed("medicationCodeableConcept", "unreadable CodeableConcept")
                })?;
            let subject = body
                .get("subject")
                .and_then(ResourceReference::from_json)
                .ok_or_else(|| malformed("subject", "unreadable reference"))?;
            Resource::MedicationRequest(MedicationRequest {
                id,
                meta,
                status,
                intent,
                medication,
                subject,
                reason_reference: references_from(body, "reasonReference"),
            })
        }
        ResourceType::Condition => {
            let code = body
                .get("code")
                .and_then(concept_from)
                .ok_or_else(|| malformed("code", "unreadable CodeableConcept"))?;
            let subject = body
                .get("subject")
                .and_then(ResourceReference::from_json)
                .ok_or_else(|| malformed("subject", "unreadable reference"))?;
            Resource::Condition(Condition {
                id,
                meta,
                code,
                subject,
                evidence: references_from(body, "evidence"),
            })
        }
    };

    Ok(resource)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validator() -> ResourceValidator {
        ResourceValidator::new(Arc::new(CodeSystemRegistry::r4_default()))
    }

    #[test]
    fn duplicate_issues_at_same_path_keep_first() {
        let mut ctx = ValidationContext::default();
        ctx.push_path("code");
        ctx.add_issue(IssueKind::InvalidCode, "first");
        ctx.add_issue(IssueKind::InvalidCode, "second");
        ctx.add_issue(IssueKind::EmptyCode, "different kind survives");
        ctx.pop_path();

        let issues = ctx.into_issues();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].message, "first");
    }

    #[test]
    fn empty_coding_list_on_optional_field_is_valid() {
        let outcome = validator().validate(
            ResourceType::Condition,
            &json!({
                "resourceType": "Condition",
                "code": {"coding": [{"system": "http://hl7.org/fhir/sid/icd-10-cm", "code": "E11.9"}]},
                "subject": {"reference": "Patient/p1"},
            }),
        );
        assert!(outcome.is_valid(), "issues: {:?}", outcome.issues());
    }

    #[test]
    fn empty_code_is_always_invalid() {
        let outcome = validator().validate(
            ResourceType::Condition,
            &json!({
                "code": {"coding": [{"system": "http://snomed.info/sct", "code": ""}]},
                "subject": {"reference": "Patient/p1"},
            }),
        );
        assert!(!outcome.is_valid());
        assert_eq!(outcome.issues()[0].kind, IssueKind::EmptyCode);
    }
}
