use std::sync::Arc;

use fhir_portal_core::*;
use serde_json::json;

fn validator() -> ResourceValidator {
    ResourceValidator::new(Arc::new(CodeSystemRegistry::r4_default()))
}

fn kinds(outcome: &ValidationOutcome) -> Vec<IssueKind> {
    outcome.issues().iter().map(|i| i.kind).collect()
}

#[test]
fn fully_valid_observation_has_zero_errors() {
    let outcome = validator().validate(
        ResourceType::Observation,
        &json!({
            "resourceType": "Observation",
            "id": "bp-1",
            "status": "final",
            "code": {"coding": [{"system": "http://loinc.org", "code": "8302-2", "display": "Body height"}]},
            "subject": {"reference": "Patient/123"},
            "valueQuantity": {"value": 177.8, "unit": "cm", "system": "http://unitsofmeasure.org", "code": "cm"},
        }),
    );
    assert!(outcome.is_valid(), "issues: {:?}", outcome.issues());

    let resource = outcome.into_resource().unwrap();
    let Resource::Observation(obs) = resource else {
        panic!("expected Observation");
    };
    assert_eq!(obs.id, "bp-1");
    assert_eq!(obs.status, "final");
    assert_eq!(obs.subject.target_id, "123");
    assert!(!obs.subject.resolved, "references start unresolved");
}

#[test]
fn missing_required_field_yields_exactly_one_error_naming_it() {
    let outcome = validator().validate(
        ResourceType::Observation,
        &json!({
            "resourceType": "Observation",
            "code": {"coding": [{"system": "http://loinc.org", "code": "8302-2"}]},
            "subject": {"reference": "Patient/123"},
        }),
    );
    assert!(!outcome.is_valid());
    let status_issues: Vec<_> = outcome
        .issues()
        .iter()
        .filter(|i| i.path == "status")
        .collect();
    assert_eq!(status_issues.len(), 1);
    assert_eq!(status_issues[0].kind, IssueKind::MissingField);
}

#[test]
fn one_pass_reports_every_defect() {
    let outcome = validator().validate(
        ResourceType::Observation,
        &json!({
            // status missing; code bound to an unknown system; bad quantity.
            "code": {"coding": [{"system": "http://example.com/homegrown", "code": "X1"}]},
            "subject": {"reference": "Patient/123"},
            "valueQuantity": {"value": 5, "system": "http://unitsofmeasure.org"},
        }),
    );
    let kinds = kinds(&outcome);
    assert!(kinds.contains(&IssueKind::MissingField), "{kinds:?}");
    assert!(kinds.contains(&IssueKind::InvalidCode), "{kinds:?}");
    assert!(kinds.contains(&IssueKind::InvalidUnit), "{kinds:?}");
}

#[test]
fn unknown_system_is_its_own_issue_kind() {
    let mut registry = CodeSystemRegistry::new();
    registry.register_unit_system("http://unitsofmeasure.org");
    let validator = ResourceValidator::new(Arc::new(registry));

    let outcome = validator.validate(
        ResourceType::Condition,
        &json!({
            "code": {"coding": [{"system": "http://snomed.info/sct", "code": "44054006"}]},
            "subject": {"reference": "Patient/123"},
        }),
    );
    // The binding allows SNOMED, but this registry never registered it.
    assert_eq!(kinds(&outcome), vec![IssueKind::UnknownSystem]);
}

#[test]
fn code_outside_system_syntax_is_invalid() {
    let outcome = validator().validate(
        ResourceType::Condition,
        &json!({
            "code": {"coding": [{"system": "http://snomed.info/sct", "code": "not-a-sctid"}]},
            "subject": {"reference": "Patient/123"},
        }),
    );
    assert_eq!(kinds(&outcome), vec![IssueKind::InvalidCode]);
    assert_eq!(outcome.issues()[0].path, "code.coding[0]");
}

#[test]
fn binding_rejects_wrong_system() {
    // RxNorm coding on an Observation.code (LOINC-bound field).
    let outcome = validator().validate(
        ResourceType::Observation,
        &json!({
            "status": "final",
            "code": {"coding": [{"system": "http://www.nlm.nih.gov/research/umls/rxnorm", "code": "197361"}]},
            "subject": {"reference": "Patient/123"},
        }),
    );
    assert_eq!(kinds(&outcome), vec![IssueKind::InvalidCode]);
}

#[test]
fn status_outside_value_set_is_invalid() {
    let outcome = validator().validate(
        ResourceType::Observation,
        &json!({
            "status": "finished",
            "code": {"coding": [{"system": "http://loinc.org", "code": "8302-2"}]},
            "subject": {"reference": "Patient/123"},
        }),
    );
    assert_eq!(kinds(&outcome), vec![IssueKind::InvalidValue]);
    assert_eq!(outcome.issues()[0].path, "status");
}

#[test]
fn quantity_with_unrecognized_unit_system_is_not_coerced() {
    let outcome = validator().validate(
        ResourceType::Observation,
        &json!({
            "status": "final",
            "code": {"coding": [{"system": "http://loinc.org", "code": "8302-2"}]},
            "subject": {"reference": "Patient/123"},
            "valueQuantity": {"value": 70.0, "unit": "kg", "system": "http://example.com/units", "code": "kg"},
        }),
    );
    assert_eq!(kinds(&outcome), vec![IssueKind::InvalidUnit]);
    assert_eq!(outcome.issues()[0].path, "valueQuantity");
}

#[test]
fn subject_must_reference_a_patient() {
    let outcome = validator().validate(
        ResourceType::Observation,
        &json!({
            "status": "final",
            "code": {"coding": [{"system": "http://loinc.org", "code": "8302-2"}]},
            "subject": {"reference": "Condition/c1"},
        }),
    );
    assert_eq!(kinds(&outcome), vec![IssueKind::InvalidValue]);
    assert_eq!(outcome.issues()[0].path, "subject");
}

#[test]
fn medication_request_requires_intent_and_rxnorm_binding() {
    let outcome = validator().validate(
        ResourceType::MedicationRequest,
        &json!({
            "status": "active",
            "intent": "order",
            "medicationCodeableConcept": {"coding": [{"system": "http://www.nlm.nih.gov/research/umls/rxnorm", "code": "197361"}]},
            "subject": {"reference": "Patient/123"},
        }),
    );
    assert!(outcome.is_valid(), "issues: {:?}", outcome.issues());

    let outcome = validator().validate(
        ResourceType::MedicationRequest,
        &json!({
            "status": "active",
            "medicationCodeableConcept": {"coding": [{"system": "http://www.nlm.nih.gov/research/umls/rxnorm", "code": "197361"}]},
            "subject": {"reference": "Patient/123"},
        }),
    );
    assert_eq!(outcome.issues()[0].path, "intent");
    assert_eq!(outcome.issues()[0].kind, IssueKind::MissingField);
}

#[test]
fn patient_with_no_fields_is_schema_valid() {
    let outcome = validator().validate(ResourceType::Patient, &json!({"resourceType": "Patient"}));
    assert!(outcome.is_valid());
}

#[test]
fn patient_address_round_trips() {
    let outcome = validator().validate(
        ResourceType::Patient,
        &json!({
            "resourceType": "Patient",
            "id": "p1",
            "address": [{
                "use": "home",
                "line": ["123 Main St", "Apt 4"],
                "city": "Springfield",
                "state": "IL",
                "postalCode": "62701",
                "country": "US",
            }],
        }),
    );
    assert!(outcome.is_valid(), "issues: {:?}", outcome.issues());

    let Resource::Patient(patient) = outcome.into_resource().unwrap() else {
        panic!("expected Patient");
    };
    assert_eq!(patient.address.len(), 1);
    assert_eq!(patient.address[0].city.as_deref(), Some("Springfield"));
    assert_eq!(patient.address[0].line, vec!["123 Main St", "Apt 4"]);
    assert_eq!(patient.address[0].postal_code.as_deref(), Some("62701"));

    // Serialized form keeps the FHIR field names.
    let body = Resource::Patient(patient).to_json().unwrap();
    assert_eq!(body["address"][0]["postalCode"], "62701");
}

#[test]
fn malformed_address_entry_is_reported() {
    let outcome = validator().validate(
        ResourceType::Patient,
        &json!({"address": ["not-an-object"]}),
    );
    assert_eq!(kinds(&outcome), vec![IssueKind::MalformedField]);
    assert_eq!(outcome.issues()[0].path, "address[0]");
}

#[test]
fn patient_gender_outside_value_set_is_invalid() {
    let outcome = validator().validate(
        ResourceType::Patient,
        &json!({"gender": "M", "birthDate": "1984-03-14"}),
    );
    assert_eq!(kinds(&outcome), vec![IssueKind::InvalidValue]);
    assert_eq!(outcome.issues()[0].path, "gender");
}

#[test]
fn declared_resource_type_mismatch_is_reported() {
    let outcome = validator().validate(
        ResourceType::Patient,
        &json!({"resourceType": "Observation"}),
    );
    assert_eq!(outcome.issues()[0].path, "resourceType");
}

#[test]
fn bare_system_code_shorthand_is_accepted() {
    // Shorthand shape: code as a bare {system, code} object.
    let outcome = validator().validate(
        ResourceType::Observation,
        &json!({
            "resourceType": "Observation",
            "status": "final",
            "code": {"system": "http://loinc.org", "code": "8302-2"},
            "subject": {"targetType": "Patient", "targetId": "123"},
        }),
    );
    assert!(outcome.is_valid(), "issues: {:?}", outcome.issues());
}
