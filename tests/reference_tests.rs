use std::sync::Arc;

use fhir_portal_core::*;
use serde_json::json;

fn validator() -> ResourceValidator {
    ResourceValidator::new(Arc::new(CodeSystemRegistry::r4_default()))
}

fn observation(id: &str, subject: &str, focus: &[&str]) -> Resource {
    let focus: Vec<_> = focus.iter().map(|f| json!({"reference": f})).collect();
    validator()
        .validate(
            ResourceType::Observation,
            &json!({
                "id": id,
                "status": "final",
                "code": {"coding": [{"system": "http://loinc.org", "code": "8302-2"}]},
                "subject": {"reference": subject},
                "focus": focus,
            }),
        )
        .into_resource()
        .expect("fixture must validate")
}

fn condition(id: &str, subject: &str, evidence: &[&str]) -> Resource {
    let evidence: Vec<_> = evidence.iter().map(|e| json!({"reference": e})).collect();
    validator()
        .validate(
            ResourceType::Condition,
            &json!({
                "id": id,
                "code": {"coding": [{"system": "http://hl7.org/fhir/sid/icd-10-cm", "code": "E11.9"}]},
                "subject": {"reference": subject},
                "evidence": evidence,
            }),
        )
        .into_resource()
        .expect("fixture must validate")
}

async fn store_with_patient(id: &str) -> MemoryStore {
    let store = MemoryStore::new();
    store
        .put(ResourceType::Patient, id, json!({"resourceType": "Patient", "id": id}))
        .await
        .unwrap();
    store
}

#[tokio::test]
async fn subject_resolves_against_the_store() {
    let store = store_with_patient("123").await;
    let resolver = ReferenceResolver::new();

    let obs = observation("o1", "Patient/123", &[]);
    let resolved = resolver
        .resolve(obs, &BundleIndex::new(), &store)
        .await
        .unwrap();

    let Resource::Observation(obs) = resolved else {
        panic!("expected Observation");
    };
    assert!(obs.subject.resolved);
}

#[tokio::test]
async fn unknown_target_rejects_the_resource() {
    let store = MemoryStore::new();
    let resolver = ReferenceResolver::new();

    let obs = observation("o1", "Patient/ghost", &[]);
    let err = resolver
        .resolve(obs, &BundleIndex::new(), &store)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ResolutionError::UnknownTarget {
            target_type: ResourceType::Patient,
            target_id: "ghost".into(),
        }
    );
}

#[tokio::test]
async fn in_bundle_references_resolve_before_the_store() {
    // Neither resource is persisted; the bundle index carries them.
    let store = store_with_patient("123").await;
    let resolver = ReferenceResolver::new();

    let obs = observation("o1", "Patient/123", &["Condition/c1"]);
    let cond = condition("c1", "Patient/123", &[]);

    let resolved = resolver
        .resolve_bundle(vec![obs, cond], &store)
        .await
        .unwrap();
    assert!(resolved.iter().all(Resource::all_references_resolved));
}

#[tokio::test]
async fn resolve_is_idempotent() {
    let store = store_with_patient("123").await;
    let resolver = ReferenceResolver::new();

    let obs = observation("o1", "Patient/123", &[]);
    let once = resolver
        .resolve(obs, &BundleIndex::new(), &store)
        .await
        .unwrap();
    // Second resolve over an already-resolved resource: identical result,
    // even with an empty store.
    let empty = MemoryStore::new();
    let twice = resolver
        .resolve(once.clone(), &BundleIndex::new(), &empty)
        .await
        .unwrap();
    assert_eq!(once, twice);
}

#[tokio::test]
async fn cycle_between_observation_and_condition_names_both_hops() {
    let store = store_with_patient("123").await;
    let resolver = ReferenceResolver::new();

    let obs = observation("A", "Patient/123", &["Condition/B"]);
    let cond = condition("B", "Patient/123", &["Observation/A"]);

    let err = resolver
        .resolve_bundle(vec![obs, cond], &store)
        .await
        .unwrap_err();
    let ResolutionError::CyclicReference { path } = err else {
        panic!("expected CyclicReference, got {err:?}");
    };
    assert!(path.contains("Observation/A"), "{path}");
    assert!(path.contains("Condition/B"), "{path}");
    // Full chain: the cycle closes back on its first hop.
    assert_eq!(path.matches("->").count(), 2, "{path}");
}

#[tokio::test]
async fn self_reference_is_a_cycle() {
    let store = store_with_patient("123").await;
    let resolver = ReferenceResolver::new();

    let obs = observation("A", "Patient/123", &["Observation/A"]);
    let err = resolver
        .resolve_bundle(vec![obs], &store)
        .await
        .unwrap_err();
    assert!(matches!(err, ResolutionError::CyclicReference { .. }));
}

#[tokio::test]
async fn acyclic_chains_across_a_bundle_are_fine() {
    let store = store_with_patient("123").await;
    let resolver = ReferenceResolver::new();

    // Observation -> Condition -> (persisted) Observation: directed, no cycle.
    store
        .put(
            ResourceType::Observation,
            "persisted",
            json!({"resourceType": "Observation", "id": "persisted"}),
        )
        .await
        .unwrap();
    let obs = observation("o1", "Patient/123", &["Condition/c1"]);
    let cond = condition("c1", "Patient/123", &["Observation/persisted"]);

    let resolved = resolver
        .resolve_bundle(vec![obs, cond], &store)
        .await
        .unwrap();
    assert_eq!(resolved.len(), 2);
}

#[tokio::test]
async fn portal_create_stamps_version_one() {
    let store = Arc::new(store_with_patient("123").await);
    let portal = PortalCore::new(Arc::new(CodeSystemRegistry::r4_default()), store.clone());

    let outcome = portal
        .create(
            ResourceType::Observation,
            &json!({
                "id": "o1",
                "status": "final",
                "code": {"coding": [{"system": "http://loinc.org", "code": "8302-2"}]},
                "subject": {"reference": "Patient/123"},
            }),
        )
        .await
        .unwrap();
    let resource = outcome.into_resource().unwrap();
    assert_eq!(resource.meta().version_id, 1);

    let stored = store
        .get(ResourceType::Observation, "o1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored["meta"]["versionId"], 1);
}

#[tokio::test]
async fn portal_update_increments_version_and_keeps_the_id() {
    let store = Arc::new(store_with_patient("123").await);
    let portal = PortalCore::new(Arc::new(CodeSystemRegistry::r4_default()), store.clone());

    let body = json!({
        "id": "o1",
        "status": "preliminary",
        "code": {"coding": [{"system": "http://loinc.org", "code": "8302-2"}]},
        "subject": {"reference": "Patient/123"},
    });
    portal
        .create(ResourceType::Observation, &body)
        .await
        .unwrap()
        .into_resource()
        .unwrap();

    let mut amended = body.clone();
    amended["status"] = json!("final");
    amended["id"] = json!("attempted-rename");
    let outcome = portal
        .update(ResourceType::Observation, "o1", &amended)
        .await
        .unwrap();
    let resource = outcome.into_resource().unwrap();
    assert_eq!(resource.id(), "o1");
    assert_eq!(resource.meta().version_id, 2);
}

#[tokio::test]
async fn portal_update_of_missing_resource_fails() {
    let store = Arc::new(MemoryStore::new());
    let portal = PortalCore::new(Arc::new(CodeSystemRegistry::r4_default()), store);
    let err = portal
        .update(ResourceType::Patient, "ghost", &json!({"resourceType": "Patient"}))
        .await
        .unwrap_err();
    assert!(matches!(err, FhirPortalError::Store { .. }));
}

#[tokio::test]
async fn bundle_submission_is_all_or_nothing() {
    let store = Arc::new(store_with_patient("123").await);
    let portal = PortalCore::new(Arc::new(CodeSystemRegistry::r4_default()), store.clone());

    // Second entry is invalid; nothing may be persisted.
    let outcome = portal
        .submit_bundle(vec![
            (
                ResourceType::Condition,
                json!({
                    "id": "c1",
                    "code": {"coding": [{"system": "http://hl7.org/fhir/sid/icd-10-cm", "code": "E11.9"}]},
                    "subject": {"reference": "Patient/123"},
                }),
            ),
            (ResourceType::Observation, json!({"id": "o1"})),
        ])
        .await
        .unwrap();
    let BundleOutcome::Rejected(rejections) = outcome else {
        panic!("expected rejection");
    };
    assert_eq!(rejections[0].0, 1);
    assert!(!store.exists(ResourceType::Condition, "c1").await.unwrap());

    // A clean bundle applies whole.
    let outcome = portal
        .submit_bundle(vec![(
            ResourceType::Condition,
            json!({
                "id": "c1",
                "code": {"coding": [{"system": "http://hl7.org/fhir/sid/icd-10-cm", "code": "E11.9"}]},
                "subject": {"reference": "Patient/123"},
            }),
        )])
        .await
        .unwrap();
    assert!(matches!(outcome, BundleOutcome::Applied(_)));
    assert!(store.exists(ResourceType::Condition, "c1").await.unwrap());
}
