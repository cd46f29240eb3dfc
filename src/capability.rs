//! CapabilityStatement generation.
//!
//! Describes the portal's FHIR surface (R4, JSON, the four supported
//! resources and their interactions/search parameters) for the `/metadata`
//! endpoint the routing layer serves.

use chrono::Utc;
use serde_json::{Value, json};

use crate::resource::ResourceType;

pub const FHIR_VERSION: &str = "4.0.1";
pub const SOFTWARE_NAME: &str = "FHIR Patient Portal";
pub const SOFTWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

fn patient_search_params() -> Value {
    json!([
        {"name": "name", "type": "string", "documentation": "Search by patient name (family or given)"},
        {"name": "birthdate", "type": "date", "documentation": "Search by birth date"},
        {"name": "gender", "type": "token", "documentation": "Search by gender"},
        {"name": "identifier", "type": "token", "documentation": "Search by identifier (e.g., MRN)"},
        {"name": "_count", "type": "number", "documentation": "Number of results per page"},
        {"name": "_offset", "type": "number", "documentation": "Pagination offset"},
    ])
}

fn resource_entry(resource_type: ResourceType) -> Value {
    let mut entry = json!({
        "type": resource_type.as_str(),
        "profile": format!("http://hl7.org/fhir/StructureDefinition/{resource_type}"),
        "interaction": [
            {"code": "read"},
            {"code": "create"},
            {"code": "update"},
            {"code": "delete"},
            {"code": "search-type"},
        ],
    });
    if resource_type == ResourceType::Patient {
        entry["searchParam"] = patient_search_params();
    }
    entry
}

/// The server CapabilityStatement as FHIR JSON.
pub fn capability_statement(implementation_url: &str) -> Value {
    let resources: Vec<Value> = ResourceType::ALL.iter().copied().map(resource_entry).collect();
    json!({
        "resourceType": "CapabilityStatement",
        "status": "active",
        "date": Utc::now().to_rfc3339(),
        "kind": "instance",
        "fhirVersion": FHIR_VERSION,
        "format": ["application/fhir+json"],
        "software": {
            "name": SOFTWARE_NAME,
            "version": SOFTWARE_VERSION,
        },
        "implementation": {
            "description": "A FHIR R4-compliant patient portal API",
            "url": implementation_url,
        },
        "rest": [{
            "mode": "server",
            "resource": resources,
        }],
    })
}
