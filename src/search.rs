//! FHIR search parameter model for Patient.
//!
//! Pure predicates over validated patients; the portal facade applies them
//! to whatever the store returns. Semantics follow the FHIR search
//! parameters the portal advertises in its CapabilityStatement: `name` is a
//! case-insensitive substring match over family and given names,
//! `identifier` accepts `system|value` or a bare value, `birthdate` and
//! `gender` match exactly.

use chrono::NaiveDate;
use serde_json::{Value, json};

use crate::resource::{Patient, Resource};

pub const DEFAULT_PAGE_SIZE: usize = 20;

#[derive(Debug, Clone, Default)]
pub struct PatientSearch {
    pub name: Option<String>,
    pub birthdate: Option<NaiveDate>,
    pub gender: Option<String>,
    pub identifier: Option<String>,
    pub count: Option<usize>,
    pub offset: usize,
}

impl PatientSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_birthdate(mut self, birthdate: NaiveDate) -> Self {
        self.birthdate = Some(birthdate);
        self
    }

    pub fn with_gender(mut self, gender: impl Into<String>) -> Self {
        self.gender = Some(gender.into());
        self
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn page(mut self, count: usize, offset: usize) -> Self {
        self.count = Some(count);
        self.offset = offset;
        self
    }

    /// Whether `patient` satisfies every present criterion.
    pub fn matches(&self, patient: &Patient) -> bool {
        if let Some(name) = &self.name {
            let needle = name.to_lowercase();
            let hit = patient.name.iter().any(|n| {
                n.family
                    .as_deref()
                    .is_some_and(|f| f.to_lowercase().contains(&needle))
                    || n.given
                        .iter()
                        .any(|g| g.to_lowercase().contains(&needle))
            });
            if !hit {
                return false;
            }
        }

        if let Some(birthdate) = self.birthdate {
            if patient.birth_date != Some(birthdate) {
                return false;
            }
        }

        if let Some(gender) = &self.gender {
            let hit = patient
                .gender
                .as_deref()
                .is_some_and(|g| g.eq_ignore_ascii_case(gender));
            if !hit {
                return false;
            }
        }

        if let Some(identifier) = &self.identifier {
            // Token search: `system|value` pins both, a bare value matches
            // any system.
            let (system, value) = match identifier.split_once('|') {
                Some((s, v)) => (Some(s), v),
                None => (None, identifier.as_str()),
            };
            let hit = patient.identifier.iter().any(|id| {
                id.value == value
                    && system.is_none_or(|s| id.system.as_deref() == Some(s))
            });
            if !hit {
                return false;
            }
        }

        true
    }

    /// Applies the predicate and pagination over a candidate list,
    /// returning (total matches, page).
    pub fn apply(&self, patients: Vec<Patient>) -> (usize, Vec<Patient>) {
        let matches: Vec<Patient> = patients
            .into_iter()
            .filter(|p| self.matches(p))
            .collect();
        let total = matches.len();
        let count = self.count.unwrap_or(DEFAULT_PAGE_SIZE);
        let page = matches
            .into_iter()
            .skip(self.offset)
            .take(count)
            .collect();
        (total, page)
    }
}

/// Assembles a FHIR `searchset` Bundle from a page of results.
pub fn searchset_bundle(total: usize, resources: &[Resource]) -> crate::error::Result<Value> {
    let mut entries = Vec::with_capacity(resources.len());
    for resource in resources {
        entries.push(json!({
            "fullUrl": format!("{}/{}", resource.resource_type(), resource.id()),
            "resource": resource.to_json()?,
            "search": {"mode": "match"},
        }));
    }
    Ok(json!({
        "resourceType": "Bundle",
        "type": "searchset",
        "total": total,
        "entry": entries,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{HumanName, Identifier, Meta};

    fn patient(family: &str, given: &str, gender: &str, mrn: &str) -> Patient {
        Patient {
            id: format!("{family}-{given}"),
            meta: Meta::initial(),
            identifier: vec![Identifier {
                system: Some("http://hospital.example.com/mrn".into()),
                value: mrn.into(),
            }],
            name: vec![HumanName {
                r#use: Some("official".into()),
                family: Some(family.into()),
                given: vec![given.into()],
            }],
            telecom: Vec::new(),
            address: Vec::new(),
            gender: Some(gender.into()),
            birth_date: NaiveDate::from_ymd_opt(1984, 3, 14),
        }
    }

    #[test]
    fn name_search_is_case_insensitive_substring() {
        let search = PatientSearch::new().with_name("gar");
        assert!(search.matches(&patient("Garcia", "Maria", "female", "MRN-1")));
        assert!(search.matches(&patient("Lee", "Edgar", "male", "MRN-2")));
        assert!(!search.matches(&patient("Smith", "John", "male", "MRN-3")));
    }

    #[test]
    fn identifier_search_splits_system_and_value() {
        let exact = PatientSearch::new()
            .with_identifier("http://hospital.example.com/mrn|MRN-1");
        assert!(exact.matches(&patient("Garcia", "Maria", "female", "MRN-1")));

        let wrong_system = PatientSearch::new().with_identifier("http://other|MRN-1");
        assert!(!wrong_system.matches(&patient("Garcia", "Maria", "female", "MRN-1")));

        let bare = PatientSearch::new().with_identifier("MRN-1");
        assert!(bare.matches(&patient("Garcia", "Maria", "female", "MRN-1")));
    }

    #[test]
    fn pagination() {
        let patients: Vec<Patient> = (0..7)
            .map(|i| patient(&format!("Fam{i}"), "Ann", "female", &format!("M{i}")))
            .collect();
        let search = PatientSearch::new().with_gender("female").page(3, 3);
        let (total, page) = search.apply(patients);
        assert_eq!(total, 7);
        assert_eq!(page.len(), 3);
        assert_eq!(page[0].id, "Fam3-Ann");
    }

    #[test]
    fn searchset_bundle_shape() {
        let p = Resource::Patient(patient("Garcia", "Maria", "female", "MRN-1"));
        let bundle = searchset_bundle(1, std::slice::from_ref(&p)).unwrap();
        assert_eq!(bundle["resourceType"], "Bundle");
        assert_eq!(bundle["type"], "searchset");
        assert_eq!(bundle["total"], 1);
        assert_eq!(bundle["entry"][0]["search"]["mode"], "match");
    }
}
