//! Code system registry and structural code validation.
//!
//! The registry holds the terminology systems the portal recognizes and a
//! syntax validator per system. Validation here is purely structural (does
//! the code match the system's shape rules); live terminology-server
//! lookups plug in through the same [`CodeValidator`] trait but are not
//! part of this crate.
//!
//! The registry is an explicitly constructed, passed-in object so tests can
//! substitute fake code systems. There is no ambient global state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use regex::Regex;

use crate::error::UnknownSystemError;

/// Canonical URIs of the terminology systems the portal binds to.
pub mod systems {
    pub const LOINC: &str = "http://loinc.org";
    pub const RXNORM: &str = "http://www.nlm.nih.gov/research/umls/rxnorm";
    pub const ICD10_CM: &str = "http://hl7.org/fhir/sid/icd-10-cm";
    pub const ICD10: &str = "http://hl7.org/fhir/sid/icd-10";
    pub const SNOMED_CT: &str = "http://snomed.info/sct";
    pub const UCUM: &str = "http://unitsofmeasure.org";
}

/// Structural validator for codes of a single terminology system.
///
/// Implementations must be cheap and side-effect free; the resource
/// validator calls them once per coded value. A terminology-server-backed
/// implementation is the pluggable hook for deployments that want live
/// lookups.
pub trait CodeValidator: Send + Sync {
    fn is_valid_code(&self, code: &str) -> bool;
}

/// Regex-backed [`CodeValidator`].
pub struct RegexCodeValidator {
    pattern: Regex,
}

impl RegexCodeValidator {
    pub fn new(pattern: Regex) -> Self {
        Self { pattern }
    }
}

impl CodeValidator for RegexCodeValidator {
    fn is_valid_code(&self, code: &str) -> bool {
        self.pattern.is_match(code)
    }
}

impl<F> CodeValidator for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_valid_code(&self, code: &str) -> bool {
        self(code)
    }
}

/// Registry of known code systems and recognized unit systems.
#[derive(Clone, Default)]
pub struct CodeSystemRegistry {
    validators: HashMap<String, Arc<dyn CodeValidator>>,
    unit_systems: HashSet<String>,
}

impl CodeSystemRegistry {
    /// An empty registry. Most callers want [`CodeSystemRegistry::r4_default`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with syntax validators for the R4 bindings the
    /// portal uses: LOINC, RxNorm, ICD-10(-CM), SNOMED CT, plus UCUM as the
    /// recognized unit system.
    pub fn r4_default() -> Self {
        let mut registry = Self::new();

        // LOINC codes: 1-5 digits, hyphen, single check digit.
        registry.register_pattern(systems::LOINC, r"^\d{1,5}-\d$");
        // RxNorm concept identifiers are plain numeric (RXCUI).
        registry.register_pattern(systems::RXNORM, r"^\d{1,8}$");
        // ICD-10-CM: letter, two alphanumerics, optional dotted extension.
        let icd10 = r"^[A-TV-Z][0-9][0-9A-Z](\.[0-9A-Z]{1,4})?$";
        registry.register_pattern(systems::ICD10_CM, icd10);
        registry.register_pattern(systems::ICD10, icd10);
        // SNOMED CT concept IDs: 6 to 18 digits, no leading zero.
        registry.register_pattern(systems::SNOMED_CT, r"^[1-9]\d{5,17}$");
        // UCUM unit expressions are a grammar, not a pattern; accept any
        // non-empty printable ASCII expression structurally.
        registry.register_system(
            systems::UCUM,
            Arc::new(|code: &str| {
                !code.is_empty() && code.chars().all(|c| c.is_ascii_graphic())
            }),
        );
        registry.register_unit_system(systems::UCUM);

        registry
    }

    /// Registers (or replaces) the validator for a system URI.
    pub fn register_system(&mut self, uri: impl Into<String>, validator: Arc<dyn CodeValidator>) {
        self.validators.insert(uri.into(), validator);
    }

    fn register_pattern(&mut self, uri: &str, pattern: &str) {
        // Patterns here are compile-time constants covered by unit tests.
        let regex = Regex::new(pattern).expect("built-in code system pattern");
        self.register_system(uri, Arc::new(RegexCodeValidator::new(regex)));
    }

    /// Marks a registered system as usable for quantity units.
    pub fn register_unit_system(&mut self, uri: impl Into<String>) {
        self.unit_systems.insert(uri.into());
    }

    pub fn is_registered(&self, system: &str) -> bool {
        self.validators.contains_key(system)
    }

    pub fn is_unit_system(&self, system: &str) -> bool {
        self.unit_systems.contains(system)
    }

    /// Structural validity of `code` under `system`.
    ///
    /// An unregistered system is a hard [`UnknownSystemError`], never a
    /// pass-through.
    pub fn validate(&self, system: &str, code: &str) -> Result<bool, UnknownSystemError> {
        match self.validators.get(system) {
            Some(validator) => Ok(validator.is_valid_code(code)),
            None => Err(UnknownSystemError::new(system)),
        }
    }
}

impl std::fmt::Debug for CodeSystemRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeSystemRegistry")
            .field("systems", &self.validators.keys().collect::<Vec<_>>())
            .field("unit_systems", &self.unit_systems)
            .finish()
    }
}
