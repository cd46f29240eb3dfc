//! SMART on FHIR v1 scope grammar and enforcement.
//!
//! Scopes look like `patient/Observation.read`: a launch context, a
//! resource type (or `*`), and an access mode (`read`, `write`, `*`).
//! Enforcement is local and happens before any network call.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::resource::ResourceType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeContext {
    Patient,
    User,
    System,
}

impl ScopeContext {
    fn as_str(&self) -> &'static str {
        match self {
            ScopeContext::Patient => "patient",
            ScopeContext::User => "user",
            ScopeContext::System => "system",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeAccess {
    Read,
    Write,
    All,
}

impl ScopeAccess {
    fn as_str(&self) -> &'static str {
        match self {
            ScopeAccess::Read => "read",
            ScopeAccess::Write => "write",
            ScopeAccess::All => "*",
        }
    }

    fn covers(&self, required: ScopeAccess) -> bool {
        matches!(self, ScopeAccess::All) || *self == required
    }
}

/// The resource part of a scope: a concrete type or the `*` wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ScopeResource {
    Any,
    Type(ResourceType),
}

impl ScopeResource {
    fn covers(&self, required: ScopeResource) -> bool {
        match (self, required) {
            (ScopeResource::Any, _) => true,
            (ScopeResource::Type(a), ScopeResource::Type(b)) => *a == b,
            (ScopeResource::Type(_), ScopeResource::Any) => false,
        }
    }
}

/// One parsed SMART scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SmartScope {
    pub context: ScopeContext,
    pub resource: ScopeResource,
    pub access: ScopeAccess,
}

impl SmartScope {
    pub fn new(context: ScopeContext, resource: ScopeResource, access: ScopeAccess) -> Self {
        Self {
            context,
            resource,
            access,
        }
    }

    /// Shorthand for `patient/<Type>.read`.
    pub fn patient_read(resource_type: ResourceType) -> Self {
        Self::new(
            ScopeContext::Patient,
            ScopeResource::Type(resource_type),
            ScopeAccess::Read,
        )
    }

    /// Shorthand for `patient/<Type>.write`.
    pub fn patient_write(resource_type: ResourceType) -> Self {
        Self::new(
            ScopeContext::Patient,
            ScopeResource::Type(resource_type),
            ScopeAccess::Write,
        )
    }

    /// Whether this granted scope satisfies `required`, honoring `*`
    /// wildcards in the resource and access positions. Contexts never
    /// widen each other.
    pub fn covers(&self, required: &SmartScope) -> bool {
        self.context == required.context
            && self.resource.covers(required.resource)
            && self.access.covers(required.access)
    }
}

impl fmt::Display for SmartScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let resource = match self.resource {
            ScopeResource::Any => "*",
            ScopeResource::Type(t) => t.as_str(),
        };
        write!(
            f,
            "{}/{}.{}",
            self.context.as_str(),
            resource,
            self.access.as_str()
        )
    }
}

impl FromStr for SmartScope {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || AuthError::MalformedScope {
            scope: s.to_string(),
        };

        let (context_part, rest) = s.split_once('/').ok_or_else(malformed)?;
        let (resource_part, access_part) = rest.rsplit_once('.').ok_or_else(malformed)?;

        let context = match context_part {
            "patient" => ScopeContext::Patient,
            "user" => ScopeContext::User,
            "system" => ScopeContext::System,
            _ => return Err(malformed()),
        };
        let resource = match resource_part {
            "*" => ScopeResource::Any,
            other => ScopeResource::Type(
                ResourceType::from_str(other).map_err(|_| malformed())?,
            ),
        };
        let access = match access_part {
            "read" => ScopeAccess::Read,
            "write" => ScopeAccess::Write,
            "*" => ScopeAccess::All,
            _ => return Err(malformed()),
        };

        Ok(SmartScope::new(context, resource, access))
    }
}

/// An ordered set of scopes, as requested by the client or granted by the
/// authorization server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeSet {
    scopes: BTreeSet<SmartScope>,
}

impl ScopeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a space-separated scope string, as returned in the token
    /// response `scope` field. Non-SMART scopes (`openid`, `launch`, ...)
    /// are ignored rather than rejected.
    pub fn parse_lenient(raw: &str) -> Self {
        let scopes = raw
            .split_whitespace()
            .filter_map(|s| SmartScope::from_str(s).ok())
            .collect();
        Self { scopes }
    }

    pub fn insert(&mut self, scope: SmartScope) {
        self.scopes.insert(scope);
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SmartScope> {
        self.scopes.iter()
    }

    /// Whether any granted scope covers `required`.
    pub fn allows(&self, required: &SmartScope) -> bool {
        self.scopes.iter().any(|s| s.covers(required))
    }

    /// Enforcement helper: `InsufficientScope` unless covered.
    pub fn require(&self, required: &SmartScope) -> Result<(), AuthError> {
        if self.allows(required) {
            Ok(())
        } else {
            Err(AuthError::InsufficientScope {
                required: required.to_string(),
                granted: self.to_string(),
            })
        }
    }
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .scopes
            .iter()
            .map(SmartScope::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        f.write_str(&joined)
    }
}

impl FromIterator<SmartScope> for ScopeSet {
    fn from_iter<T: IntoIterator<Item = SmartScope>>(iter: T) -> Self {
        Self {
            scopes: iter.into_iter().collect(),
        }
    }
}
