//! Project identity, access class, and grant definitions.

use rkyv::{Archive, Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a tenant namespace ("project").
///
/// Project ids are the ownership labels attached to every row; they are
/// compared byte-for-byte and must not contain `:` (used as a key separator
/// in the grant store) or NUL.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Archive,
    Serialize,
    Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    /// Create a project id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check that the id is usable as a store key.
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty() && !self.0.contains(':') && !self.0.contains('\0')
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ProjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Access class of a project.
///
/// The class is the *ceiling* of what a project may ever read; the rollout
/// phase never widens it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AccessClass {
    /// May read rows owned by every registered project.
    Super,
    /// May read its own rows plus explicitly granted projects.
    Shared,
    /// May read only its own rows.
    Isolated,
}

impl fmt::Display for AccessClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessClass::Super => write!(f, "super"),
            AccessClass::Shared => write!(f, "shared"),
            AccessClass::Isolated => write!(f, "isolated"),
        }
    }
}

impl FromStr for AccessClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "super" => Ok(AccessClass::Super),
            "shared" => Ok(AccessClass::Shared),
            "isolated" => Ok(AccessClass::Isolated),
            other => Err(format!(
                "unknown access class '{}' (expected: super, shared, isolated)",
                other
            )),
        }
    }
}

/// Registry entry for a tenant.
///
/// Created once at onboarding; immutable except `access_class`, which only
/// changes administratively.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProjectEntry {
    /// Unique project id.
    pub id: ProjectId,
    /// Human-readable name.
    pub display_name: String,
    /// Read ceiling for this project.
    pub access_class: AccessClass,
}

impl ProjectEntry {
    /// Create a new registry entry.
    pub fn new(
        id: impl Into<ProjectId>,
        display_name: impl Into<String>,
        access_class: AccessClass,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            access_class,
        }
    }
}

/// An explicit cross-project read grant.
///
/// Only meaningful for `Shared`-class readers; `reader != target` always.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PermissionGrant {
    /// Project receiving read access.
    pub reader: ProjectId,
    /// Project whose rows become readable.
    pub target: ProjectId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_id_validity() {
        assert!(ProjectId::new("semantic-memory").is_valid());
        assert!(ProjectId::new("alpha_1").is_valid());
        assert!(!ProjectId::new("").is_valid());
        assert!(!ProjectId::new("bad:id").is_valid());
        assert!(!ProjectId::new("bad\0id").is_valid());
    }

    #[test]
    fn test_access_class_parse() {
        assert_eq!("super".parse::<AccessClass>().unwrap(), AccessClass::Super);
        assert_eq!("Shared".parse::<AccessClass>().unwrap(), AccessClass::Shared);
        assert_eq!(
            "isolated".parse::<AccessClass>().unwrap(),
            AccessClass::Isolated
        );
        assert!("root".parse::<AccessClass>().is_err());
    }

    #[test]
    fn test_access_class_display_roundtrip() {
        for class in [AccessClass::Super, AccessClass::Shared, AccessClass::Isolated] {
            assert_eq!(class.to_string().parse::<AccessClass>().unwrap(), class);
        }
    }

    #[test]
    fn test_project_entry_serde() {
        let entry = ProjectEntry::new("alpha", "Alpha Team", AccessClass::Isolated);
        let bytes = serde_json::to_vec(&entry).unwrap();
        let restored: ProjectEntry = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(restored, entry);
    }
}
