//! Persistent project registry and grant storage.
//!
//! Two small sled trees: one for project entries, one for read grants.
//! Both hold serde_json values keyed by project id.

use std::collections::HashSet;

use tracing::info;

use super::project::{AccessClass, PermissionGrant, ProjectEntry, ProjectId};
use crate::error::{AuthzError, AuthzResult};

const PROJECT_TREE_NAME: &[u8] = b"registry:projects";
const GRANT_TREE_NAME: &[u8] = b"registry:grants";

/// Store for project entries and permission grants.
pub struct RegistryStore {
    projects: sled::Tree,
    grants: sled::Tree,
}

impl RegistryStore {
    /// Open the registry store.
    pub fn open(db: &sled::Db) -> AuthzResult<Self> {
        let projects = db.open_tree(PROJECT_TREE_NAME)?;
        let grants = db.open_tree(GRANT_TREE_NAME)?;
        Ok(Self { projects, grants })
    }

    /// Register a new project.
    pub fn insert(&self, entry: &ProjectEntry) -> AuthzResult<()> {
        if !entry.id.is_valid() {
            return Err(AuthzError::InvalidProjectId(entry.id.as_str().to_string()));
        }
        if self.projects.contains_key(entry.id.as_str())? {
            return Err(AuthzError::DuplicateProject(entry.id.clone()));
        }
        let value = serialize(entry)?;
        self.projects.insert(entry.id.as_str(), value)?;
        info!(project = %entry.id, class = %entry.access_class, "registered project");
        Ok(())
    }

    /// Look up a project entry.
    pub fn lookup(&self, id: &ProjectId) -> AuthzResult<Option<ProjectEntry>> {
        match self.projects.get(id.as_str())? {
            Some(bytes) => Ok(Some(deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Look up a project entry, failing if it is absent.
    pub fn require(&self, id: &ProjectId) -> AuthzResult<ProjectEntry> {
        self.lookup(id)?
            .ok_or_else(|| AuthzError::UnknownProject(id.clone()))
    }

    /// Remove a project and cascade away grants in either role.
    pub fn remove(&self, id: &ProjectId) -> AuthzResult<bool> {
        let removed = self.projects.remove(id.as_str())?.is_some();
        if removed {
            // Grants are few; a full scan for the target side is fine.
            let mut stale = Vec::new();
            for result in self.grants.iter() {
                let (key, value) = result?;
                let grant: PermissionGrant = deserialize(&value)?;
                if &grant.reader == id || &grant.target == id {
                    stale.push(key);
                }
            }
            for key in stale {
                self.grants.remove(key)?;
            }
            info!(project = %id, "removed project");
        }
        Ok(removed)
    }

    /// Change a project's access class.
    pub fn set_access_class(&self, id: &ProjectId, access_class: AccessClass) -> AuthzResult<()> {
        let mut entry = self.require(id)?;
        entry.access_class = access_class;
        self.projects.insert(id.as_str(), serialize(&entry)?)?;
        info!(project = %id, class = %access_class, "changed access class");
        Ok(())
    }

    /// List all registered projects.
    pub fn list(&self) -> AuthzResult<Vec<ProjectEntry>> {
        let mut entries = Vec::new();
        for result in self.projects.iter() {
            let (_, value) = result?;
            entries.push(deserialize(&value)?);
        }
        Ok(entries)
    }

    /// Collect the ids of every registered project.
    pub fn project_ids(&self) -> AuthzResult<HashSet<ProjectId>> {
        let mut ids = HashSet::new();
        for result in self.projects.iter() {
            let (key, _) = result?;
            let id = String::from_utf8(key.to_vec())
                .map_err(|e| AuthzError::Deserialization(e.to_string()))?;
            ids.insert(ProjectId::new(id));
        }
        Ok(ids)
    }

    /// Grant `reader` read access to `target`'s rows.
    ///
    /// Both projects must be registered; self-grants are rejected.
    /// Granting an existing pair is a no-op.
    pub fn grant(&self, reader: &ProjectId, target: &ProjectId) -> AuthzResult<()> {
        if reader == target {
            return Err(AuthzError::SelfGrant(reader.clone()));
        }
        self.require(reader)?;
        self.require(target)?;
        let grant = PermissionGrant {
            reader: reader.clone(),
            target: target.clone(),
        };
        self.grants
            .insert(Self::grant_key(reader, target), serialize(&grant)?)?;
        info!(reader = %reader, target = %target, "granted read access");
        Ok(())
    }

    /// Revoke a read grant.
    pub fn revoke(&self, reader: &ProjectId, target: &ProjectId) -> AuthzResult<bool> {
        let removed = self
            .grants
            .remove(Self::grant_key(reader, target))?
            .is_some();
        if removed {
            info!(reader = %reader, target = %target, "revoked read access");
        }
        Ok(removed)
    }

    /// Get the set of projects `reader` has been explicitly granted.
    pub fn grants_for(&self, reader: &ProjectId) -> AuthzResult<HashSet<ProjectId>> {
        let mut targets = HashSet::new();
        for result in self.grants.scan_prefix(Self::reader_prefix(reader)) {
            let (_, value) = result?;
            let grant: PermissionGrant = deserialize(&value)?;
            targets.insert(grant.target);
        }
        Ok(targets)
    }

    /// List every grant in the store.
    pub fn grants(&self) -> AuthzResult<Vec<PermissionGrant>> {
        let mut all = Vec::new();
        for result in self.grants.iter() {
            let (_, value) = result?;
            all.push(deserialize(&value)?);
        }
        Ok(all)
    }

    fn reader_prefix(reader: &ProjectId) -> Vec<u8> {
        let mut key = reader.as_str().as_bytes().to_vec();
        key.push(b':');
        key
    }

    fn grant_key(reader: &ProjectId, target: &ProjectId) -> Vec<u8> {
        let mut key = Self::reader_prefix(reader);
        key.extend_from_slice(target.as_str().as_bytes());
        key
    }
}

fn serialize<T: serde::Serialize>(value: &T) -> AuthzResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| AuthzError::Serialization(e.to_string()))
}

fn deserialize<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> AuthzResult<T> {
    serde_json::from_slice(bytes).map_err(|e| AuthzError::Deserialization(e.to_string()))
}
