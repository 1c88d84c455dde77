//! Unit-of-work authorization context.
//!
//! The context is resolved exactly once at the start of each unit of work
//! (one request, one logical transaction) and carried explicitly through
//! it. Every per-row check afterwards is an O(1) in-memory test; nothing
//! re-queries the registry or grant tables mid-unit.

use std::collections::HashSet;

use crate::clock::current_timestamp;
use crate::error::{AuthzError, AuthzResult};
use crate::registry::{AccessClass, ProjectId, RegistryStore};
use crate::rollout::{RolloutPhase, RolloutStore};

/// Authorization context for one unit of work.
///
/// Deliberately not `Clone`: a context answers for exactly one unit of
/// work and must never leak into another, even on the same thread. A new
/// unit of work resolves a fresh one.
#[derive(Debug)]
pub struct ResolvedContext {
    project: ProjectId,
    access_class: AccessClass,
    phase: RolloutPhase,
    allowed: HashSet<ProjectId>,
    resolved_at: u64,
}

impl ResolvedContext {
    pub(crate) fn new(
        project: ProjectId,
        access_class: AccessClass,
        phase: RolloutPhase,
        allowed: HashSet<ProjectId>,
    ) -> Self {
        Self {
            project,
            access_class,
            phase,
            allowed,
            resolved_at: current_timestamp(),
        }
    }

    /// Project this unit of work is running as.
    pub fn project(&self) -> &ProjectId {
        &self.project
    }

    /// Access class of the project.
    pub fn access_class(&self) -> AccessClass {
        self.access_class
    }

    /// Rollout phase the project was in when the context resolved.
    ///
    /// A transition applied concurrently takes effect for the *next* unit
    /// of work; this one keeps a single consistent phase throughout.
    pub fn phase(&self) -> RolloutPhase {
        self.phase
    }

    /// Check whether rows owned by `owner` are readable.
    pub fn may_read(&self, owner: &ProjectId) -> bool {
        self.allowed.contains(owner)
    }

    /// Full set of readable project ids.
    pub fn allowed_projects(&self) -> &HashSet<ProjectId> {
        &self.allowed
    }

    /// When the context was resolved (microseconds since epoch).
    pub fn resolved_at(&self) -> u64 {
        self.resolved_at
    }
}

/// Builds a [`ResolvedContext`] from the registry and rollout stores.
pub struct ContextResolver<'a> {
    registry: &'a RegistryStore,
    rollout: &'a RolloutStore,
}

impl<'a> ContextResolver<'a> {
    /// Create a resolver over the given stores.
    pub fn new(registry: &'a RegistryStore, rollout: &'a RolloutStore) -> Self {
        Self { registry, rollout }
    }

    /// Resolve the authorization context for a project.
    ///
    /// Fails fast with [`AuthzError::UnknownProject`] before any row is
    /// touched. A missing rollout status row defaults to `Pending`. While
    /// the project is in shadow, the resolve is counted against its
    /// observation window.
    pub fn resolve(&self, project: &ProjectId) -> AuthzResult<ResolvedContext> {
        let entry = self
            .registry
            .lookup(project)?
            .ok_or_else(|| AuthzError::UnknownProject(project.clone()))?;
        let phase = self.rollout.phase_of(project)?;

        let allowed = match entry.access_class {
            AccessClass::Super => self.registry.project_ids()?,
            AccessClass::Shared => {
                let mut allowed = self.registry.grants_for(project)?;
                allowed.insert(project.clone());
                allowed
            }
            AccessClass::Isolated => {
                let mut allowed = HashSet::new();
                allowed.insert(project.clone());
                allowed
            }
        };

        if phase == RolloutPhase::Shadow {
            self.rollout.record_observed_unit(project)?;
        }

        Ok(ResolvedContext::new(
            project.clone(),
            entry.access_class,
            phase,
            allowed,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ProjectEntry;

    fn test_stores() -> (RegistryStore, RolloutStore, sled::Db) {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let registry = RegistryStore::open(&db).unwrap();
        let rollout = RolloutStore::open(&db).unwrap();
        (registry, rollout, db)
    }

    #[test]
    fn test_unknown_project_fails_fast() {
        let (registry, rollout, _db) = test_stores();
        let resolver = ContextResolver::new(&registry, &rollout);
        let err = resolver.resolve(&ProjectId::new("ghost")).unwrap_err();
        assert!(matches!(err, AuthzError::UnknownProject(_)));
    }

    #[test]
    fn test_isolated_context() {
        let (registry, rollout, _db) = test_stores();
        registry
            .insert(&ProjectEntry::new("alpha", "Alpha", AccessClass::Isolated))
            .unwrap();
        registry
            .insert(&ProjectEntry::new("beta", "Beta", AccessClass::Isolated))
            .unwrap();

        let resolver = ContextResolver::new(&registry, &rollout);
        let ctx = resolver.resolve(&ProjectId::new("alpha")).unwrap();

        assert_eq!(ctx.access_class(), AccessClass::Isolated);
        assert_eq!(ctx.phase(), RolloutPhase::Pending);
        assert!(ctx.may_read(&ProjectId::new("alpha")));
        assert!(!ctx.may_read(&ProjectId::new("beta")));
        assert_eq!(ctx.allowed_projects().len(), 1);
    }

    #[test]
    fn test_shared_context_includes_grants() {
        let (registry, rollout, _db) = test_stores();
        registry
            .insert(&ProjectEntry::new("shared1", "Shared 1", AccessClass::Shared))
            .unwrap();
        registry
            .insert(&ProjectEntry::new(
                "semantic-memory",
                "Semantic Memory",
                AccessClass::Isolated,
            ))
            .unwrap();
        registry
            .insert(&ProjectEntry::new("other", "Other", AccessClass::Isolated))
            .unwrap();
        registry
            .grant(
                &ProjectId::new("shared1"),
                &ProjectId::new("semantic-memory"),
            )
            .unwrap();

        let resolver = ContextResolver::new(&registry, &rollout);
        let ctx = resolver.resolve(&ProjectId::new("shared1")).unwrap();

        assert!(ctx.may_read(&ProjectId::new("shared1")));
        assert!(ctx.may_read(&ProjectId::new("semantic-memory")));
        assert!(!ctx.may_read(&ProjectId::new("other")));
        assert_eq!(ctx.allowed_projects().len(), 2);
    }

    #[test]
    fn test_super_context_reads_all_registered() {
        let (registry, rollout, _db) = test_stores();
        registry
            .insert(&ProjectEntry::new("admin", "Admin", AccessClass::Super))
            .unwrap();
        registry
            .insert(&ProjectEntry::new("alpha", "Alpha", AccessClass::Isolated))
            .unwrap();
        registry
            .insert(&ProjectEntry::new("beta", "Beta", AccessClass::Isolated))
            .unwrap();

        let resolver = ContextResolver::new(&registry, &rollout);
        let ctx = resolver.resolve(&ProjectId::new("admin")).unwrap();

        assert_eq!(ctx.allowed_projects().len(), 3);
        assert!(ctx.may_read(&ProjectId::new("alpha")));
        assert!(ctx.may_read(&ProjectId::new("beta")));
        // Only registered projects; nothing else.
        assert!(!ctx.may_read(&ProjectId::new("unregistered")));
    }

    #[test]
    fn test_resolve_counts_observed_units_in_shadow() {
        let (registry, rollout, _db) = test_stores();
        registry
            .insert(&ProjectEntry::new("alpha", "Alpha", AccessClass::Isolated))
            .unwrap();
        let id = ProjectId::new("alpha");

        let resolver = ContextResolver::new(&registry, &rollout);
        resolver.resolve(&id).unwrap();
        assert_eq!(rollout.observed_units(&id).unwrap(), 0);

        rollout.transition(&id, RolloutPhase::Shadow).unwrap();
        resolver.resolve(&id).unwrap();
        resolver.resolve(&id).unwrap();
        assert_eq!(rollout.observed_units(&id).unwrap(), 2);
    }

    #[test]
    fn test_context_carries_phase_at_resolution() {
        let (registry, rollout, _db) = test_stores();
        registry
            .insert(&ProjectEntry::new("alpha", "Alpha", AccessClass::Isolated))
            .unwrap();
        let id = ProjectId::new("alpha");
        rollout.transition(&id, RolloutPhase::Enforcing).unwrap();

        let resolver = ContextResolver::new(&registry, &rollout);
        let ctx = resolver.resolve(&id).unwrap();
        assert_eq!(ctx.phase(), RolloutPhase::Enforcing);

        // A concurrent transition applies to the next unit of work.
        rollout.transition(&id, RolloutPhase::Pending).unwrap();
        assert_eq!(ctx.phase(), RolloutPhase::Enforcing);
        let next = resolver.resolve(&id).unwrap();
        assert_eq!(next.phase(), RolloutPhase::Pending);
    }
}
