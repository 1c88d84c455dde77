//! Isolation engine: the facade the host application and operator tooling
//! talk to.
//!
//! Owns the sled database and wires the registry, rollout, audit, and
//! bypass stores together. Request traffic uses `resolve_context` /
//! `begin_work`; everything else is administrative.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::audit::{AuditRecord, AuditSink, SledAuditStore, TriageResolution};
use crate::bypass::EmergencyBypass;
use crate::context::{ContextResolver, ResolvedContext};
use crate::enforce::{EnforcementHook, WorkUnit};
use crate::error::{AuthzError, AuthzResult};
use crate::registry::{AccessClass, PermissionGrant, ProjectEntry, ProjectId, RegistryStore};
use crate::rollout::{GateConfig, GateViolation, PromotionGate, RolloutPhase, RolloutStatus, RolloutStore};

/// Default on-disk location for the authorization state.
pub const DEFAULT_DATA_PATH: &str = "./rowguard-data";

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Path to the sled database directory.
    pub data_path: PathBuf,
    /// Promotion gate thresholds.
    pub gate: GateConfig,
    /// Use an in-memory temporary database (tests).
    pub temporary: bool,
}

impl EngineConfig {
    /// Create a configuration with the given data path.
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        Self {
            data_path: data_path.into(),
            gate: GateConfig::default(),
            temporary: false,
        }
    }

    /// Set the promotion gate thresholds.
    pub fn with_gate(mut self, gate: GateConfig) -> Self {
        self.gate = gate;
        self
    }

    /// Configuration backed by a temporary database.
    pub fn temporary() -> Self {
        Self {
            data_path: PathBuf::new(),
            gate: GateConfig::default(),
            temporary: true,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_PATH)
    }
}

/// The namespace-isolation engine.
pub struct IsolationEngine {
    db: sled::Db,
    registry: RegistryStore,
    rollout: RolloutStore,
    audit: Arc<SledAuditStore>,
    bypass: Arc<EmergencyBypass>,
    hook: EnforcementHook,
    gate: GateConfig,
}

impl IsolationEngine {
    /// Open the engine.
    pub fn open(config: EngineConfig) -> AuthzResult<Self> {
        let db = if config.temporary {
            sled::Config::new().temporary(true).open()?
        } else {
            sled::open(&config.data_path)?
        };

        let registry = RegistryStore::open(&db)?;
        let rollout = RolloutStore::open(&db)?;
        let audit = Arc::new(SledAuditStore::open(&db)?);
        let bypass = Arc::new(EmergencyBypass::open(&db)?);
        let sink: Arc<dyn AuditSink> = audit.clone();
        let hook = EnforcementHook::new(sink, bypass.clone());

        if !config.temporary {
            info!(path = %config.data_path.display(), "opened isolation engine");
        }

        Ok(Self {
            db,
            registry,
            rollout,
            audit,
            bypass,
            hook,
            gate: config.gate,
        })
    }

    /// Flush all authorization state to disk.
    pub fn flush(&self) -> AuthzResult<()> {
        self.db.flush()?;
        Ok(())
    }

    // ---- request path -----------------------------------------------------

    /// Resolve the authorization context for one unit of work.
    pub fn resolve_context(&self, project: &ProjectId) -> AuthzResult<ResolvedContext> {
        ContextResolver::new(&self.registry, &self.rollout).resolve(project)
    }

    /// Resolve a context and start a unit of work in one step.
    pub fn begin_work(&self, project: &ProjectId) -> AuthzResult<WorkUnit> {
        Ok(self.hook.begin(self.resolve_context(project)?))
    }

    /// The enforcement hook, for hosts that resolve contexts themselves.
    pub fn hook(&self) -> &EnforcementHook {
        &self.hook
    }

    // ---- registry administration ------------------------------------------

    /// Register a project.
    pub fn register_project(
        &self,
        id: impl Into<ProjectId>,
        display_name: impl Into<String>,
        access_class: AccessClass,
    ) -> AuthzResult<()> {
        self.registry
            .insert(&ProjectEntry::new(id, display_name, access_class))
    }

    /// Remove a project; grants referencing it cascade away.
    pub fn remove_project(&self, id: &ProjectId) -> AuthzResult<bool> {
        self.registry.remove(id)
    }

    /// Change a project's access class.
    ///
    /// Counts as an access-pattern change: the project's observation
    /// window restarts if it is in shadow.
    pub fn set_access_class(&self, id: &ProjectId, access_class: AccessClass) -> AuthzResult<()> {
        self.registry.set_access_class(id, access_class)?;
        self.rollout.reset_observation(id)
    }

    /// List registered projects.
    pub fn list_projects(&self) -> AuthzResult<Vec<ProjectEntry>> {
        self.registry.list()
    }

    /// Grant `reader` read access to `target`'s rows.
    ///
    /// The reader's observation window restarts: what was observed before
    /// the grant no longer predicts enforcement behavior.
    pub fn grant_read(&self, reader: &ProjectId, target: &ProjectId) -> AuthzResult<()> {
        self.registry.grant(reader, target)?;
        self.rollout.reset_observation(reader)
    }

    /// Revoke a read grant; resets the reader's observation window.
    pub fn revoke_read(&self, reader: &ProjectId, target: &ProjectId) -> AuthzResult<bool> {
        let removed = self.registry.revoke(reader, target)?;
        if removed {
            self.rollout.reset_observation(reader)?;
        }
        Ok(removed)
    }

    /// List grants, optionally for one reader.
    pub fn list_grants(&self, reader: Option<&ProjectId>) -> AuthzResult<Vec<PermissionGrant>> {
        match reader {
            Some(reader) => {
                let mut grants: Vec<PermissionGrant> = self
                    .registry
                    .grants_for(reader)?
                    .into_iter()
                    .map(|target| PermissionGrant {
                        reader: reader.clone(),
                        target,
                    })
                    .collect();
                grants.sort_by(|a, b| a.target.cmp(&b.target));
                Ok(grants)
            }
            None => self.registry.grants(),
        }
    }

    // ---- rollout control --------------------------------------------------

    /// Current rollout status of a project.
    pub fn rollout_status(&self, id: &ProjectId) -> AuthzResult<Option<RolloutStatus>> {
        self.registry.require(id)?;
        self.rollout.status_of(id)
    }

    /// Current rollout phase of a project.
    pub fn phase_of(&self, id: &ProjectId) -> AuthzResult<RolloutPhase> {
        self.registry.require(id)?;
        self.rollout.phase_of(id)
    }

    /// Apply a phase transition (mechanism-level; does not consult the
    /// promotion gate).
    pub fn transition_phase(&self, id: &ProjectId, to: RolloutPhase) -> AuthzResult<RolloutStatus> {
        self.registry.require(id)?;
        self.rollout.transition(id, to)
    }

    /// Restart a project's observation window.
    pub fn reset_observation(&self, id: &ProjectId) -> AuthzResult<()> {
        self.registry.require(id)?;
        self.rollout.reset_observation(id)
    }

    /// Evaluate the promotion gate with the engine's configured thresholds.
    pub fn promotion_report(&self, id: &ProjectId) -> AuthzResult<Vec<GateViolation>> {
        self.promotion_report_with(id, &self.gate)
    }

    /// Evaluate the promotion gate with explicit thresholds.
    pub fn promotion_report_with(
        &self,
        id: &ProjectId,
        gate: &GateConfig,
    ) -> AuthzResult<Vec<GateViolation>> {
        self.registry.require(id)?;
        PromotionGate::new(gate.clone(), &self.rollout, &self.audit).check(id)
    }

    /// Promote a project `Shadow -> Enforcing`, gated by the operational
    /// procedure.
    pub fn promote(&self, id: &ProjectId) -> AuthzResult<RolloutStatus> {
        self.promote_with(id, &self.gate)
    }

    /// Promote with explicit gate thresholds.
    pub fn promote_with(&self, id: &ProjectId, gate: &GateConfig) -> AuthzResult<RolloutStatus> {
        let violations = self.promotion_report_with(id, gate)?;
        if !violations.is_empty() {
            return Err(AuthzError::PromotionBlocked(violations));
        }
        self.rollout.transition(id, RolloutPhase::Enforcing)
    }

    // ---- audit ------------------------------------------------------------

    /// List shadow-audit violations.
    pub fn list_violations(
        &self,
        project: Option<&ProjectId>,
        since: Option<u64>,
    ) -> AuthzResult<Vec<AuditRecord>> {
        self.audit.list(project, since)
    }

    /// Mark a violation as triaged.
    pub fn triage_violation(
        &self,
        id: &[u8; 16],
        resolution: TriageResolution,
    ) -> AuthzResult<()> {
        if self.audit.triage(id, resolution)? {
            Ok(())
        } else {
            Err(AuthzError::AuditRecordNotFound(hex::encode(id)))
        }
    }

    /// The persistent audit store.
    pub fn audit(&self) -> &SledAuditStore {
        &self.audit
    }

    // ---- bypass -----------------------------------------------------------

    /// The emergency bypass switch (operator surface only).
    pub fn bypass(&self) -> &EmergencyBypass {
        &self.bypass
    }
}
