//! Operational gate for promoting a project from shadow to enforcing.
//!
//! The state machine itself allows any forward transition; this gate is the
//! procedure that rollout tooling runs before `Shadow -> Enforcing`. It
//! cannot tell a stale observation window from a quiet one, so permission
//! changes must reset the window (see `RolloutStore::reset_observation`).

use std::fmt;
use std::time::Duration;

use super::phase::RolloutPhase;
use super::status::RolloutStore;
use crate::audit::SledAuditStore;
use crate::clock::current_timestamp;
use crate::error::AuthzResult;
use crate::registry::ProjectId;

/// Default minimum observation window before promotion.
pub const DEFAULT_MIN_OBSERVATION: Duration = Duration::from_secs(72 * 3600);

/// Default minimum units of work that must be observed before promotion.
pub const DEFAULT_MIN_OBSERVED_UNITS: u64 = 1_000;

/// Promotion requirements.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Minimum time a project must have been observed in shadow.
    pub min_observation: Duration,
    /// Minimum units of work that must have resolved while in shadow.
    pub min_observed_units: u64,
}

impl GateConfig {
    /// Set the minimum observation window.
    pub fn with_min_observation(mut self, min_observation: Duration) -> Self {
        self.min_observation = min_observation;
        self
    }

    /// Set the minimum observed unit-of-work volume.
    pub fn with_min_observed_units(mut self, min_observed_units: u64) -> Self {
        self.min_observed_units = min_observed_units;
        self
    }

    /// Config with no duration/volume requirements, for tests and manual
    /// override.
    pub fn unrestricted() -> Self {
        Self {
            min_observation: Duration::ZERO,
            min_observed_units: 0,
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_observation: DEFAULT_MIN_OBSERVATION,
            min_observed_units: DEFAULT_MIN_OBSERVED_UNITS,
        }
    }
}

/// A single unmet promotion requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateViolation {
    /// The project is not in shadow, so there is nothing to promote.
    NotInShadow {
        /// Phase the project is actually in.
        phase: RolloutPhase,
    },
    /// The observation window has not run long enough.
    ObservationTooShort {
        /// How long the window has been open, in seconds.
        observed_secs: u64,
        /// Required window length, in seconds.
        required_secs: u64,
    },
    /// Not enough units of work resolved during the window.
    InsufficientVolume {
        /// Units observed so far.
        observed: u64,
        /// Required units.
        required: u64,
    },
    /// Would-be-denied records exist inside the current window.
    OutstandingViolations {
        /// Number of records in the window.
        count: u64,
    },
    /// Historical violations that nobody has triaged.
    UntriagedViolations {
        /// Number of untriaged records.
        count: u64,
    },
}

impl fmt::Display for GateViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateViolation::NotInShadow { phase } => {
                write!(f, "project is in phase '{}', not shadow", phase)
            }
            GateViolation::ObservationTooShort {
                observed_secs,
                required_secs,
            } => write!(
                f,
                "observation window is {}s, {}s required",
                observed_secs, required_secs
            ),
            GateViolation::InsufficientVolume { observed, required } => write!(
                f,
                "{} units of work observed, {} required",
                observed, required
            ),
            GateViolation::OutstandingViolations { count } => write!(
                f,
                "{} would-be-denied record(s) in the current window",
                count
            ),
            GateViolation::UntriagedViolations { count } => {
                write!(f, "{} untriaged violation(s)", count)
            }
        }
    }
}

/// Checks the promotion procedure for a project.
pub struct PromotionGate<'a> {
    config: GateConfig,
    rollout: &'a RolloutStore,
    audit: &'a SledAuditStore,
}

impl<'a> PromotionGate<'a> {
    /// Create a gate over the given stores.
    pub fn new(config: GateConfig, rollout: &'a RolloutStore, audit: &'a SledAuditStore) -> Self {
        Self {
            config,
            rollout,
            audit,
        }
    }

    /// Evaluate every promotion requirement for a project.
    ///
    /// Returns all unmet requirements; an empty list means the project is
    /// ready for `Shadow -> Enforcing`.
    pub fn check(&self, project: &ProjectId) -> AuthzResult<Vec<GateViolation>> {
        let Some(status) = self.rollout.status_of(project)? else {
            return Ok(vec![GateViolation::NotInShadow {
                phase: RolloutPhase::Pending,
            }]);
        };
        if status.phase != RolloutPhase::Shadow {
            return Ok(vec![GateViolation::NotInShadow {
                phase: status.phase,
            }]);
        }
        let window_start = status
            .observation_started_at
            .unwrap_or(status.transitioned_at);

        let mut violations = Vec::new();

        let now = current_timestamp();
        let observed_secs = now.saturating_sub(window_start) / 1_000_000;
        let required_secs = self.config.min_observation.as_secs();
        if observed_secs < required_secs {
            violations.push(GateViolation::ObservationTooShort {
                observed_secs,
                required_secs,
            });
        }

        let observed = self.rollout.observed_units(project)?;
        if observed < self.config.min_observed_units {
            violations.push(GateViolation::InsufficientVolume {
                observed,
                required: self.config.min_observed_units,
            });
        }

        let in_window = self.audit.count_since(project, window_start)?;
        if in_window > 0 {
            violations.push(GateViolation::OutstandingViolations { count: in_window });
        }

        let untriaged = self.audit.untriaged_count(project)?;
        if untriaged > 0 {
            violations.push(GateViolation::UntriagedViolations { count: untriaged });
        }

        Ok(violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditRecord, TriageResolution};
    use crate::decision::RowOperation;

    fn test_stores() -> (RolloutStore, SledAuditStore, sled::Db) {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let rollout = RolloutStore::open(&db).unwrap();
        let audit = SledAuditStore::open(&db).unwrap();
        (rollout, audit, db)
    }

    #[test]
    fn test_gate_rejects_non_shadow_phase() {
        let (rollout, audit, _db) = test_stores();
        let gate = PromotionGate::new(GateConfig::unrestricted(), &rollout, &audit);

        let violations = gate.check(&ProjectId::new("alpha")).unwrap();
        assert_eq!(
            violations,
            vec![GateViolation::NotInShadow {
                phase: RolloutPhase::Pending
            }]
        );
    }

    #[test]
    fn test_gate_passes_clean_shadow() {
        let (rollout, audit, _db) = test_stores();
        let id = ProjectId::new("alpha");
        rollout.transition(&id, RolloutPhase::Shadow).unwrap();

        let gate = PromotionGate::new(GateConfig::unrestricted(), &rollout, &audit);
        assert!(gate.check(&id).unwrap().is_empty());
    }

    #[test]
    fn test_gate_requires_duration_and_volume() {
        let (rollout, audit, _db) = test_stores();
        let id = ProjectId::new("alpha");
        rollout.transition(&id, RolloutPhase::Shadow).unwrap();

        let config = GateConfig::unrestricted()
            .with_min_observation(Duration::from_secs(3600))
            .with_min_observed_units(10);
        let gate = PromotionGate::new(config, &rollout, &audit);

        let violations = gate.check(&id).unwrap();
        assert!(violations
            .iter()
            .any(|v| matches!(v, GateViolation::ObservationTooShort { .. })));
        assert!(violations.iter().any(|v| matches!(
            v,
            GateViolation::InsufficientVolume {
                observed: 0,
                required: 10
            }
        )));
    }

    #[test]
    fn test_gate_counts_window_and_untriaged_violations() {
        let (rollout, audit, _db) = test_stores();
        let id = ProjectId::new("alpha");
        rollout.transition(&id, RolloutPhase::Shadow).unwrap();

        let record =
            AuditRecord::would_deny(id.clone(), "notes", RowOperation::Read, None);
        audit.append_record(&record).unwrap();

        let gate = PromotionGate::new(GateConfig::unrestricted(), &rollout, &audit);
        let violations = gate.check(&id).unwrap();
        assert!(violations
            .iter()
            .any(|v| matches!(v, GateViolation::OutstandingViolations { count: 1 })));
        assert!(violations
            .iter()
            .any(|v| matches!(v, GateViolation::UntriagedViolations { count: 1 })));

        // Triage clears one requirement; the in-window record still blocks
        // until the window is re-observed.
        audit
            .triage(&record.id, TriageResolution::Accepted)
            .unwrap();
        let violations = gate.check(&id).unwrap();
        assert!(violations
            .iter()
            .any(|v| matches!(v, GateViolation::OutstandingViolations { count: 1 })));
        assert!(!violations
            .iter()
            .any(|v| matches!(v, GateViolation::UntriagedViolations { .. })));

        // Resetting the window clears the slate.
        rollout.reset_observation(&id).unwrap();
        assert!(gate.check(&id).unwrap().is_empty());
    }
}
