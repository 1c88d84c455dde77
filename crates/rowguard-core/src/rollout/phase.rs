//! Rollout phase definitions and the transition graph.

use std::fmt;
use std::str::FromStr;

/// Enforcement rollout phase of a single project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RolloutPhase {
    /// Legacy behavior; the decision function's answer is ignored.
    Pending,
    /// Violations are permitted but recorded for observation.
    Shadow,
    /// Violations block the operation.
    Enforcing,
    /// Behaves as `Enforcing`; administrative marker that rollout finished.
    Complete,
}

impl RolloutPhase {
    /// Check whether this phase blocks denied operations.
    pub fn enforces(&self) -> bool {
        matches!(self, RolloutPhase::Enforcing | RolloutPhase::Complete)
    }

    /// Check whether the mechanism allows a transition to `to`.
    ///
    /// Forward moves may skip phases. Rollbacks: any phase can drop back to
    /// `Pending` (emergency stop), and `Enforcing`/`Complete` can drop back
    /// to `Shadow`. Demoting `Complete` directly to `Enforcing` is rejected;
    /// a problem found post-rollout goes back through `Shadow` where it can
    /// be observed.
    pub fn can_transition_to(self, to: RolloutPhase) -> bool {
        if self == to {
            return false;
        }
        match (self, to) {
            (_, RolloutPhase::Pending) => true,
            (RolloutPhase::Enforcing | RolloutPhase::Complete, RolloutPhase::Shadow) => true,
            (RolloutPhase::Pending, _) => true,
            (RolloutPhase::Shadow, RolloutPhase::Enforcing | RolloutPhase::Complete) => true,
            (RolloutPhase::Enforcing, RolloutPhase::Complete) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RolloutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RolloutPhase::Pending => write!(f, "pending"),
            RolloutPhase::Shadow => write!(f, "shadow"),
            RolloutPhase::Enforcing => write!(f, "enforcing"),
            RolloutPhase::Complete => write!(f, "complete"),
        }
    }
}

impl FromStr for RolloutPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(RolloutPhase::Pending),
            "shadow" => Ok(RolloutPhase::Shadow),
            "enforcing" => Ok(RolloutPhase::Enforcing),
            "complete" => Ok(RolloutPhase::Complete),
            other => Err(format!(
                "unknown phase '{}' (expected: pending, shadow, enforcing, complete)",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enforces() {
        assert!(!RolloutPhase::Pending.enforces());
        assert!(!RolloutPhase::Shadow.enforces());
        assert!(RolloutPhase::Enforcing.enforces());
        assert!(RolloutPhase::Complete.enforces());
    }

    #[test]
    fn test_forward_transitions() {
        assert!(RolloutPhase::Pending.can_transition_to(RolloutPhase::Shadow));
        // Skips are allowed by the mechanism.
        assert!(RolloutPhase::Pending.can_transition_to(RolloutPhase::Enforcing));
        assert!(RolloutPhase::Pending.can_transition_to(RolloutPhase::Complete));
        assert!(RolloutPhase::Shadow.can_transition_to(RolloutPhase::Enforcing));
        assert!(RolloutPhase::Shadow.can_transition_to(RolloutPhase::Complete));
        assert!(RolloutPhase::Enforcing.can_transition_to(RolloutPhase::Complete));
    }

    #[test]
    fn test_rollback_transitions() {
        for phase in [
            RolloutPhase::Shadow,
            RolloutPhase::Enforcing,
            RolloutPhase::Complete,
        ] {
            assert!(phase.can_transition_to(RolloutPhase::Pending));
        }
        assert!(RolloutPhase::Enforcing.can_transition_to(RolloutPhase::Shadow));
        assert!(RolloutPhase::Complete.can_transition_to(RolloutPhase::Shadow));
    }

    #[test]
    fn test_rejected_transitions() {
        assert!(!RolloutPhase::Complete.can_transition_to(RolloutPhase::Enforcing));
        for phase in [
            RolloutPhase::Pending,
            RolloutPhase::Shadow,
            RolloutPhase::Enforcing,
            RolloutPhase::Complete,
        ] {
            assert!(!phase.can_transition_to(phase));
        }
    }

    #[test]
    fn test_phase_parse_roundtrip() {
        for phase in [
            RolloutPhase::Pending,
            RolloutPhase::Shadow,
            RolloutPhase::Enforcing,
            RolloutPhase::Complete,
        ] {
            assert_eq!(phase.to_string().parse::<RolloutPhase>().unwrap(), phase);
        }
        assert!("live".parse::<RolloutPhase>().is_err());
    }
}
