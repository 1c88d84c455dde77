//! Crate-wide error types.

use thiserror::Error;

use crate::enforce::AccessDenied;
use crate::registry::ProjectId;
use crate::rollout::{GateViolation, RolloutPhase};

/// Errors produced by the authorization layer.
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Project is not present in the registry.
    ///
    /// Always a hard failure: the unit of work is rejected before any row
    /// is touched, never defaulted to a permissive answer.
    #[error("unknown project: {0}")]
    UnknownProject(ProjectId),

    /// Project is already registered.
    #[error("project already registered: {0}")]
    DuplicateProject(ProjectId),

    /// Project id is empty or contains reserved characters.
    #[error("invalid project id: {0:?}")]
    InvalidProjectId(String),

    /// A grant referenced the reader itself.
    #[error("project {0} cannot be granted read access to itself")]
    SelfGrant(ProjectId),

    /// Requested phase transition is not allowed by the mechanism.
    #[error("invalid phase transition: {from} -> {to}")]
    InvalidTransition {
        /// Phase the project is currently in.
        from: RolloutPhase,
        /// Phase that was requested.
        to: RolloutPhase,
    },

    /// Promotion gate requirements were not met.
    #[error("promotion blocked: {}", format_violations(.0))]
    PromotionBlocked(Vec<GateViolation>),

    /// Operation blocked by enforcement.
    ///
    /// Kept distinct from any not-found error so callers can tell
    /// "doesn't exist" from "not yours".
    #[error(transparent)]
    AccessDenied(#[from] AccessDenied),

    /// Referenced audit record does not exist.
    #[error("audit record not found: {0}")]
    AuditRecordNotFound(String),

    /// Bypass was already active.
    #[error("emergency bypass is already active")]
    BypassAlreadyActive,

    /// Bypass was not active.
    #[error("emergency bypass is not active")]
    BypassNotActive,

    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),
}

/// Result type for authorization operations.
pub type AuthzResult<T> = Result<T, AuthzError>;

fn format_violations(violations: &[GateViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthzError::UnknownProject(ProjectId::new("ghost"));
        assert!(err.to_string().contains("ghost"));

        let err = AuthzError::InvalidTransition {
            from: RolloutPhase::Complete,
            to: RolloutPhase::Enforcing,
        };
        assert!(err.to_string().contains("complete -> enforcing"));
    }

    #[test]
    fn test_promotion_blocked_display() {
        let err = AuthzError::PromotionBlocked(vec![GateViolation::InsufficientVolume {
            observed: 3,
            required: 100,
        }]);
        let msg = err.to_string();
        assert!(msg.contains("promotion blocked"));
        assert!(msg.contains("3"));
        assert!(msg.contains("100"));
    }
}
