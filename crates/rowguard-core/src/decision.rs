//! The access decision function.
//!
//! Pure and phase-independent: phase only controls how the enforcement
//! hook *uses* the answer, never the answer itself.

use rkyv::{Archive, Deserialize, Serialize};
use std::fmt;

use crate::context::ResolvedContext;
use crate::registry::ProjectId;

/// A row-level operation kind.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize, serde::Serialize, serde::Deserialize,
)]
pub enum RowOperation {
    /// Read a row.
    Read,
    /// Insert a new row.
    Insert,
    /// Update an existing row.
    Update,
    /// Delete a row.
    Delete,
}

impl RowOperation {
    /// Check whether this operation mutates data.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            RowOperation::Insert | RowOperation::Update | RowOperation::Delete
        )
    }
}

impl fmt::Display for RowOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowOperation::Read => write!(f, "read"),
            RowOperation::Insert => write!(f, "insert"),
            RowOperation::Update => write!(f, "update"),
            RowOperation::Delete => write!(f, "delete"),
        }
    }
}

/// Why an operation was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// The row carries no owning project.
    MissingOwner,
    /// Write against a row owned by a different project.
    CrossProjectWrite,
    /// Owner is outside the requester's readable set.
    NotReadable,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::MissingOwner => write!(f, "row has no owning project"),
            DenyReason::CrossProjectWrite => write!(f, "writes are restricted to own rows"),
            DenyReason::NotReadable => write!(f, "owner is not in the readable set"),
        }
    }
}

/// Outcome of the decision function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Operation is permitted.
    Allow,
    /// Operation is not permitted.
    Deny(DenyReason),
}

impl Decision {
    /// Check whether the decision allows the operation.
    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Decide whether `operation` against a row owned by `owner` is permitted.
///
/// Evaluation order:
/// 1. A row with no owner is denied outright.
/// 2. Writes are allowed only against the requester's own rows; access
///    class never widens this.
/// 3. Reads are allowed iff the owner is in the context's readable set.
///
/// No side effects, no I/O, no logging.
pub fn decide(
    ctx: &ResolvedContext,
    owner: Option<&ProjectId>,
    operation: RowOperation,
) -> Decision {
    let owner = match owner {
        Some(owner) => owner,
        None => return Decision::Deny(DenyReason::MissingOwner),
    };

    if operation.is_write() {
        if owner == ctx.project() {
            Decision::Allow
        } else {
            Decision::Deny(DenyReason::CrossProjectWrite)
        }
    } else if ctx.may_read(owner) {
        Decision::Allow
    } else {
        Decision::Deny(DenyReason::NotReadable)
    }
}
