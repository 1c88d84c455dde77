//! Per-row enforcement hook.
//!
//! The storage layer calls [`WorkUnit::check_row`] once per row it touches.
//! The hook is synchronous and, after context resolution, performs no
//! data-store reads: the decision is a pure in-memory evaluation, and the
//! only I/O is the shadow-audit flush at commit.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::audit::{AuditRecord, AuditSink};
use crate::bypass::EmergencyBypass;
use crate::context::ResolvedContext;
use crate::decision::{decide, Decision, DenyReason, RowOperation};
use crate::registry::ProjectId;
use crate::rollout::RolloutPhase;

/// An operation blocked by enforcement.
///
/// A distinct type so callers can always tell "not yours" from
/// "doesn't exist".
#[derive(Debug, Clone, Error)]
#[error(
    "access denied: project {project} may not {operation} row in '{resource}' owned by {}: {reason}",
    owner_label(.owner)
)]
pub struct AccessDenied {
    /// Project the unit of work was running as.
    pub project: ProjectId,
    /// Owner of the row, if it carried one.
    pub owner: Option<ProjectId>,
    /// Operation that was attempted.
    pub operation: RowOperation,
    /// Resource the row belongs to.
    pub resource: String,
    /// Why the decision function denied it.
    pub reason: DenyReason,
}

fn owner_label(owner: &Option<ProjectId>) -> String {
    match owner {
        Some(project) => project.to_string(),
        None => "<none>".to_string(),
    }
}

/// Shared services behind every per-row check.
pub struct EnforcementHook {
    audit: Arc<dyn AuditSink>,
    bypass: Arc<EmergencyBypass>,
}

impl EnforcementHook {
    /// Create a hook over an audit sink and the bypass switch.
    pub fn new(audit: Arc<dyn AuditSink>, bypass: Arc<EmergencyBypass>) -> Self {
        Self { audit, bypass }
    }

    /// Start a unit of work with a freshly resolved context.
    ///
    /// The context moves into the work unit; it cannot be shared with, or
    /// survive into, another unit of work.
    pub fn begin(&self, ctx: ResolvedContext) -> WorkUnit {
        WorkUnit {
            ctx,
            audit: Arc::clone(&self.audit),
            bypass: Arc::clone(&self.bypass),
            pending: Vec::new(),
            actor: None,
            bypass_noted: false,
        }
    }
}

/// One unit of work: a resolved context plus buffered shadow-audit records.
///
/// Shadow records are buffered here and flushed at [`WorkUnit::commit`];
/// an aborted unit discards them, so a rolled-back transaction leaves no
/// partial audit writes.
pub struct WorkUnit {
    ctx: ResolvedContext,
    audit: Arc<dyn AuditSink>,
    bypass: Arc<EmergencyBypass>,
    pending: Vec<AuditRecord>,
    actor: Option<String>,
    bypass_noted: bool,
}

impl std::fmt::Debug for WorkUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkUnit")
            .field("ctx", &self.ctx)
            .field("pending", &self.pending)
            .field("actor", &self.actor)
            .field("bypass_noted", &self.bypass_noted)
            .finish_non_exhaustive()
    }
}

impl WorkUnit {
    /// Attribute shadow-audit records from this unit to an actor.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// The context this unit of work resolved with.
    pub fn context(&self) -> &ResolvedContext {
        &self.ctx
    }

    /// Check one row access.
    pub fn check_row(
        &mut self,
        resource: &str,
        owner: Option<&ProjectId>,
        operation: RowOperation,
    ) -> Result<(), AccessDenied> {
        self.check(resource, owner, operation, None, None)
    }

    /// Check one row mutation, with serialized before/after row images for
    /// the audit trail.
    pub fn check_mutation(
        &mut self,
        resource: &str,
        owner: Option<&ProjectId>,
        operation: RowOperation,
        before: Option<&str>,
        after: Option<&str>,
    ) -> Result<(), AccessDenied> {
        self.check(resource, owner, operation, before, after)
    }

    fn check(
        &mut self,
        resource: &str,
        owner: Option<&ProjectId>,
        operation: RowOperation,
        before: Option<&str>,
        after: Option<&str>,
    ) -> Result<(), AccessDenied> {
        if self.bypass.is_active() {
            if !self.bypass_noted {
                warn!(
                    project = %self.ctx.project(),
                    "emergency bypass active; row checks suspended for this unit of work"
                );
                self.bypass_noted = true;
            }
            return Ok(());
        }

        match self.ctx.phase() {
            // Legacy behavior: the decision function's answer is ignored.
            RolloutPhase::Pending => Ok(()),
            RolloutPhase::Shadow => {
                if let Decision::Deny(reason) = decide(&self.ctx, owner, operation) {
                    debug!(
                        project = %self.ctx.project(),
                        resource,
                        %operation,
                        %reason,
                        "shadow: operation would have been denied"
                    );
                    let mut record = AuditRecord::would_deny(
                        self.ctx.project().clone(),
                        resource,
                        operation,
                        owner.cloned(),
                    )
                    .with_images(before, after);
                    if let Some(actor) = &self.actor {
                        record = record.with_actor(actor.clone());
                    }
                    self.pending.push(record);
                }
                Ok(())
            }
            RolloutPhase::Enforcing | RolloutPhase::Complete => {
                match decide(&self.ctx, owner, operation) {
                    Decision::Allow => Ok(()),
                    Decision::Deny(reason) => Err(AccessDenied {
                        project: self.ctx.project().clone(),
                        owner: owner.cloned(),
                        operation,
                        resource: resource.to_string(),
                        reason,
                    }),
                }
            }
        }
    }

    /// Shadow-audit records buffered so far.
    pub fn pending_audit(&self) -> &[AuditRecord] {
        &self.pending
    }

    /// Finish the unit of work, flushing buffered shadow-audit records.
    ///
    /// A delivery failure is logged and alerted, never surfaced to the
    /// caller: audit problems must not fail the primary operation.
    pub fn commit(mut self) {
        for record in self.pending.drain(..) {
            let id = record.id_hex();
            if let Err(e) = self.audit.append(record) {
                error!(record = %id, error = %e, "failed to deliver shadow audit record");
            }
        }
        if let Err(e) = self.audit.flush() {
            error!(error = %e, "failed to flush shadow audit records");
        }
    }

    /// Abandon the unit of work, discarding buffered audit records.
    pub fn abort(self) {
        if !self.pending.is_empty() {
            debug!(
                project = %self.ctx.project(),
                discarded = self.pending.len(),
                "discarding shadow audit records for aborted unit of work"
            );
        }
    }
}
