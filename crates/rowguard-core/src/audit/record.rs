//! Shadow audit record definition.

use rkyv::{Archive, Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::clock::current_timestamp;
use crate::decision::RowOperation;
use crate::error::{AuthzError, AuthzResult};
use crate::registry::ProjectId;

/// Counter for generating unique record IDs.
static RECORD_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a unique record ID from timestamp and counter.
///
/// The timestamp prefix keeps ids chronologically ordered, so per-project
/// range scans come back in time order.
fn generate_record_id() -> [u8; 16] {
    let ts = current_timestamp();
    let counter = RECORD_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut id = [0u8; 16];
    id[0..8].copy_from_slice(&ts.to_be_bytes());
    id[8..16].copy_from_slice(&counter.to_be_bytes());
    id
}

/// How a historical violation was resolved during rollout triage.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize, serde::Serialize, serde::Deserialize,
)]
pub enum TriageResolution {
    /// The offending access pattern was fixed.
    FixedForward,
    /// The violation was reviewed and explicitly accepted.
    Accepted,
}

impl fmt::Display for TriageResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriageResolution::FixedForward => write!(f, "fixed-forward"),
            TriageResolution::Accepted => write!(f, "accepted"),
        }
    }
}

impl FromStr for TriageResolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fixed-forward" | "fixed_forward" => Ok(TriageResolution::FixedForward),
            "accepted" => Ok(TriageResolution::Accepted),
            other => Err(format!(
                "unknown resolution '{}' (expected: fixed-forward, accepted)",
                other
            )),
        }
    }
}

/// A "would have been denied" record produced while a project is in shadow.
///
/// Append-only; triage marking is the one administrative mutation.
#[derive(Debug, Clone, Archive, Serialize, Deserialize, serde::Serialize, serde::Deserialize)]
pub struct AuditRecord {
    /// Unique record ID.
    pub id: [u8; 16],
    /// When the decision was recorded (microseconds since epoch).
    pub logged_at: u64,
    /// Project the unit of work was running as.
    pub requesting_project: ProjectId,
    /// Resource (table/collection) the row belongs to.
    pub resource: String,
    /// Operation that was attempted.
    pub operation: RowOperation,
    /// Owner of the touched row, if the row carried one.
    pub owning_project: Option<ProjectId>,
    /// Whether enforcement would have denied the operation.
    pub would_be_denied: bool,
    /// Serialized row image before the operation, if the caller provided one.
    pub before_image: Option<String>,
    /// Serialized row image after the operation, if the caller provided one.
    pub after_image: Option<String>,
    /// Who performed the unit of work.
    pub actor: String,
    /// Triage outcome, once an operator has reviewed the violation.
    pub triage: Option<TriageResolution>,
}

impl AuditRecord {
    /// Create a would-be-denied record.
    pub fn would_deny(
        requesting_project: ProjectId,
        resource: impl Into<String>,
        operation: RowOperation,
        owning_project: Option<ProjectId>,
    ) -> Self {
        Self {
            id: generate_record_id(),
            logged_at: current_timestamp(),
            actor: requesting_project.as_str().to_string(),
            requesting_project,
            resource: resource.into(),
            operation,
            owning_project,
            would_be_denied: true,
            before_image: None,
            after_image: None,
            triage: None,
        }
    }

    /// Attach row images.
    pub fn with_images(mut self, before: Option<&str>, after: Option<&str>) -> Self {
        self.before_image = before.map(str::to_string);
        self.after_image = after.map(str::to_string);
        self
    }

    /// Attribute the record to a specific actor.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    /// Hex representation of the record id.
    pub fn id_hex(&self) -> String {
        hex::encode(self.id)
    }

    /// Parse a record id from its hex representation.
    pub fn parse_id(s: &str) -> Option<[u8; 16]> {
        hex::decode(s).ok()?.try_into().ok()
    }

    /// Check whether the record has been triaged.
    pub fn is_triaged(&self) -> bool {
        self.triage.is_some()
    }

    /// Format the record as a log line.
    pub fn to_log_line(&self) -> String {
        let owner = match &self.owning_project {
            Some(p) => p.as_str(),
            None => "<none>",
        };
        format!(
            "{} id={} project={} op={} resource={} owner={} actor={} triage={}",
            self.logged_at,
            self.id_hex(),
            self.requesting_project,
            self.operation,
            self.resource,
            owner,
            self.actor,
            match self.triage {
                Some(resolution) => resolution.to_string(),
                None => "open".to_string(),
            }
        )
    }

    /// Serialize the record to bytes.
    pub fn to_bytes(&self) -> AuthzResult<Vec<u8>> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| AuthzError::Serialization(e.to_string()))
    }

    /// Deserialize a record from bytes.
    pub fn from_bytes(bytes: &[u8]) -> AuthzResult<Self> {
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(bytes)
            .map_err(|e| AuthzError::Deserialization(e.to_string()))
    }
}
