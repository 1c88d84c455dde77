//! Rowguard Core - namespace-isolation authorization for multi-tenant row
//! stores.
//!
//! Every read and write against a shared store is checked against the
//! requesting tenant ("project"): reads are limited by the project's access
//! class and explicit grants, writes never cross project boundaries. The
//! policy rolls out per project through observe-then-enforce phases, so a
//! live system can adopt isolation without a big-bang cutover.
//!
//! # Model
//!
//! A host resolves a [`ResolvedContext`] once per unit of work and drives a
//! [`WorkUnit`] through the storage layer's per-row interception point. The
//! context carries the full readable set, so each row check is a pure
//! in-memory test.
//!
//! # Example
//!
//! ```ignore
//! use rowguard_core::{AccessClass, EngineConfig, IsolationEngine, ProjectId, RowOperation};
//!
//! let engine = IsolationEngine::open(EngineConfig::new("./authz-data"))?;
//! engine.register_project("alpha", "Alpha Team", AccessClass::Isolated)?;
//!
//! // One unit of work:
//! let mut work = engine.begin_work(&ProjectId::new("alpha"))?;
//! for row in rows {
//!     work.check_row("documents", row.owner.as_ref(), RowOperation::Read)?;
//! }
//! work.commit();
//! ```

pub mod audit;
pub mod bypass;
pub mod clock;
pub mod context;
pub mod decision;
pub mod enforce;
pub mod engine;
pub mod error;
pub mod registry;
pub mod rollout;

// Error types
pub use error::{AuthzError, AuthzResult};

// Registry types
pub use registry::{AccessClass, PermissionGrant, ProjectEntry, ProjectId, RegistryStore};

// Rollout types
pub use rollout::{
    GateConfig, GateViolation, PromotionGate, RolloutPhase, RolloutStatus, RolloutStore,
};

// Context types
pub use context::{ContextResolver, ResolvedContext};

// Decision types
pub use decision::{decide, Decision, DenyReason, RowOperation};

// Enforcement types
pub use enforce::{AccessDenied, EnforcementHook, WorkUnit};

// Audit types
pub use audit::{
    AuditRecord, AuditSink, AuditSinkError, MemoryAuditSink, SledAuditStore, StderrAuditSink,
    TriageResolution,
};

// Bypass types
pub use bypass::{BypassStatus, EmergencyBypass};

// Engine facade
pub use engine::{EngineConfig, IsolationEngine};
