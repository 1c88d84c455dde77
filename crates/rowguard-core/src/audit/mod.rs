//! Shadow audit log.
//!
//! While a project is in shadow, every operation that would have been
//! denied is recorded here instead of blocked. The log is append-only and
//! is never itself subject to the access control it audits.

pub mod record;
pub mod sink;
pub mod store;

pub use record::{AuditRecord, TriageResolution};
pub use sink::{AuditSink, AuditSinkError, MemoryAuditSink, StderrAuditSink};
pub use store::SledAuditStore;
