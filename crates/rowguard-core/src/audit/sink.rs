//! Audit sink trait and in-memory/stderr backends.

use parking_lot::Mutex;
use thiserror::Error;

use super::record::AuditRecord;

/// Audit delivery error.
#[derive(Debug, Error)]
#[error("audit sink error: {0}")]
pub struct AuditSinkError(pub String);

/// Trait for shadow-audit backends.
///
/// Sinks are never subject to the access control they audit; a record
/// handed to `append` is either durably accepted or an error is returned
/// for the caller to surface operationally.
pub trait AuditSink: Send + Sync {
    /// Accept an audit record.
    fn append(&self, record: AuditRecord) -> Result<(), AuditSinkError>;

    /// Flush any buffered records.
    fn flush(&self) -> Result<(), AuditSinkError>;
}

/// In-memory audit sink for testing.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    /// Create a new memory sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all collected records.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    /// Clear all records.
    pub fn clear(&self) {
        self.records.lock().clear();
    }

    /// Get record count.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&self, record: AuditRecord) -> Result<(), AuditSinkError> {
        self.records.lock().push(record);
        Ok(())
    }

    fn flush(&self) -> Result<(), AuditSinkError> {
        Ok(())
    }
}

/// Audit sink that prints to stderr, for interactive debugging.
#[derive(Debug, Default)]
pub struct StderrAuditSink;

impl AuditSink for StderrAuditSink {
    fn append(&self, record: AuditRecord) -> Result<(), AuditSinkError> {
        eprintln!("[SHADOW-AUDIT] {}", record.to_log_line());
        Ok(())
    }

    fn flush(&self) -> Result<(), AuditSinkError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::RowOperation;
    use crate::registry::ProjectId;

    #[test]
    fn test_memory_sink() {
        let sink = MemoryAuditSink::new();
        assert!(sink.is_empty());

        sink.append(AuditRecord::would_deny(
            ProjectId::new("alpha"),
            "notes",
            RowOperation::Read,
            None,
        ))
        .unwrap();
        sink.append(AuditRecord::would_deny(
            ProjectId::new("beta"),
            "notes",
            RowOperation::Delete,
            Some(ProjectId::new("alpha")),
        ))
        .unwrap();
        sink.flush().unwrap();

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.records()[1].requesting_project, ProjectId::new("beta"));

        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn test_stderr_sink_does_not_panic() {
        let sink = StderrAuditSink;
        sink.append(AuditRecord::would_deny(
            ProjectId::new("alpha"),
            "notes",
            RowOperation::Read,
            None,
        ))
        .unwrap();
        sink.flush().unwrap();
    }
}
