//! Persistent, append-only shadow audit storage.
//!
//! Records are rkyv-serialized into a dedicated sled tree, keyed
//! `project\0record_id` so per-project scans come back in time order.

use super::record::{AuditRecord, TriageResolution};
use super::sink::{AuditSink, AuditSinkError};
use crate::error::AuthzResult;
use crate::registry::ProjectId;

const AUDIT_TREE_NAME: &[u8] = b"audit:shadow";
const KEY_SEPARATOR: u8 = 0;

/// Sled-backed audit store.
///
/// Append-only from the enforcement hook's perspective; triage marking is
/// the one administrative mutation.
pub struct SledAuditStore {
    tree: sled::Tree,
}

impl SledAuditStore {
    /// Open the audit store.
    pub fn open(db: &sled::Db) -> AuthzResult<Self> {
        let tree = db.open_tree(AUDIT_TREE_NAME)?;
        Ok(Self { tree })
    }

    /// Append a record.
    pub fn append_record(&self, record: &AuditRecord) -> AuthzResult<()> {
        let key = Self::record_key(&record.requesting_project, &record.id);
        self.tree.insert(key, record.to_bytes()?)?;
        Ok(())
    }

    /// List records, optionally filtered by project and a `logged_at` lower
    /// bound (microseconds, inclusive). Returned in chronological order.
    pub fn list(
        &self,
        project: Option<&ProjectId>,
        since: Option<u64>,
    ) -> AuthzResult<Vec<AuditRecord>> {
        let mut records = Vec::new();
        match project {
            Some(project) => {
                for result in self.tree.scan_prefix(Self::project_prefix(project)) {
                    let (_, value) = result?;
                    records.push(AuditRecord::from_bytes(&value)?);
                }
            }
            None => {
                for result in self.tree.iter() {
                    let (_, value) = result?;
                    records.push(AuditRecord::from_bytes(&value)?);
                }
                records.sort_by_key(|r| r.logged_at);
            }
        }
        if let Some(since) = since {
            records.retain(|r| r.logged_at >= since);
        }
        Ok(records)
    }

    /// Find a record by id.
    pub fn find(&self, id: &[u8; 16]) -> AuthzResult<Option<AuditRecord>> {
        // Ids are globally unique; a scan is fine at audit-review volumes.
        for result in self.tree.iter() {
            let (_, value) = result?;
            let record = AuditRecord::from_bytes(&value)?;
            if &record.id == id {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Mark a record as triaged. Returns false if the record is unknown.
    pub fn triage(&self, id: &[u8; 16], resolution: TriageResolution) -> AuthzResult<bool> {
        let Some(mut record) = self.find(id)? else {
            return Ok(false);
        };
        record.triage = Some(resolution);
        let key = Self::record_key(&record.requesting_project, &record.id);
        self.tree.insert(key, record.to_bytes()?)?;
        Ok(true)
    }

    /// Count untriaged violations for a project over all time.
    pub fn untriaged_count(&self, project: &ProjectId) -> AuthzResult<u64> {
        let mut count = 0;
        for result in self.tree.scan_prefix(Self::project_prefix(project)) {
            let (_, value) = result?;
            let record = AuditRecord::from_bytes(&value)?;
            if record.would_be_denied && !record.is_triaged() {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Count would-be-denied records for a project since a timestamp.
    pub fn count_since(&self, project: &ProjectId, since: u64) -> AuthzResult<u64> {
        let mut count = 0;
        for result in self.tree.scan_prefix(Self::project_prefix(project)) {
            let (_, value) = result?;
            let record = AuditRecord::from_bytes(&value)?;
            if record.would_be_denied && record.logged_at >= since {
                count += 1;
            }
        }
        Ok(count)
    }

    fn project_prefix(project: &ProjectId) -> Vec<u8> {
        let mut key = project.as_str().as_bytes().to_vec();
        key.push(KEY_SEPARATOR);
        key
    }

    fn record_key(project: &ProjectId, id: &[u8; 16]) -> Vec<u8> {
        let mut key = Self::project_prefix(project);
        key.extend_from_slice(id);
        key
    }
}

impl AuditSink for SledAuditStore {
    fn append(&self, record: AuditRecord) -> Result<(), AuditSinkError> {
        self.append_record(&record)
            .map_err(|e| AuditSinkError(e.to_string()))
    }

    fn flush(&self) -> Result<(), AuditSinkError> {
        self.tree
            .flush()
            .map(|_| ())
            .map_err(|e| AuditSinkError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::RowOperation;

    fn test_store() -> (SledAuditStore, sled::Db) {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let store = SledAuditStore::open(&db).unwrap();
        (store, db)
    }

    fn record_for(project: &str) -> AuditRecord {
        AuditRecord::would_deny(
            ProjectId::new(project),
            "notes",
            RowOperation::Read,
            Some(ProjectId::new("owner")),
        )
    }

    #[test]
    fn test_append_and_list() {
        let (store, _db) = test_store();
        let alpha = record_for("alpha");
        let beta = record_for("beta");
        store.append_record(&alpha).unwrap();
        store.append_record(&beta).unwrap();

        let all = store.list(None, None).unwrap();
        assert_eq!(all.len(), 2);

        let only_alpha = store.list(Some(&ProjectId::new("alpha")), None).unwrap();
        assert_eq!(only_alpha.len(), 1);
        assert_eq!(only_alpha[0].id, alpha.id);
    }

    #[test]
    fn test_list_since_filter() {
        let (store, _db) = test_store();
        let early = record_for("alpha");
        store.append_record(&early).unwrap();
        let cutoff = early.logged_at + 1;

        let mut late = record_for("alpha");
        late.logged_at = cutoff + 10;
        store.append_record(&late).unwrap();

        let recent = store
            .list(Some(&ProjectId::new("alpha")), Some(cutoff))
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, late.id);
    }

    #[test]
    fn test_per_project_chronological_order() {
        let (store, _db) = test_store();
        let first = record_for("alpha");
        let second = record_for("alpha");
        store.append_record(&second).unwrap();
        store.append_record(&first).unwrap();

        let listed = store.list(Some(&ProjectId::new("alpha")), None).unwrap();
        assert_eq!(listed[0].id, first.id);
        assert_eq!(listed[1].id, second.id);
    }

    #[test]
    fn test_triage() {
        let (store, _db) = test_store();
        let record = record_for("alpha");
        store.append_record(&record).unwrap();

        let alpha = ProjectId::new("alpha");
        assert_eq!(store.untriaged_count(&alpha).unwrap(), 1);

        assert!(store
            .triage(&record.id, TriageResolution::FixedForward)
            .unwrap());
        assert_eq!(store.untriaged_count(&alpha).unwrap(), 0);

        let found = store.find(&record.id).unwrap().unwrap();
        assert_eq!(found.triage, Some(TriageResolution::FixedForward));

        assert!(!store.triage(&[9u8; 16], TriageResolution::Accepted).unwrap());
    }

    #[test]
    fn test_count_since() {
        let (store, _db) = test_store();
        let record = record_for("alpha");
        store.append_record(&record).unwrap();

        let alpha = ProjectId::new("alpha");
        assert_eq!(store.count_since(&alpha, 0).unwrap(), 1);
        assert_eq!(store.count_since(&alpha, record.logged_at + 1).unwrap(), 0);
    }
}
