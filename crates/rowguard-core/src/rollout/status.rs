//! Per-project rollout status persistence.
//!
//! One status row per project plus an observed-unit-of-work counter used by
//! the promotion gate. Status rows are mutated only by the rollout
//! controller, never by request traffic.

use tracing::{debug, info};

use super::phase::RolloutPhase;
use crate::clock::current_timestamp;
use crate::error::{AuthzError, AuthzResult};
use crate::registry::ProjectId;

const STATUS_TREE_NAME: &[u8] = b"rollout:status";
const STATUS_PREFIX: &[u8] = b"status:";
const OBSERVED_PREFIX: &[u8] = b"obs:";

/// Rollout status of a single project.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RolloutStatus {
    /// Project this status belongs to.
    pub project_id: ProjectId,
    /// Current rollout phase.
    pub phase: RolloutPhase,
    /// When the current phase was entered (microseconds since epoch).
    pub transitioned_at: u64,
    /// Start of the current observation window; set while in `Shadow`.
    pub observation_started_at: Option<u64>,
}

/// Store for rollout status rows and observation counters.
pub struct RolloutStore {
    tree: sled::Tree,
}

impl RolloutStore {
    /// Open the rollout store.
    pub fn open(db: &sled::Db) -> AuthzResult<Self> {
        let tree = db.open_tree(STATUS_TREE_NAME)?;
        Ok(Self { tree })
    }

    /// Load the status row for a project, if one exists.
    pub fn status_of(&self, id: &ProjectId) -> AuthzResult<Option<RolloutStatus>> {
        match self.tree.get(Self::status_key(id))? {
            Some(bytes) => Ok(Some(
                serde_json::from_slice(&bytes)
                    .map_err(|e| AuthzError::Deserialization(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    /// Get the current phase for a project.
    ///
    /// A project with no status row is `Pending`: it behaves as fully
    /// legacy until the rollout controller moves it. Fail-open by design,
    /// carried from the source system.
    pub fn phase_of(&self, id: &ProjectId) -> AuthzResult<RolloutPhase> {
        match self.status_of(id)? {
            Some(status) => Ok(status.phase),
            None => {
                debug!(project = %id, "no rollout status row; defaulting to pending");
                Ok(RolloutPhase::Pending)
            }
        }
    }

    /// Apply a phase transition.
    ///
    /// Rejects transitions the mechanism disallows (see
    /// [`RolloutPhase::can_transition_to`]). Entering `Shadow` starts a
    /// fresh observation window. The new status is persisted atomically;
    /// in-flight units of work keep the phase their context resolved with.
    pub fn transition(&self, id: &ProjectId, to: RolloutPhase) -> AuthzResult<RolloutStatus> {
        let from = self.phase_of(id)?;
        if !from.can_transition_to(to) {
            return Err(AuthzError::InvalidTransition { from, to });
        }

        let now = current_timestamp();
        let status = RolloutStatus {
            project_id: id.clone(),
            phase: to,
            transitioned_at: now,
            observation_started_at: (to == RolloutPhase::Shadow).then_some(now),
        };
        if to == RolloutPhase::Shadow {
            self.zero_observed(id)?;
        }
        let value =
            serde_json::to_vec(&status).map_err(|e| AuthzError::Serialization(e.to_string()))?;
        self.tree.insert(Self::status_key(id), value)?;
        self.tree.flush()?;
        info!(project = %id, from = %from, to = %to, "rollout phase transition");
        Ok(status)
    }

    /// Restart the observation window for a project in `Shadow`.
    ///
    /// Used after a code or permission change invalidates what was observed
    /// so far. No-op outside `Shadow`.
    pub fn reset_observation(&self, id: &ProjectId) -> AuthzResult<()> {
        let Some(mut status) = self.status_of(id)? else {
            return Ok(());
        };
        if status.phase != RolloutPhase::Shadow {
            return Ok(());
        }
        status.observation_started_at = Some(current_timestamp());
        self.zero_observed(id)?;
        let value =
            serde_json::to_vec(&status).map_err(|e| AuthzError::Serialization(e.to_string()))?;
        self.tree.insert(Self::status_key(id), value)?;
        info!(project = %id, "observation window reset");
        Ok(())
    }

    /// Count one resolved unit of work against the observation window.
    ///
    /// Called once per unit of work by the resolver, never on the per-row
    /// path. Returns the new count.
    pub fn record_observed_unit(&self, id: &ProjectId) -> AuthzResult<u64> {
        let updated = self.tree.update_and_fetch(Self::observed_key(id), |old| {
            let current = old.map(decode_u64).unwrap_or(0);
            Some((current + 1).to_be_bytes().to_vec())
        })?;
        Ok(updated.as_deref().map(decode_u64).unwrap_or(0))
    }

    /// Get the number of units of work observed in the current window.
    pub fn observed_units(&self, id: &ProjectId) -> AuthzResult<u64> {
        Ok(self
            .tree
            .get(Self::observed_key(id))?
            .as_deref()
            .map(decode_u64)
            .unwrap_or(0))
    }

    fn zero_observed(&self, id: &ProjectId) -> AuthzResult<()> {
        self.tree
            .insert(Self::observed_key(id), 0u64.to_be_bytes().to_vec())?;
        Ok(())
    }

    fn status_key(id: &ProjectId) -> Vec<u8> {
        let mut key = STATUS_PREFIX.to_vec();
        key.extend_from_slice(id.as_str().as_bytes());
        key
    }

    fn observed_key(id: &ProjectId) -> Vec<u8> {
        let mut key = OBSERVED_PREFIX.to_vec();
        key.extend_from_slice(id.as_str().as_bytes());
        key
    }
}

fn decode_u64(bytes: &[u8]) -> u64 {
    match <[u8; 8]>::try_from(bytes) {
        Ok(buf) => u64::from_be_bytes(buf),
        Err(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (RolloutStore, sled::Db) {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let store = RolloutStore::open(&db).unwrap();
        (store, db)
    }

    #[test]
    fn test_missing_status_defaults_to_pending() {
        let (store, _db) = test_store();
        let id = ProjectId::new("alpha");
        assert!(store.status_of(&id).unwrap().is_none());
        assert_eq!(store.phase_of(&id).unwrap(), RolloutPhase::Pending);
    }

    #[test]
    fn test_transition_lifecycle() {
        let (store, _db) = test_store();
        let id = ProjectId::new("alpha");

        let status = store.transition(&id, RolloutPhase::Shadow).unwrap();
        assert_eq!(status.phase, RolloutPhase::Shadow);
        assert!(status.observation_started_at.is_some());

        let status = store.transition(&id, RolloutPhase::Enforcing).unwrap();
        assert_eq!(status.phase, RolloutPhase::Enforcing);
        assert!(status.observation_started_at.is_none());

        let status = store.transition(&id, RolloutPhase::Complete).unwrap();
        assert_eq!(status.phase, RolloutPhase::Complete);
        assert_eq!(store.phase_of(&id).unwrap(), RolloutPhase::Complete);
    }

    #[test]
    fn test_invalid_transition_rejected() {
        let (store, _db) = test_store();
        let id = ProjectId::new("alpha");
        store.transition(&id, RolloutPhase::Complete).unwrap();

        let err = store.transition(&id, RolloutPhase::Enforcing).unwrap_err();
        assert!(matches!(
            err,
            AuthzError::InvalidTransition {
                from: RolloutPhase::Complete,
                to: RolloutPhase::Enforcing,
            }
        ));
        // No partial state change.
        assert_eq!(store.phase_of(&id).unwrap(), RolloutPhase::Complete);
    }

    #[test]
    fn test_emergency_stop() {
        let (store, _db) = test_store();
        let id = ProjectId::new("alpha");
        store.transition(&id, RolloutPhase::Enforcing).unwrap();
        store.transition(&id, RolloutPhase::Pending).unwrap();
        assert_eq!(store.phase_of(&id).unwrap(), RolloutPhase::Pending);
    }

    #[test]
    fn test_observed_units_counting() {
        let (store, _db) = test_store();
        let id = ProjectId::new("alpha");
        store.transition(&id, RolloutPhase::Shadow).unwrap();

        assert_eq!(store.observed_units(&id).unwrap(), 0);
        assert_eq!(store.record_observed_unit(&id).unwrap(), 1);
        assert_eq!(store.record_observed_unit(&id).unwrap(), 2);
        assert_eq!(store.observed_units(&id).unwrap(), 2);
    }

    #[test]
    fn test_entering_shadow_resets_counter() {
        let (store, _db) = test_store();
        let id = ProjectId::new("alpha");
        store.transition(&id, RolloutPhase::Shadow).unwrap();
        store.record_observed_unit(&id).unwrap();
        store.record_observed_unit(&id).unwrap();

        store.transition(&id, RolloutPhase::Pending).unwrap();
        store.transition(&id, RolloutPhase::Shadow).unwrap();
        assert_eq!(store.observed_units(&id).unwrap(), 0);
    }

    #[test]
    fn test_reset_observation() {
        let (store, _db) = test_store();
        let id = ProjectId::new("alpha");
        store.transition(&id, RolloutPhase::Shadow).unwrap();
        store.record_observed_unit(&id).unwrap();
        let first_window = store
            .status_of(&id)
            .unwrap()
            .unwrap()
            .observation_started_at
            .unwrap();

        store.reset_observation(&id).unwrap();
        let status = store.status_of(&id).unwrap().unwrap();
        assert!(status.observation_started_at.unwrap() >= first_window);
        assert_eq!(store.observed_units(&id).unwrap(), 0);

        // Outside shadow the reset is a no-op.
        store.transition(&id, RolloutPhase::Enforcing).unwrap();
        store.reset_observation(&id).unwrap();
        assert_eq!(
            store.status_of(&id).unwrap().unwrap().phase,
            RolloutPhase::Enforcing
        );
    }
}
