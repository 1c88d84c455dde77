//! Emergency bypass switch.
//!
//! A privileged escape hatch for operators debugging the policy itself:
//! while active, the enforcement hook permits everything unconditionally.
//! It is never reachable from request-handling code; activation goes
//! through the engine's operator surface. State is persisted so "is bypass
//! active, who turned it on, since when" stays answerable across restarts.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::warn;

use crate::clock::current_timestamp;
use crate::error::{AuthzError, AuthzResult};

const BYPASS_TREE_NAME: &[u8] = b"bypass:state";
const STATE_KEY: &[u8] = b"state";

/// Current bypass state.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct BypassStatus {
    /// Whether the bypass is active.
    pub active: bool,
    /// Operator who last activated it.
    pub operator: Option<String>,
    /// When it was activated (microseconds since epoch).
    pub activated_at: Option<u64>,
}

/// The bypass switch.
///
/// The hot-path query [`EmergencyBypass::is_active`] is a single atomic
/// load; the persisted state behind the lock only changes on the rare
/// operator activation/deactivation.
pub struct EmergencyBypass {
    tree: sled::Tree,
    active: AtomicBool,
    state: Mutex<BypassStatus>,
}

impl EmergencyBypass {
    /// Open the bypass switch, restoring persisted state.
    pub fn open(db: &sled::Db) -> AuthzResult<Self> {
        let tree = db.open_tree(BYPASS_TREE_NAME)?;
        let status: BypassStatus = match tree.get(STATE_KEY)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| AuthzError::Deserialization(e.to_string()))?,
            None => BypassStatus::default(),
        };
        if status.active {
            warn!(
                operator = status.operator.as_deref().unwrap_or("<unknown>"),
                "emergency bypass was left active by a previous run"
            );
        }
        Ok(Self {
            tree,
            active: AtomicBool::new(status.active),
            state: Mutex::new(status),
        })
    }

    /// Check whether the bypass is active. Cheap; called per row.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    /// Activate the bypass.
    ///
    /// Fails if already active, so double activations are visible instead
    /// of silently absorbed.
    pub fn activate(&self, operator: &str) -> AuthzResult<()> {
        let mut state = self.state.lock();
        if state.active {
            return Err(AuthzError::BypassAlreadyActive);
        }
        *state = BypassStatus {
            active: true,
            operator: Some(operator.to_string()),
            activated_at: Some(current_timestamp()),
        };
        self.persist(&state)?;
        self.active.store(true, Ordering::SeqCst);
        warn!(operator, "EMERGENCY BYPASS ACTIVATED: every row check will permit");
        Ok(())
    }

    /// Deactivate the bypass. Fails if not active.
    pub fn deactivate(&self, operator: &str) -> AuthzResult<()> {
        let mut state = self.state.lock();
        if !state.active {
            return Err(AuthzError::BypassNotActive);
        }
        *state = BypassStatus::default();
        self.persist(&state)?;
        self.active.store(false, Ordering::SeqCst);
        warn!(operator, "emergency bypass deactivated");
        Ok(())
    }

    /// Current state, for operator tooling.
    pub fn status(&self) -> BypassStatus {
        self.state.lock().clone()
    }

    fn persist(&self, status: &BypassStatus) -> AuthzResult<()> {
        let value =
            serde_json::to_vec(status).map_err(|e| AuthzError::Serialization(e.to_string()))?;
        self.tree.insert(STATE_KEY, value)?;
        self.tree.flush()?;
        Ok(())
    }
}
