//! Live device state store
//!
//! The coordinator is the only writer. Every refresh result, command error
//! and busy-flag change is a `StatePatch` applied under the store's lock,
//! one at a time. Readers get cloned snapshots.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tokio::sync::RwLock;

use crate::models::{Operation, SessionMeta, StatusSnapshot};

/// Ephemeral per-device state, rebuilt by refreshes and never persisted
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceLiveState {
    pub status: Option<StatusSnapshot>,
    pub sessions: Vec<SessionMeta>,
    pub error: Option<String>,
    pub busy_flags: BTreeMap<String, bool>,
    /// Sequence number of the newest refresh result applied
    #[serde(skip)]
    applied_seq: u64,
}

impl DeviceLiveState {
    pub fn is_busy(&self, op: Operation) -> bool {
        self.busy_flags.get(op.as_str()).copied().unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
pub enum StatePatch {
    /// Successful status + sessions fetch
    Refreshed {
        seq: u64,
        status: StatusSnapshot,
        sessions: Vec<SessionMeta>,
    },
    /// Failed fetch; status and sessions stay as they were
    RefreshFailed { seq: u64, message: String },
    /// A command call failed
    CommandFailed { message: String },
    Busy { op: Operation, busy: bool },
}

#[derive(Default)]
pub struct LiveStateStore {
    devices: RwLock<HashMap<String, DeviceLiveState>>,
}

impl LiveStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a device. Existing state is kept.
    pub async fn track(&self, device_id: &str) {
        let mut devices = self.devices.write().await;
        devices.entry(device_id.to_string()).or_default();
    }

    /// Stop tracking a device. Later patches for it are dropped.
    pub async fn forget(&self, device_id: &str) -> bool {
        self.devices.write().await.remove(device_id).is_some()
    }

    /// Apply one patch. Returns `false` when it was dropped because the
    /// device is no longer tracked or a newer refresh already landed.
    pub async fn apply(&self, device_id: &str, patch: StatePatch) -> bool {
        let mut devices = self.devices.write().await;
        let Some(state) = devices.get_mut(device_id) else {
            return false;
        };

        match patch {
            StatePatch::Refreshed {
                seq,
                status,
                sessions,
            } => {
                if seq < state.applied_seq {
                    return false;
                }
                state.applied_seq = seq;
                state.status = Some(status);
                state.sessions = sessions;
                state.error = None;
            }
            StatePatch::RefreshFailed { seq, message } => {
                if seq < state.applied_seq {
                    return false;
                }
                state.applied_seq = seq;
                state.error = Some(message);
            }
            StatePatch::CommandFailed { message } => {
                state.error = Some(message);
            }
            StatePatch::Busy { op, busy } => {
                state.busy_flags.insert(op.as_str().to_string(), busy);
            }
        }
        true
    }

    pub async fn snapshot(&self, device_id: &str) -> Option<DeviceLiveState> {
        self.devices.read().await.get(device_id).cloned()
    }

    pub async fn snapshot_all(&self) -> HashMap<String, DeviceLiveState> {
        self.devices.read().await.clone()
    }
}
