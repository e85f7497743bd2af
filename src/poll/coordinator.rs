//! PollCoordinator: fixed-interval refresh of every registered device
//!
//! Each tick re-reads the registry and spawns one independent
//! status → sessions pipeline per device. A slow or failing device never
//! delays the others, and errors stay in that device's live state.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, MissedTickBehavior};

use crate::config::PollConfig;
use crate::device::{DeviceApi, DeviceConnector};
use crate::error::{AppError, DeviceError};
use crate::models::{DeviceConfig, EventFrame, SessionMeta, StatusSnapshot};
use crate::poll::state::{DeviceLiveState, LiveStateStore, StatePatch};
use crate::registry::DeviceRegistry;

/// What happened to a refresh result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied,
    /// Device removed, or a newer result landed first
    Dropped,
    UnknownDevice,
}

pub struct PollCoordinator {
    registry: Arc<DeviceRegistry>,
    state: LiveStateStore,
    connector: Arc<dyn DeviceConnector>,
    interval: Duration,
    add_refresh_delay: Duration,
    /// Devices with an outstanding refresh from the sweep
    sweep_in_flight: Mutex<HashSet<String>>,
    seq: AtomicU64,
}

impl PollCoordinator {
    pub async fn new(
        registry: Arc<DeviceRegistry>,
        connector: Arc<dyn DeviceConnector>,
        config: &PollConfig,
    ) -> Arc<Self> {
        let state = LiveStateStore::new();
        for device in registry.list().await {
            state.track(&device.id).await;
        }

        Arc::new(Self {
            registry,
            state,
            connector,
            interval: config.interval(),
            add_refresh_delay: config.add_refresh_delay(),
            sweep_in_flight: Mutex::new(HashSet::new()),
            seq: AtomicU64::new(0),
        })
    }

    pub fn connector(&self) -> &Arc<dyn DeviceConnector> {
        &self.connector
    }

    pub async fn device(&self, device_id: &str) -> Option<DeviceConfig> {
        self.registry.get(device_id).await
    }

    // ========================================================================
    // Device lifecycle
    // ========================================================================

    /// Register a device and schedule its first refresh after the add delay
    pub async fn add_device(
        self: &Arc<Self>,
        url: &str,
        name: Option<&str>,
    ) -> Result<DeviceConfig, AppError> {
        let device = self.registry.add(url, name).await?;
        self.state.track(&device.id).await;
        self.schedule_refresh(&device.id, self.add_refresh_delay);
        Ok(device)
    }

    pub async fn update_device(
        &self,
        device_id: &str,
        name: Option<&str>,
        url: Option<&str>,
    ) -> Result<Option<DeviceConfig>, AppError> {
        self.registry.update(device_id, name, url).await
    }

    /// Remove a device and its live state. Idempotent.
    pub async fn remove_device(&self, device_id: &str) -> bool {
        let removed = self.registry.remove(device_id).await.is_some();
        self.state.forget(device_id).await;
        self.sweep_in_flight.lock().await.remove(device_id);
        removed
    }

    fn schedule_refresh(self: &Arc<Self>, device_id: &str, delay: Duration) {
        let this = Arc::clone(self);
        let device_id = device_id.to_string();
        tokio::spawn(async move {
            time::sleep(delay).await;
            // Failures are already recorded in the device's state
            let _ = this.refresh(&device_id).await;
        });
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    /// Fetch status then sessions for one device and merge the result.
    ///
    /// On failure the previous status/sessions stay and the error text is
    /// recorded until the next successful refresh.
    pub async fn refresh(&self, device_id: &str) -> Result<RefreshOutcome, DeviceError> {
        let Some(device) = self.registry.get(device_id).await else {
            return Ok(RefreshOutcome::UnknownDevice);
        };

        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let client = self.connector.connect(&device.url);

        match Self::fetch(client.as_ref()).await {
            Ok((status, sessions)) => {
                let applied = self
                    .state
                    .apply(
                        device_id,
                        StatePatch::Refreshed {
                            seq,
                            status,
                            sessions,
                        },
                    )
                    .await;

                if applied {
                    tracing::debug!("[PollCoordinator] Device {} refreshed", device.name);
                    Ok(RefreshOutcome::Applied)
                } else {
                    tracing::debug!(
                        "[PollCoordinator] Dropped stale refresh for {}",
                        device_id
                    );
                    Ok(RefreshOutcome::Dropped)
                }
            }
            Err(e) => {
                tracing::warn!(
                    "[PollCoordinator] Device {} ({}) refresh failed: {}",
                    device.name,
                    device.url,
                    e
                );
                self.state
                    .apply(
                        device_id,
                        StatePatch::RefreshFailed {
                            seq,
                            message: e.to_string(),
                        },
                    )
                    .await;
                Err(e)
            }
        }
    }

    async fn fetch(
        client: &dyn DeviceApi,
    ) -> Result<(StatusSnapshot, Vec<SessionMeta>), DeviceError> {
        let status = client.status().await?;
        let sessions = client.sessions().await?;
        Ok((status, sessions.sessions))
    }

    /// Refresh every registered device concurrently and wait for all of them
    pub async fn refresh_all(&self) -> Vec<(String, Result<RefreshOutcome, DeviceError>)> {
        let devices = self.registry.list().await;
        let results = join_all(devices.iter().map(|d| self.refresh(&d.id))).await;
        devices.into_iter().map(|d| d.id).zip(results).collect()
    }

    /// Spawn one refresh per registered device. Devices whose previous sweep
    /// refresh is still outstanding are skipped. Returns how many were spawned.
    pub async fn sweep(self: &Arc<Self>) -> usize {
        let devices = self.registry.list().await;
        if devices.is_empty() {
            return 0;
        }

        let mut spawned = 0;
        for device in devices {
            if !self.sweep_in_flight.lock().await.insert(device.id.clone()) {
                tracing::debug!(
                    "[PollCoordinator] Device {} still refreshing, skipping tick",
                    device.name
                );
                continue;
            }

            let this = Arc::clone(self);
            tokio::spawn(async move {
                let _ = this.refresh(&device.id).await;
                this.sweep_in_flight.lock().await.remove(&device.id);
            });
            spawned += 1;
        }

        tracing::debug!("[PollCoordinator] Sweep spawned {} refreshes", spawned);
        spawned
    }

    /// Start the refresh loop: one sweep now, then one per interval.
    /// The loop stops when the returned handle is shut down or dropped.
    pub fn start(self: &Arc<Self>) -> PollHandle {
        tracing::info!(
            "[PollCoordinator] Starting refresh loop (interval: {}ms)",
            self.interval.as_millis()
        );

        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut ticker = time::interval(this.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                this.sweep().await;
            }
        });

        PollHandle { task }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub async fn snapshot(&self, device_id: &str) -> Option<DeviceLiveState> {
        self.state.snapshot(device_id).await
    }

    /// Every registered device with its live state, in registry order
    pub async fn snapshot_all(&self) -> Vec<(DeviceConfig, DeviceLiveState)> {
        let devices = self.registry.list().await;
        let mut states = self.state.snapshot_all().await;
        devices
            .into_iter()
            .map(|d| {
                let state = states.remove(&d.id).unwrap_or_default();
                (d, state)
            })
            .collect()
    }

    /// Full event sequence of one recorded session. `None` for unknown devices.
    pub async fn fetch_session(
        &self,
        device_id: &str,
        session_id: &str,
    ) -> Result<Option<Vec<EventFrame>>, DeviceError> {
        let Some(device) = self.registry.get(device_id).await else {
            return Ok(None);
        };
        let client = self.connector.connect(&device.url);
        client.session(session_id).await.map(Some)
    }

    /// Single mutation entry point for everything outside the refresh path
    pub(crate) async fn apply(&self, device_id: &str, patch: StatePatch) -> bool {
        self.state.apply(device_id, patch).await
    }
}

/// Owns the refresh loop task; dropping it cancels the interval timer
pub struct PollHandle {
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn shutdown(self) {
        tracing::info!("[PollCoordinator] Stopping refresh loop");
        self.task.abort();
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
