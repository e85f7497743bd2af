//! CommandDispatcher: user commands against a device
//!
//! Each command raises the device's busy flag for its operation, calls the
//! device, forces a refresh so the effect shows up right away, records any
//! failure as the device error, and lowers the flag last. Flags gate the UI
//! only; the dispatcher does not reject overlapping calls.

use std::sync::Arc;

use serde::Serialize;

use crate::error::DeviceError;
use crate::models::{DeviceConfig, Operation};
use crate::poll::state::StatePatch;
use crate::poll::PollCoordinator;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SetInterval { motor_interval_ms: u64 },
    StartSession { session_id: Option<String> },
    StopSession,
    TriggerMotor,
}

impl Command {
    pub fn operation(&self) -> Operation {
        match self {
            Command::SetInterval { .. } => Operation::SetInterval,
            Command::StartSession { .. } => Operation::Start,
            Command::StopSession => Operation::Stop,
            Command::TriggerMotor => Operation::Trigger,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "error", rename_all = "snake_case")]
pub enum CommandOutcome {
    Completed,
    Failed(String),
    /// Silent no-op
    UnknownDevice,
}

pub struct CommandDispatcher {
    coordinator: Arc<PollCoordinator>,
}

impl CommandDispatcher {
    pub fn new(coordinator: Arc<PollCoordinator>) -> Self {
        Self { coordinator }
    }

    pub async fn set_interval(&self, device_id: &str, motor_interval_ms: u64) -> CommandOutcome {
        self.dispatch(device_id, Command::SetInterval { motor_interval_ms })
            .await
    }

    pub async fn start_session(&self, device_id: &str, session_id: Option<String>) -> CommandOutcome {
        let session_id = session_id.filter(|s| !s.trim().is_empty());
        self.dispatch(device_id, Command::StartSession { session_id })
            .await
    }

    pub async fn stop_session(&self, device_id: &str) -> CommandOutcome {
        self.dispatch(device_id, Command::StopSession).await
    }

    pub async fn trigger_motor(&self, device_id: &str) -> CommandOutcome {
        self.dispatch(device_id, Command::TriggerMotor).await
    }

    pub async fn dispatch(&self, device_id: &str, command: Command) -> CommandOutcome {
        let Some(device) = self.coordinator.device(device_id).await else {
            tracing::debug!("[Dispatcher] Ignoring command for unknown device {}", device_id);
            return CommandOutcome::UnknownDevice;
        };

        let op = command.operation();
        if let Some(state) = self.coordinator.snapshot(device_id).await {
            if state.is_busy(op) {
                tracing::debug!(
                    "[Dispatcher] {} already in flight on {}, dispatching anyway",
                    op.as_str(),
                    device.name
                );
            }
        }
        self.coordinator
            .apply(device_id, StatePatch::Busy { op, busy: true })
            .await;

        let outcome = match self.execute(&device, &command).await {
            Ok(()) => {
                tracing::info!("[Dispatcher] {} on {} completed", op.as_str(), device.name);
                CommandOutcome::Completed
            }
            Err(e) => {
                tracing::warn!(
                    "[Dispatcher] {} on {} failed: {}",
                    op.as_str(),
                    device.name,
                    e
                );
                let message = e.to_string();
                self.coordinator
                    .apply(
                        device_id,
                        StatePatch::CommandFailed {
                            message: message.clone(),
                        },
                    )
                    .await;
                CommandOutcome::Failed(message)
            }
        };

        self.coordinator
            .apply(device_id, StatePatch::Busy { op, busy: false })
            .await;
        outcome
    }

    /// The device call, then a forced refresh of that device
    async fn execute(&self, device: &DeviceConfig, command: &Command) -> Result<(), DeviceError> {
        let client = self.coordinator.connector().connect(&device.url);

        match command {
            Command::SetInterval { motor_interval_ms } => {
                client.set_config(*motor_interval_ms).await?;
            }
            Command::StartSession { session_id } => {
                client.start_session(session_id.as_deref()).await?;
            }
            Command::StopSession => {
                client.stop_session().await?;
            }
            Command::TriggerMotor => {
                client.trigger_motor().await?;
            }
        }

        self.coordinator.refresh(&device.id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PollConfig;
    use crate::device::stub::{StubConnector, StubDevice};
    use crate::device::{DeviceConnector, HttpConnector};
    use crate::registry::{DeviceRegistry, RegistryStore};
    use crate::simulator::{self, SimulatedWearable};
    use std::time::Duration;

    const ONE_DEVICE: &str = r#"[{"id":"1","url":"http://d1","name":"D1"}]"#;

    async fn setup(
        saved: &str,
        connector: Arc<dyn DeviceConnector>,
    ) -> (CommandDispatcher, Arc<PollCoordinator>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.json");
        if !saved.is_empty() {
            tokio::fs::write(&path, saved).await.unwrap();
        }
        let registry = Arc::new(DeviceRegistry::load(RegistryStore::new(path)).await);
        let coordinator = PollCoordinator::new(registry, connector, &PollConfig::default()).await;
        (CommandDispatcher::new(coordinator.clone()), coordinator, dir)
    }

    #[tokio::test]
    async fn test_busy_flag_spans_command_and_forced_refresh() {
        let connector = Arc::new(StubConnector::new());
        let device = Arc::new(StubDevice::new().with_latency(Duration::from_millis(60)));
        connector.insert("http://d1", device.clone());
        let (dispatcher, coordinator, _dir) = setup(ONE_DEVICE, connector).await;
        let dispatcher = Arc::new(dispatcher);

        let d = dispatcher.clone();
        let pending = tokio::spawn(async move { d.start_session("1", Some("abc".into())).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(coordinator.snapshot("1").await.unwrap().is_busy(Operation::Start));

        // still busy while the forced refresh runs
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(coordinator.snapshot("1").await.unwrap().is_busy(Operation::Start));

        assert_eq!(pending.await.unwrap(), CommandOutcome::Completed);
        let state = coordinator.snapshot("1").await.unwrap();
        assert!(!state.is_busy(Operation::Start));
        assert!(state.status.is_some());
        assert_eq!(device.calls(), vec!["start_session", "status", "sessions"]);
    }

    #[tokio::test]
    async fn test_failed_forced_refresh_records_error_and_clears_flag() {
        let connector = Arc::new(StubConnector::new());
        let device = Arc::new(StubDevice::new());
        device.push_status(Err(crate::error::DeviceError::Network(
            "connection reset".into(),
        )));
        connector.insert("http://d1", device.clone());
        let (dispatcher, coordinator, _dir) = setup(ONE_DEVICE, connector).await;

        let outcome = dispatcher.start_session("1", Some("abc".into())).await;

        assert_eq!(outcome, CommandOutcome::Failed("connection reset".into()));
        let state = coordinator.snapshot("1").await.unwrap();
        assert!(!state.is_busy(Operation::Start));
        assert_eq!(state.error.as_deref(), Some("connection reset"));
        assert_eq!(device.calls(), vec!["start_session", "status"]);
    }

    #[tokio::test]
    async fn test_rejected_command_skips_refresh() {
        let connector = Arc::new(StubConnector::new());
        let device = Arc::new(StubDevice::new());
        device.set_command_error(Some(crate::error::DeviceError::Device {
            status: 409,
            message: "no active session".into(),
        }));
        connector.insert("http://d1", device.clone());
        let (dispatcher, coordinator, _dir) = setup(ONE_DEVICE, connector).await;

        let outcome = dispatcher.stop_session("1").await;

        assert_eq!(outcome, CommandOutcome::Failed("no active session".into()));
        assert_eq!(device.calls(), vec!["stop_session"]);
        let state = coordinator.snapshot("1").await.unwrap();
        assert_eq!(state.error.as_deref(), Some("no active session"));
        assert_eq!(state.busy_flags.get("stop"), Some(&false));
    }

    #[tokio::test]
    async fn test_unknown_device_is_silent_noop() {
        let connector = Arc::new(StubConnector::new());
        let (dispatcher, coordinator, _dir) = setup("", connector).await;

        assert_eq!(
            dispatcher.trigger_motor("missing").await,
            CommandOutcome::UnknownDevice
        );
        assert!(coordinator.snapshot("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_set_interval_round_trips_through_simulator() {
        let (addr, _task) = simulator::bind(
            SimulatedWearable::new(),
            "127.0.0.1:0".parse().unwrap(),
        )
        .await
        .unwrap();
        let saved = format!(
            r#"[{{"id":"sim","url":"http://{}","name":"Sim"}}]"#,
            addr
        );
        let connector: Arc<dyn DeviceConnector> = Arc::new(HttpConnector::new().unwrap());
        let (dispatcher, coordinator, _dir) = setup(&saved, connector).await;

        assert_eq!(
            dispatcher.set_interval("sim", 90_000).await,
            CommandOutcome::Completed
        );
        let state = coordinator.snapshot("sim").await.unwrap();
        assert_eq!(state.status.unwrap().motor_interval_ms, 90_000);
        assert_eq!(state.busy_flags.get("setInterval"), Some(&false));

        assert_eq!(
            dispatcher.trigger_motor("sim").await,
            CommandOutcome::Completed
        );
        let state = coordinator.snapshot("sim").await.unwrap();
        assert_eq!(state.status.unwrap().motor_events, 1);
    }

    #[test]
    fn test_outcome_serialization() {
        assert_eq!(
            serde_json::to_value(CommandOutcome::Failed("x".into())).unwrap(),
            serde_json::json!({ "outcome": "failed", "error": "x" })
        );
        assert_eq!(
            serde_json::to_value(CommandOutcome::UnknownDevice).unwrap(),
            serde_json::json!({ "outcome": "unknown_device" })
        );
    }
}
