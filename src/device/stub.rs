//! Scripted in-memory devices for coordinator and dispatcher tests

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::client::{DeviceApi, DeviceConnector};
use crate::error::DeviceError;
use crate::models::{
    ConfigAck, EventFrame, SessionList, SessionMeta, SessionStarted, StatusSnapshot,
};

/// Device whose status responses are scripted. The last scripted
/// response repeats once the script runs out.
pub struct StubDevice {
    statuses: Mutex<VecDeque<Result<StatusSnapshot, DeviceError>>>,
    sessions: Mutex<Result<Vec<SessionMeta>, DeviceError>>,
    command_error: Mutex<Option<DeviceError>>,
    latency: Mutex<Duration>,
    motor_interval_ms: AtomicU64,
    status_calls: AtomicUsize,
    calls: Mutex<Vec<&'static str>>,
}

impl StubDevice {
    pub fn new() -> Self {
        Self {
            statuses: Mutex::new(VecDeque::new()),
            sessions: Mutex::new(Ok(Vec::new())),
            command_error: Mutex::new(None),
            latency: Mutex::new(Duration::ZERO),
            motor_interval_ms: AtomicU64::new(1_800_000),
            status_calls: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_steps(steps: &[u64]) -> Self {
        let stub = Self::new();
        for s in steps {
            stub.push_status(Ok(StatusSnapshot {
                steps: *s,
                ..Default::default()
            }));
        }
        stub
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.lock().unwrap() = latency;
        self
    }

    pub fn push_status(&self, status: Result<StatusSnapshot, DeviceError>) {
        self.statuses.lock().unwrap().push_back(status);
    }

    /// Replace the whole status script
    pub fn script(&self, statuses: Vec<Result<StatusSnapshot, DeviceError>>) {
        *self.statuses.lock().unwrap() = statuses.into();
    }

    pub fn set_sessions(&self, sessions: Result<Vec<SessionMeta>, DeviceError>) {
        *self.sessions.lock().unwrap() = sessions;
    }

    pub fn set_command_error(&self, err: Option<DeviceError>) {
        *self.command_error.lock().unwrap() = err;
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    async fn enter(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn command_result(&self) -> Result<(), DeviceError> {
        match self.command_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DeviceApi for StubDevice {
    async fn status(&self) -> Result<StatusSnapshot, DeviceError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.enter("status").await;

        let mut script = self.statuses.lock().unwrap();
        let next = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        next.unwrap_or_else(|| {
            Ok(StatusSnapshot {
                motor_interval_ms: self.motor_interval_ms.load(Ordering::SeqCst),
                ..Default::default()
            })
        })
    }

    async fn set_config(&self, motor_interval_ms: u64) -> Result<ConfigAck, DeviceError> {
        self.enter("set_config").await;
        self.command_result()?;
        self.motor_interval_ms
            .store(motor_interval_ms, Ordering::SeqCst);
        Ok(ConfigAck { motor_interval_ms })
    }

    async fn start_session(
        &self,
        session_id: Option<&str>,
    ) -> Result<SessionStarted, DeviceError> {
        self.enter("start_session").await;
        self.command_result()?;
        Ok(SessionStarted {
            session_id: session_id.unwrap_or("auto").to_string(),
            start: 0,
            motor_interval_ms: self.motor_interval_ms.load(Ordering::SeqCst),
        })
    }

    async fn stop_session(&self) -> Result<Value, DeviceError> {
        self.enter("stop_session").await;
        self.command_result()?;
        Ok(Value::Null)
    }

    async fn sessions(&self) -> Result<SessionList, DeviceError> {
        self.enter("sessions").await;
        self.sessions
            .lock()
            .unwrap()
            .clone()
            .map(|sessions| SessionList { sessions })
    }

    async fn session(&self, _id: &str) -> Result<Vec<EventFrame>, DeviceError> {
        self.enter("session").await;
        Ok(Vec::new())
    }

    async fn trigger_motor(&self) -> Result<Value, DeviceError> {
        self.enter("trigger_motor").await;
        self.command_result()?;
        Ok(Value::Null)
    }
}

/// Routes base URLs to stub devices. Unknown URLs behave as unreachable.
#[derive(Default)]
pub struct StubConnector {
    devices: Mutex<HashMap<String, Arc<StubDevice>>>,
}

impl StubConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: &str, device: Arc<StubDevice>) {
        self.devices.lock().unwrap().insert(url.to_string(), device);
    }
}

impl DeviceConnector for StubConnector {
    fn connect(&self, base_url: &str) -> Arc<dyn DeviceApi> {
        if let Some(device) = self.devices.lock().unwrap().get(base_url) {
            return device.clone();
        }
        let unreachable = StubDevice::new();
        unreachable.push_status(Err(DeviceError::Network(format!(
            "error sending request for url ({}/api/status)",
            base_url
        ))));
        Arc::new(unreachable)
    }
}
