//! Data models for the MoveQuest tester
//!
//! Wire types mirror the wearable firmware's JSON (camelCase keys).

use serde::{Deserialize, Deserializer, Serialize};

/// Motor interval range the firmware accepts
pub const MIN_MOTOR_INTERVAL_MS: u64 = 60_000;
pub const MAX_MOTOR_INTERVAL_MS: u64 = 3_600_000;

// ============================================================================
// Registry Models
// ============================================================================

/// A configured device. The only persisted record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub id: String,
    pub url: String,
    pub name: String,
}

// ============================================================================
// Device Wire Models
// ============================================================================

/// Point-in-time device telemetry from `GET /api/status`.
///
/// Every field may be missing or `null` on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatusSnapshot {
    #[serde(deserialize_with = "null_as_default")]
    pub uptime_ms: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub motor_interval_ms: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub session_active: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub session_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub steps: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub motor_events: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub logged_samples: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub wifi_rssi: i32,
    /// Negative or absent when the device does not know
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_motor_in_ms: Option<i64>,
    /// Newest last
    #[serde(deserialize_with = "null_as_default")]
    pub recent_events: Vec<EventFrame>,
}

/// One recent-activity entry. Only displayed, never interpreted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    #[serde(default, deserialize_with = "null_as_default")]
    pub ts: u64,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filtered: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<u64>,
}

/// A recording stored on the device. `path` is the unique key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMeta {
    pub path: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motor_events: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motor_interval_ms: Option<u64>,
}

impl SessionMeta {
    /// Reported duration, or `end - start` when the device omitted it
    pub fn effective_duration_ms(&self) -> Option<u64> {
        if let Some(d) = self.duration_ms.filter(|d| *d > 0) {
            return Some(d);
        }
        match (self.start, self.end) {
            (Some(start), Some(end)) if end > start => Some((end - start) as u64),
            _ => None,
        }
    }
}

/// `GET /api/sessions` envelope
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionList {
    #[serde(default)]
    pub sessions: Vec<SessionMeta>,
}

/// `POST /api/config` acknowledgement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigAck {
    pub motor_interval_ms: u64,
}

/// `POST /api/session/start` acknowledgement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStarted {
    pub session_id: String,
    pub start: i64,
    pub motor_interval_ms: u64,
}

/// Treat an explicit `null` like a missing key
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================================
// Command Models
// ============================================================================

/// User-initiated operations gated by a per-device busy flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    #[serde(rename = "setInterval")]
    SetInterval,
    #[serde(rename = "start")]
    Start,
    #[serde(rename = "stop")]
    Stop,
    #[serde(rename = "trigger")]
    Trigger,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::SetInterval => "setInterval",
            Operation::Start => "start",
            Operation::Stop => "stop",
            Operation::Trigger => "trigger",
        }
    }
}
