//! Simulated ESP32 wearable
//!
//! Serves the firmware HTTP API over in-memory state so the tester can be
//! driven without hardware. Each status read advances the simulated
//! accelerometer by one sample.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use rand::Rng;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::models::{
    ConfigAck, EventFrame, SessionList, SessionMeta, SessionStarted, StatusSnapshot,
    MAX_MOTOR_INTERVAL_MS, MIN_MOTOR_INTERVAL_MS,
};

const DEFAULT_MOTOR_INTERVAL_MS: u64 = 1_800_000;
const RECENT_EVENTS_CAP: usize = 40;
/// Frames one recording can hold; later frames are not logged
const SESSION_FRAMES_CAP: usize = 10_000;
const FILTER_ALPHA: f64 = 0.2;
const STEP_THRESHOLD: f64 = 1.35;
/// Rough size of one logged JSONL line
const BYTES_PER_FRAME: u64 = 48;

type ApiError = (StatusCode, String);

struct ActiveSession {
    session_id: String,
    start: i64,
    steps_at_start: u64,
    motor_events_at_start: u64,
    frames: Vec<EventFrame>,
}

struct Wearable {
    booted: Instant,
    motor_interval_ms: u64,
    last_motor: Instant,
    steps: u64,
    motor_events: u64,
    logged_samples: u64,
    filtered: f64,
    wifi_rssi: i32,
    recent: VecDeque<EventFrame>,
    active: Option<ActiveSession>,
    sessions: Vec<SessionMeta>,
    recordings: HashMap<String, Vec<EventFrame>>,
}

impl Wearable {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            booted: now,
            motor_interval_ms: DEFAULT_MOTOR_INTERVAL_MS,
            last_motor: now,
            steps: 0,
            motor_events: 0,
            logged_samples: 0,
            filtered: 1.0,
            wifi_rssi: -55,
            recent: VecDeque::with_capacity(RECENT_EVENTS_CAP),
            active: None,
            sessions: Vec::new(),
            recordings: HashMap::new(),
        }
    }

    fn uptime_ms(&self) -> u64 {
        self.booted.elapsed().as_millis() as u64
    }

    fn record(&mut self, frame: EventFrame) {
        if self.recent.len() == RECENT_EVENTS_CAP {
            self.recent.pop_front();
        }
        self.recent.push_back(frame.clone());
        if let Some(active) = self.active.as_mut() {
            if active.frames.len() < SESSION_FRAMES_CAP {
                active.frames.push(frame);
                self.logged_samples += 1;
            }
        }
    }

    /// One accelerometer sample, plus the scheduled motor if it is due
    fn advance(&mut self) {
        let mut rng = rand::thread_rng();
        let raw = 1.0 + rng.gen_range(-0.5..0.9);
        self.filtered = FILTER_ALPHA * raw + (1.0 - FILTER_ALPHA) * self.filtered;
        self.wifi_rssi = (self.wifi_rssi + rng.gen_range(-2..=2)).clamp(-90, -30);

        let ts = self.uptime_ms();
        self.record(EventFrame {
            ts,
            kind: "sample".to_string(),
            raw: Some(raw),
            filtered: Some(self.filtered),
            steps: None,
        });

        if self.active.is_some() && raw > STEP_THRESHOLD {
            self.steps += 1;
            self.record(EventFrame {
                ts,
                kind: "step".to_string(),
                raw: None,
                filtered: None,
                steps: Some(self.steps),
            });
        }

        if self.last_motor.elapsed().as_millis() as u64 >= self.motor_interval_ms {
            self.fire_motor();
        }
    }

    fn fire_motor(&mut self) {
        self.motor_events += 1;
        self.last_motor = Instant::now();
        let ts = self.uptime_ms();
        self.record(EventFrame {
            ts,
            kind: "motor".to_string(),
            raw: None,
            filtered: None,
            steps: Some(self.steps),
        });
    }

    fn status(&self) -> StatusSnapshot {
        let since_motor = self.last_motor.elapsed().as_millis() as i64;
        StatusSnapshot {
            uptime_ms: self.uptime_ms(),
            motor_interval_ms: self.motor_interval_ms,
            session_active: self.active.is_some(),
            session_id: self
                .active
                .as_ref()
                .map(|a| a.session_id.clone())
                .unwrap_or_default(),
            steps: self.steps,
            motor_events: self.motor_events,
            logged_samples: self.logged_samples,
            wifi_rssi: self.wifi_rssi,
            next_motor_in_ms: Some(self.motor_interval_ms as i64 - since_motor),
            recent_events: self.recent.iter().cloned().collect(),
        }
    }
}

/// Shared handle to one simulated device
#[derive(Clone)]
pub struct SimulatedWearable {
    inner: Arc<Mutex<Wearable>>,
}

impl SimulatedWearable {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Wearable::new())),
        }
    }
}

impl Default for SimulatedWearable {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// HTTP API
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigRequest {
    motor_interval_ms: Option<u64>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct StartRequest {
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Deserialize)]
struct SessionQuery {
    id: String,
}

pub fn router(sim: SimulatedWearable) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/config", post(set_config))
        .route("/api/session/start", post(start_session))
        .route("/api/session/stop", post(stop_session))
        .route("/api/sessions", get(list_sessions))
        .route("/api/session", get(get_session))
        .route("/api/motor/trigger", post(trigger_motor))
        .with_state(sim)
}

/// Serve the simulator on `addr`. Returns the bound address (useful with port 0).
pub async fn bind(
    sim: SimulatedWearable,
    addr: SocketAddr,
) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound = listener.local_addr()?;
    let app = router(sim);

    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("[Simulator] Server stopped: {}", e);
        }
    });

    tracing::info!("[Simulator] Simulated wearable listening on {}", bound);
    Ok((bound, task))
}

async fn get_status(State(sim): State<SimulatedWearable>) -> Json<StatusSnapshot> {
    let mut device = sim.inner.lock().await;
    device.advance();
    Json(device.status())
}

async fn set_config(
    State(sim): State<SimulatedWearable>,
    Json(req): Json<ConfigRequest>,
) -> Result<Json<ConfigAck>, ApiError> {
    let interval = req
        .motor_interval_ms
        .ok_or((StatusCode::BAD_REQUEST, "motorIntervalMs required".to_string()))?;

    if !(MIN_MOTOR_INTERVAL_MS..=MAX_MOTOR_INTERVAL_MS).contains(&interval) {
        return Err((
            StatusCode::BAD_REQUEST,
            format!(
                "motorIntervalMs out of range ({}-{})",
                MIN_MOTOR_INTERVAL_MS, MAX_MOTOR_INTERVAL_MS
            ),
        ));
    }

    let mut device = sim.inner.lock().await;
    device.motor_interval_ms = interval;
    device.last_motor = Instant::now();
    Ok(Json(ConfigAck {
        motor_interval_ms: interval,
    }))
}

async fn start_session(
    State(sim): State<SimulatedWearable>,
    body: Bytes,
) -> Result<Json<SessionStarted>, ApiError> {
    let req: StartRequest = if body.iter().all(u8::is_ascii_whitespace) {
        StartRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid body: {}", e)))?
    };

    let mut device = sim.inner.lock().await;
    if device.active.is_some() {
        return Err((StatusCode::CONFLICT, "session already active".to_string()));
    }

    let start = chrono::Utc::now().timestamp_millis();
    let session_id = req
        .session_id
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| format!("session-{}", start));

    device.active = Some(ActiveSession {
        session_id: session_id.clone(),
        start,
        steps_at_start: device.steps,
        motor_events_at_start: device.motor_events,
        frames: Vec::new(),
    });

    Ok(Json(SessionStarted {
        session_id,
        start,
        motor_interval_ms: device.motor_interval_ms,
    }))
}

async fn stop_session(
    State(sim): State<SimulatedWearable>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut device = sim.inner.lock().await;
    let active = device
        .active
        .take()
        .ok_or((StatusCode::CONFLICT, "no active session".to_string()))?;

    let end = chrono::Utc::now().timestamp_millis();
    let path = format!("/sessions/{}.jsonl", active.session_id);
    let meta = SessionMeta {
        path: path.clone(),
        size: active.frames.len() as u64 * BYTES_PER_FRAME,
        session_id: Some(active.session_id.clone()),
        start: Some(active.start),
        end: Some(end),
        duration_ms: Some((end - active.start).max(0) as u64),
        steps: Some(device.steps - active.steps_at_start),
        motor_events: Some(device.motor_events - active.motor_events_at_start),
        motor_interval_ms: Some(device.motor_interval_ms),
    };

    // A reused id overwrites the earlier recording
    device.sessions.retain(|s| s.path != path);
    device.sessions.push(meta);
    device.recordings.insert(path, active.frames);

    Ok(Json(serde_json::json!({
        "ok": true,
        "sessionId": active.session_id,
    })))
}

async fn list_sessions(State(sim): State<SimulatedWearable>) -> Json<SessionList> {
    let device = sim.inner.lock().await;
    Json(SessionList {
        sessions: device.sessions.clone(),
    })
}

async fn get_session(
    State(sim): State<SimulatedWearable>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<Vec<EventFrame>>, ApiError> {
    let device = sim.inner.lock().await;
    let meta = device
        .sessions
        .iter()
        .find(|s| s.session_id.as_deref() == Some(query.id.as_str()) || s.path == query.id)
        .ok_or((StatusCode::NOT_FOUND, "session not found".to_string()))?;

    let frames = device.recordings.get(&meta.path).cloned().unwrap_or_default();
    Ok(Json(frames))
}

async fn trigger_motor(State(sim): State<SimulatedWearable>) -> Json<serde_json::Value> {
    let mut device = sim.inner.lock().await;
    device.fire_motor();
    Json(serde_json::json!({
        "ok": true,
        "motorEvents": device.motor_events,
    }))
}
