//! ESP32 wearable HTTP JSON API client
//!
//! One `Esp32Client` per device base URL. Every call is a single
//! request/response round trip: no retries, no timeout, no idle pooling.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{header, Client, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::DeviceError;
use crate::models::{ConfigAck, EventFrame, SessionList, SessionStarted, StatusSnapshot};

// ============================================================================
// Seams
// ============================================================================

/// The wearable firmware API as seen by the poll coordinator and dispatcher
#[async_trait]
pub trait DeviceApi: Send + Sync {
    /// GET /api/status
    async fn status(&self) -> Result<StatusSnapshot, DeviceError>;

    /// POST /api/config. The device validates the range.
    async fn set_config(&self, motor_interval_ms: u64) -> Result<ConfigAck, DeviceError>;

    /// POST /api/session/start. A blank id lets the device generate one.
    async fn start_session(&self, session_id: Option<&str>)
        -> Result<SessionStarted, DeviceError>;

    /// POST /api/session/stop
    async fn stop_session(&self) -> Result<Value, DeviceError>;

    /// GET /api/sessions
    async fn sessions(&self) -> Result<SessionList, DeviceError>;

    /// GET /api/session?id={id}
    async fn session(&self, id: &str) -> Result<Vec<EventFrame>, DeviceError>;

    /// POST /api/motor/trigger
    async fn trigger_motor(&self) -> Result<Value, DeviceError>;
}

/// Builds a `DeviceApi` bound to a base URL
pub trait DeviceConnector: Send + Sync {
    fn connect(&self, base_url: &str) -> Arc<dyn DeviceApi>;
}

// ============================================================================
// HTTP implementation
// ============================================================================

/// Connector handing out `Esp32Client`s that share one reqwest client
pub struct HttpConnector {
    http_client: Client,
}

impl HttpConnector {
    pub fn new() -> Result<Self, reqwest::Error> {
        let http_client = Client::builder().pool_max_idle_per_host(0).build()?;
        Ok(Self { http_client })
    }
}

impl DeviceConnector for HttpConnector {
    fn connect(&self, base_url: &str) -> Arc<dyn DeviceApi> {
        Arc::new(Esp32Client::with_client(base_url, self.http_client.clone()))
    }
}

/// HTTP client for a single ESP32 wearable
pub struct Esp32Client {
    base_url: String,
    http_client: Client,
}

impl Esp32Client {
    pub fn with_client(base_url: &str, http_client: Client) -> Self {
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            http_client,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: Option<(&str, &str)>,
        body: Option<Value>,
    ) -> Result<T, DeviceError> {
        let mut req = self
            .http_client
            .request(method, self.endpoint(path))
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/json")
            .header(header::CACHE_CONTROL, "no-cache");

        if let Some((key, value)) = query {
            req = req.query(&[(key, value)]);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(DeviceError::from_response(status, &text));
        }

        // Opaque acknowledgements may come back with no body at all
        let text = text.trim();
        let text = if text.is_empty() { "null" } else { text };
        Ok(serde_json::from_str(text)?)
    }
}

#[async_trait]
impl DeviceApi for Esp32Client {
    async fn status(&self) -> Result<StatusSnapshot, DeviceError> {
        self.request(Method::GET, "/api/status", None, None).await
    }

    async fn set_config(&self, motor_interval_ms: u64) -> Result<ConfigAck, DeviceError> {
        let body = serde_json::json!({ "motorIntervalMs": motor_interval_ms });
        self.request(Method::POST, "/api/config", None, Some(body))
            .await
    }

    async fn start_session(
        &self,
        session_id: Option<&str>,
    ) -> Result<SessionStarted, DeviceError> {
        let body = match session_id.map(str::trim).filter(|s| !s.is_empty()) {
            Some(id) => serde_json::json!({ "sessionId": id }),
            None => serde_json::json!({}),
        };
        self.request(Method::POST, "/api/session/start", None, Some(body))
            .await
    }

    async fn stop_session(&self) -> Result<Value, DeviceError> {
        self.request(Method::POST, "/api/session/stop", None, None)
            .await
    }

    async fn sessions(&self) -> Result<SessionList, DeviceError> {
        self.request(Method::GET, "/api/sessions", None, None).await
    }

    async fn session(&self, id: &str) -> Result<Vec<EventFrame>, DeviceError> {
        self.request(Method::GET, "/api/session", Some(("id", id)), None)
            .await
    }

    async fn trigger_motor(&self) -> Result<Value, DeviceError> {
        self.request(Method::POST, "/api/motor/trigger", None, None)
            .await
    }
}
