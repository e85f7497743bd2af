//! Error handling module
//!
//! - `DeviceError`: failures talking to a wearable's HTTP API
//! - `AppError`: failures surfaced by the dashboard API

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Failure of a single device round trip.
///
/// `Display` is the human-readable text stored as a device's sticky error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The request could not complete (connect refused, DNS, reset, ...)
    #[error("{0}")]
    Network(String),

    /// The device answered with a non-2xx status
    #[error("{message}")]
    Device { status: u16, message: String },

    /// The device answered 2xx but the body was not the expected JSON
    #[error("invalid response from device: {0}")]
    Decode(String),
}

impl DeviceError {
    /// Build a `Device` error from a non-2xx response.
    /// Falls back to the status line when the body is empty.
    pub fn from_response(status: reqwest::StatusCode, body: &str) -> Self {
        let body = body.trim();
        let message = if body.is_empty() {
            status.to_string()
        } else {
            body.to_string()
        };
        DeviceError::Device {
            status: status.as_u16(),
            message,
        }
    }
}

impl From<reqwest::Error> for DeviceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            DeviceError::Decode(e.to_string())
        } else {
            DeviceError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for DeviceError {
    fn from(e: serde_json::Error) -> Self {
        DeviceError::Decode(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Device(e) => (StatusCode::BAD_GATEWAY, e.to_string()),
        };

        let body = Json(serde_json::json!({
            "error": message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}
