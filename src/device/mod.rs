//! ESP32 wearable integration module
//!
//! - `client`: HTTP JSON client for the firmware API, plus the
//!   `DeviceApi`/`DeviceConnector` seams used by the poll coordinator

pub mod client;
#[cfg(test)]
pub mod stub;

pub use client::{DeviceApi, DeviceConnector, HttpConnector};
