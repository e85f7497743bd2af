//! DeviceRegistry: the set of configured devices
//!
//! Holds `{id, url, name}` in insertion order and writes the whole list back
//! to its `RegistryStore` after every mutation. Live status lives in the
//! poll coordinator, never here.

pub mod store;

pub use store::RegistryStore;

use tokio::sync::RwLock;

use crate::error::AppError;
use crate::models::DeviceConfig;

pub struct DeviceRegistry {
    devices: RwLock<Vec<DeviceConfig>>,
    store: RegistryStore,
}

impl DeviceRegistry {
    /// Load the saved device list from `store`
    pub async fn load(store: RegistryStore) -> Self {
        let devices = store.load().await;
        tracing::info!(
            "[DeviceRegistry] Loaded {} devices from {}",
            devices.len(),
            store.path().display()
        );
        Self {
            devices: RwLock::new(devices),
            store,
        }
    }

    /// Register a new device. A blank name becomes `ESP32 {count + 1}`.
    pub async fn add(&self, url: &str, name: Option<&str>) -> Result<DeviceConfig, AppError> {
        let url = validate_url(url)?;

        let mut devices = self.devices.write().await;
        let name = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(n) => n.to_string(),
            None => format!("ESP32 {}", devices.len() + 1),
        };

        let device = DeviceConfig {
            id: uuid::Uuid::new_v4().to_string(),
            url,
            name,
        };
        devices.push(device.clone());
        self.persist(&devices).await;

        tracing::info!(
            "[DeviceRegistry] Added device: {} ({}, {})",
            device.name,
            device.id,
            device.url
        );
        Ok(device)
    }

    /// Remove a device. Unknown ids are a no-op.
    pub async fn remove(&self, id: &str) -> Option<DeviceConfig> {
        let mut devices = self.devices.write().await;
        let pos = devices.iter().position(|d| d.id == id)?;
        let removed = devices.remove(pos);
        self.persist(&devices).await;

        tracing::info!("[DeviceRegistry] Removed device: {} ({})", removed.name, id);
        Some(removed)
    }

    /// Edit a device's name and/or URL. Returns `None` for unknown ids.
    pub async fn update(
        &self,
        id: &str,
        name: Option<&str>,
        url: Option<&str>,
    ) -> Result<Option<DeviceConfig>, AppError> {
        let url = url.map(validate_url).transpose()?;

        let mut devices = self.devices.write().await;
        let Some(device) = devices.iter_mut().find(|d| d.id == id) else {
            return Ok(None);
        };

        if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
            device.name = name.to_string();
        }
        if let Some(url) = url {
            device.url = url;
        }
        let updated = device.clone();
        self.persist(&devices).await;

        tracing::info!("[DeviceRegistry] Updated device: {} ({})", updated.name, id);
        Ok(Some(updated))
    }

    pub async fn get(&self, id: &str) -> Option<DeviceConfig> {
        let devices = self.devices.read().await;
        devices.iter().find(|d| d.id == id).cloned()
    }

    /// All devices in insertion order
    pub async fn list(&self) -> Vec<DeviceConfig> {
        self.devices.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    async fn persist(&self, devices: &[DeviceConfig]) {
        if let Err(e) = self.store.save(devices).await {
            tracing::warn!(
                "[DeviceRegistry] Failed to save {} devices to {}: {}",
                devices.len(),
                self.store.path().display(),
                e
            );
        }
    }
}

/// Trim and check that `url` is an absolute http(s) URL
fn validate_url(url: &str) -> Result<String, AppError> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest("Device URL is required".to_string()));
    }

    let parsed = url::Url::parse(trimmed)
        .map_err(|e| AppError::BadRequest(format!("Invalid device URL '{}': {}", trimmed, e)))?;

    match parsed.scheme() {
        "http" | "https" if parsed.host().is_some() => Ok(trimmed.to_string()),
        _ => Err(AppError::BadRequest(format!(
            "Device URL must be http(s) with a host: {}",
            trimmed
        ))),
    }
}
