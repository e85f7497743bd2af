//! Durable slot for the device list
//!
//! A single JSON array of `{id, url, name}` written as one whole-document
//! overwrite (temp file + rename).

use std::io;
use std::path::{Path, PathBuf};

use crate::models::DeviceConfig;

pub struct RegistryStore {
    path: PathBuf,
}

impl RegistryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the saved device list. Absent or malformed data yields an empty list.
    pub async fn load(&self) -> Vec<DeviceConfig> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(
                    "[RegistryStore] No saved devices at {}",
                    self.path.display()
                );
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!(
                    "[RegistryStore] Failed to read {}: {}",
                    self.path.display(),
                    e
                );
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<DeviceConfig>>(&raw) {
            Ok(devices) => devices,
            Err(e) => {
                tracing::warn!(
                    "[RegistryStore] Ignoring malformed device list in {}: {}",
                    self.path.display(),
                    e
                );
                Vec::new()
            }
        }
    }

    pub async fn save(&self, devices: &[DeviceConfig]) -> io::Result<()> {
        let json = serde_json::to_string_pretty(devices)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
