//! Configuration module

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Refresh cadence of the poll coordinator
#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Delay between adding a device and its first refresh
    #[serde(default = "default_add_refresh_delay_ms")]
    pub add_refresh_delay_ms: u64,
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn add_refresh_delay(&self) -> Duration {
        Duration::from_millis(self.add_refresh_delay_ms)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            add_refresh_delay_ms: default_add_refresh_delay_ms(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_registry_path")]
    pub path: PathBuf,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: default_registry_path(),
        }
    }
}

/// In-process simulated wearable
#[derive(Debug, Deserialize)]
pub struct SimulatorConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_simulator_port")]
    pub port: u16,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_simulator_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_interval_ms() -> u64 {
    2000
}

fn default_add_refresh_delay_ms() -> u64 {
    100
}

fn default_registry_path() -> PathBuf {
    PathBuf::from("data/esp32-devices.json")
}

fn default_simulator_port() -> u16 {
    8091
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::Environment::with_prefix("MOVEQUEST").separator("__"))
            .build()?;

        let config: Config = settings.try_deserialize().unwrap_or_else(|e| {
            tracing::warn!("Invalid configuration, using defaults: {}", e);
            Config::default()
        });

        Ok(config)
    }
}
