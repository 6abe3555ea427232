use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::constants::{
    DEFAULT_BAUD_RATE, DEFAULT_ELEVATION, DEFAULT_PORT, DEFAULT_SETTLE, DEFAULT_TIMEOUT,
};
use crate::types::Observer;

/// Persisted link and site settings (`config.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    /// Serial port name, e.g. "COM3" or "/dev/ttyUSB0"
    pub port: String,
    pub baud_rate: u32,
    /// Per-command response timeout
    pub timeout_ms: u64,
    /// Pause after opening the port before the first command
    pub settle_ms: u64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub elevation: i32,
}

impl Default for MountConfig {
    fn default() -> Self {
        MountConfig {
            port: DEFAULT_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
            settle_ms: DEFAULT_SETTLE.as_millis() as u64,
            latitude: None,
            longitude: None,
            elevation: DEFAULT_ELEVATION,
        }
    }
}

impl MountConfig {
    /// Load from `path`. A missing or unreadable file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("No config at {}, using defaults", path.display());
                return MountConfig::default();
            }
            Err(e) => {
                warn!("Could not read {}: {e}, using defaults", path.display());
                return MountConfig::default();
            }
        };

        serde_json::from_str(&text).unwrap_or_else(|e| {
            warn!("Could not parse {}: {e}, using defaults", path.display());
            MountConfig::default()
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
    }

    /// The configured site, when both coordinates are present.
    pub fn observer(&self) -> Option<Observer> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Observer {
                latitude,
                longitude,
                elevation: self.elevation,
            }),
            _ => None,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = MountConfig::load(dir.path().join("config.json"));
        assert_eq!(config, MountConfig::default());
        assert_eq!(config.baud_rate, 9600);
        assert!(config.observer().is_none());
    }

    #[test]
    fn corrupt_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(MountConfig::load(&path), MountConfig::default());
    }

    #[test]
    fn save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let config = MountConfig {
            port: "COM11".to_string(),
            baud_rate: 115200,
            latitude: Some(-33.86),
            longitude: Some(151.21),
            elevation: 58,
            ..MountConfig::default()
        };
        config.save(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n  \"port\": \"COM11\""));

        let loaded = MountConfig::load(&path);
        assert_eq!(loaded, config);
        assert_eq!(loaded.observer().unwrap().elevation, 58);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"port": "COM4", "latitude": 40.0}"#).unwrap();

        let config = MountConfig::load(&path);
        assert_eq!(config.port, "COM4");
        assert_eq!(config.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(config.timeout(), DEFAULT_TIMEOUT);
        // longitude missing, so no observer
        assert!(config.observer().is_none());
    }
}
