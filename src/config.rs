//! Monitor configuration

use serde::{Deserialize, Serialize};

use crate::{MonitorError, Result};

/// Monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Devices or capture files to read; empty means auto-detect the
    /// default and loopback devices.
    pub devices: Vec<String>,

    /// Ports monitored for HTTP traffic.
    pub ports: Vec<u16>,

    /// Resolve destination addresses to hostnames.
    pub resolve_names: bool,

    /// Suppress per-connection lines.
    pub quiet: bool,

    /// Print the capture filter instead of capturing.
    pub show_filter: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            devices: Vec::new(),
            ports: vec![80],
            resolve_names: true,
            quiet: false,
            show_filter: false,
        }
    }
}

impl MonitorConfig {
    /// Load from a JSON file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        serde_json::from_str(&content).map_err(|e| MonitorError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MonitorConfig::default();

        assert!(config.devices.is_empty());
        assert_eq!(vec![80], config.ports);
        assert!(config.resolve_names);
        assert!(!config.quiet);
        assert!(!config.show_filter);
    }

    #[test]
    fn test_partial_json() {
        let config: MonitorConfig =
            serde_json::from_str(r#"{"ports": [80, 8080], "quiet": true}"#).unwrap();

        assert_eq!(vec![80, 8080], config.ports);
        assert!(config.quiet);
        assert!(config.resolve_names, "unset fields keep their defaults");
    }

    #[test]
    fn test_round_trip() {
        let config = MonitorConfig {
            devices: vec!["en0".into()],
            ports: vec![3000],
            resolve_names: false,
            quiet: true,
            show_filter: false,
        };

        let json = serde_json::to_string(&config).unwrap();
        let restored: MonitorConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(config.devices, restored.devices);
        assert_eq!(config.ports, restored.ports);
        assert_eq!(config.resolve_names, restored.resolve_names);
    }
}
