//! Configuration handling for the gateway daemon.
//!
//! Settings come from a YAML file, then environment variables, then command
//! line flags (applied in `main`). A missing or unparseable file falls back
//! to defaults.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::net::Ipv6Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use vaina_routing::{MetricLimits, DEFAULT_HOP_COUNT_MAX, DEFAULT_NIB_CAPACITY, DEFAULT_RCS_CAPACITY};
use vaina_session::{SerialEndpoint, SessionConfig};
use vaina_station::{StationConfig, DEFAULT_MAX_PENDING, DEFAULT_STATION_PREFIX};

/// Which side of the serial link this process plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Wi-Fi gateway: turns station events into VAINA requests
    Gateway,
    /// Mesh node: applies VAINA requests to its routing tables
    Node,
}

impl std::str::FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gateway" => Ok(Role::Gateway),
            "node" => Ok(Role::Node),
            other => anyhow::bail!("unknown role {:?}, expected gateway or node", other),
        }
    }
}

/// Gateway daemon configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Process role
    pub role: Role,
    /// Serial link settings
    pub serial: SerialSettings,
    /// VAINA session settings
    pub session: SessionSettings,
    /// Station correlation settings
    pub stations: StationSettings,
    /// Mesh table settings (node role)
    pub routing: RoutingSettings,
}

/// Serial link settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Character device of the radio UART
    pub device: Option<PathBuf>,
    /// TCP serial bridge (`host:port`), preferred over `device` when set
    pub tcp: Option<String>,
}

/// VAINA session settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Wait for `ACK`/`NACK` before retransmitting (milliseconds)
    pub ack_timeout_ms: u64,
    /// Retransmissions after the first attempt
    pub max_retries: u32,
    /// Bound on waiting for the rest of a started frame (milliseconds)
    pub read_timeout_ms: u64,
    /// Consecutive framing faults before the link is reported unavailable
    pub max_consecutive_faults: u32,
}

/// Station correlation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationSettings {
    /// Prefix whose low 32 bits carry each station's IPv4 address
    pub prefix: Ipv6Addr,
    /// Bound on pending associations and on pending leases
    pub max_pending: usize,
}

/// Mesh table settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingSettings {
    /// Router client set capacity
    pub rcs_capacity: usize,
    /// Forwarding table capacity
    pub nib_capacity: usize,
    /// Hop count ceiling
    pub hop_count_max: u8,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            role: Role::Gateway,
            serial: SerialSettings::default(),
            session: SessionSettings::default(),
            stations: StationSettings::default(),
            routing: RoutingSettings::default(),
        }
    }
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            device: Some(PathBuf::from("/dev/ttyUSB0")),
            tcp: None,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        let defaults = SessionConfig::default();
        Self {
            ack_timeout_ms: defaults.ack_timeout.as_millis() as u64,
            max_retries: defaults.max_retries,
            read_timeout_ms: defaults.read_timeout.as_millis() as u64,
            max_consecutive_faults: defaults.max_consecutive_faults,
        }
    }
}

impl Default for StationSettings {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_STATION_PREFIX,
            max_pending: DEFAULT_MAX_PENDING,
        }
    }
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            rcs_capacity: DEFAULT_RCS_CAPACITY,
            nib_capacity: DEFAULT_NIB_CAPACITY,
            hop_count_max: DEFAULT_HOP_COUNT_MAX,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut config = match std::fs::read_to_string(&config_path) {
            Ok(content) => match serde_yaml::from_str::<GatewayConfig>(&content) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", config_path.as_ref());
                    config
                }
                Err(e) => {
                    warn!(
                        "Failed to parse config file {:?} ({}), using defaults",
                        config_path.as_ref(),
                        e
                    );
                    Self::default()
                }
            },
            Err(_) => {
                warn!("Config file {:?} not found, using defaults", config_path.as_ref());
                Self::default()
            }
        };

        // Override with environment variables
        config.apply_environment_overrides();

        Ok(config)
    }

    /// Serial endpoint to open
    pub fn endpoint(&self) -> Result<SerialEndpoint> {
        match (&self.serial.tcp, &self.serial.device) {
            (Some(addr), _) => Ok(SerialEndpoint::Tcp(addr.clone())),
            (None, Some(path)) => Ok(SerialEndpoint::Device(path.clone())),
            (None, None) => anyhow::bail!("no serial device or TCP bridge configured"),
        }
    }

    /// Session settings as the session crate expects them
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            ack_timeout: Duration::from_millis(self.session.ack_timeout_ms),
            max_retries: self.session.max_retries,
            read_timeout: Duration::from_millis(self.session.read_timeout_ms),
            max_consecutive_faults: self.session.max_consecutive_faults.max(1),
            ..SessionConfig::default()
        }
    }

    /// Station settings as the station crate expects them
    pub fn station_config(&self) -> StationConfig {
        StationConfig {
            prefix: self.stations.prefix,
            max_pending: self.stations.max_pending,
        }
    }

    /// Metric ceilings for the mesh tables
    pub fn metric_limits(&self) -> MetricLimits {
        MetricLimits::new(self.routing.hop_count_max)
    }

    /// Apply environment variable overrides
    fn apply_environment_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(role) = lookup("VAINA_ROLE") {
            match role.parse::<Role>() {
                Ok(role) => {
                    self.role = role;
                    info!("Role overridden by environment: {:?}", role);
                }
                Err(e) => warn!("Ignoring VAINA_ROLE: {}", e),
            }
        }

        if let Some(device) = lookup("VAINA_SERIAL_DEVICE") {
            self.serial.device = Some(PathBuf::from(&device));
            self.serial.tcp = None;
            info!("Serial device overridden by environment: {}", device);
        }

        if let Some(addr) = lookup("VAINA_SERIAL_TCP") {
            info!("Serial TCP bridge overridden by environment: {}", addr);
            self.serial.tcp = Some(addr);
        }

        if let Some(ack_timeout) = lookup("VAINA_ACK_TIMEOUT_MS") {
            if let Ok(ms) = ack_timeout.parse::<u64>() {
                self.session.ack_timeout_ms = ms;
                info!("Ack timeout overridden by environment: {}ms", ms);
            }
        }

        if let Some(max_retries) = lookup("VAINA_MAX_RETRIES") {
            if let Ok(retries) = max_retries.parse::<u32>() {
                self.session.max_retries = retries;
                info!("Max retries overridden by environment: {}", retries);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.role, Role::Gateway);
        assert_eq!(config.session.ack_timeout_ms, 500);
        assert_eq!(config.routing.rcs_capacity, 2);
        assert_eq!(config.stations.prefix, DEFAULT_STATION_PREFIX);
        assert_eq!(
            config.endpoint().unwrap(),
            SerialEndpoint::Device(PathBuf::from("/dev/ttyUSB0"))
        );
    }

    #[test]
    fn test_load_from_file() {
        let yaml_content = r#"
role: node
serial:
  tcp: "127.0.0.1:4001"
session:
  ack_timeout_ms: 750
  max_retries: 5
routing:
  rcs_capacity: 8
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml_content.as_bytes()).unwrap();

        let config = GatewayConfig::load_from_file(temp_file.path()).unwrap();

        assert_eq!(config.role, Role::Node);
        assert_eq!(config.endpoint().unwrap(), SerialEndpoint::Tcp("127.0.0.1:4001".into()));
        assert_eq!(config.session_config().ack_timeout, Duration::from_millis(750));
        assert_eq!(config.session.max_retries, 5);
        // Unset keys keep their defaults
        assert_eq!(config.session.read_timeout_ms, 250);
        assert_eq!(config.routing.rcs_capacity, 8);
        assert_eq!(config.routing.nib_capacity, DEFAULT_NIB_CAPACITY);
    }

    #[test]
    fn test_unparseable_file_uses_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"role: [not, a, role]\n").unwrap();

        let config = GatewayConfig::load_from_file(temp_file.path()).unwrap();
        assert_eq!(config.routing, RoutingSettings::default());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("VAINA_ROLE", "NODE"),
            ("VAINA_SERIAL_TCP", "bridge.local:7000"),
            ("VAINA_ACK_TIMEOUT_MS", "120"),
            ("VAINA_MAX_RETRIES", "not-a-number"),
        ]);

        let mut config = GatewayConfig::default();
        config.apply_overrides(|key| env.get(key).map(|value| value.to_string()));

        assert_eq!(config.role, Role::Node);
        assert_eq!(
            config.endpoint().unwrap(),
            SerialEndpoint::Tcp("bridge.local:7000".into())
        );
        assert_eq!(config.session.ack_timeout_ms, 120);
        assert_eq!(config.session.max_retries, 3);
    }

    #[test]
    fn test_missing_endpoint() {
        let mut config = GatewayConfig::default();
        config.serial.device = None;
        assert!(config.endpoint().is_err());
    }
}
