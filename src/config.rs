//! Server plugin configuration

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Result, TimingError};

/// Settings for the UDP plugin endpoint and the internal queues.
///
/// Every key is optional in YAML; missing keys take the defaults below.
///
/// ```rust
/// use paddock::ServerConfig;
///
/// let config = ServerConfig::from_yaml_str("listen_port: 12000\ntelemetry_interval_ms: 250").unwrap();
/// assert_eq!(config.listen_port, 12000);
/// assert_eq!(config.max_car_slots, 50);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Local UDP port the server sends plugin packets to
    pub listen_port: u16,
    /// Server address for control packets; auto-detected when unset
    pub server_host: Option<String>,
    pub server_port: Option<u16>,
    /// Requested `CarUpdate` interval per car
    pub telemetry_interval_ms: u16,
    /// Car slots probed with car info requests on every new session
    pub max_car_slots: u8,
    pub event_queue_capacity: usize,
    pub realtime_bus_capacity: usize,
    pub persistence_bus_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_port: 9996,
            server_host: None,
            server_port: None,
            telemetry_interval_ms: 100,
            max_car_slots: 50,
            event_queue_capacity: 50_000,
            realtime_bus_capacity: 50_000,
            persistence_bus_capacity: 50_000,
        }
    }
}

impl ServerConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: ServerConfig = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| TimingError::io(format!("reading {}", path.display()), e))?;
        debug!(path = %path.display(), "Loaded server configuration");
        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, capacity) in [
            ("event_queue_capacity", self.event_queue_capacity),
            ("realtime_bus_capacity", self.realtime_bus_capacity),
            ("persistence_bus_capacity", self.persistence_bus_capacity),
        ] {
            if capacity == 0 {
                return Err(TimingError::config(format!("{} must be greater than zero", name)));
            }
        }
        if self.telemetry_interval_ms == 0 {
            return Err(TimingError::config("telemetry_interval_ms must be greater than zero"));
        }
        if self.server_host.is_some() != self.server_port.is_some() {
            return Err(TimingError::config("server_host and server_port must be set together"));
        }
        Ok(())
    }

    /// The explicitly configured server endpoint, if any.
    pub fn server_endpoint(&self) -> Result<Option<SocketAddr>> {
        let (Some(host), Some(port)) = (&self.server_host, self.server_port) else {
            return Ok(None);
        };
        let mut addrs = (host.as_str(), port)
            .to_socket_addrs()
            .map_err(|e| TimingError::config(format!("cannot resolve {}:{}: {}", host, port, e)))?;
        addrs
            .next()
            .map(Some)
            .ok_or_else(|| TimingError::config(format!("{}:{} resolved to no address", host, port)))
    }

    /// Local address the event source binds.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.listen_port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_a_stock_server() {
        let config = ServerConfig::default();
        assert_eq!(config.listen_port, 9996);
        assert_eq!(config.telemetry_interval_ms, 100);
        assert_eq!(config.max_car_slots, 50);
        assert_eq!(config.event_queue_capacity, 50_000);
        assert!(config.validate().is_ok());
        assert_eq!(config.server_endpoint().unwrap(), None);
    }

    #[test]
    fn empty_yaml_is_the_default() {
        assert_eq!(ServerConfig::from_yaml_str("{}").unwrap(), ServerConfig::default());
    }

    #[test]
    fn explicit_endpoint_resolves() {
        let config =
            ServerConfig::from_yaml_str("server_host: 127.0.0.1\nserver_port: 12000").unwrap();
        assert_eq!(config.server_endpoint().unwrap(), Some("127.0.0.1:12000".parse().unwrap()));
    }

    #[test]
    fn host_without_port_is_rejected() {
        let err = ServerConfig::from_yaml_str("server_host: 10.0.0.2").unwrap_err();
        assert!(matches!(err, TimingError::Config { .. }));
    }

    #[test]
    fn zero_capacities_are_rejected() {
        assert!(ServerConfig::from_yaml_str("realtime_bus_capacity: 0").is_err());
        assert!(ServerConfig::from_yaml_str("telemetry_interval_ms: 0").is_err());
    }

    #[test]
    fn unknown_types_are_config_errors() {
        let err = ServerConfig::from_yaml_str("listen_port: not-a-port").unwrap_err();
        assert!(matches!(err, TimingError::Config { .. }));
    }
}
