//! Gateway configuration.
//!
//! Loaded from a TOML file. Every key has a default, so an empty file (or
//! no file at all) describes a gateway on the usual ports:
//!
//! ```toml
//! [http]
//! bind = "0.0.0.0:3000"
//!
//! [lock]
//! port = "/dev/ttyUSB0"
//! controller_id = 0
//!
//! [sensor]
//! mode = "serial"          # or "network"
//! port = "/dev/ttyUSB1"
//! device_ids = [5, 6, 7, 8]
//! ```

use elocker_core::DeviceId;
use elocker_core::constants::{
    CU_BAUD_RATE, DEFAULT_CU_CONTROLLER, DEFAULT_DISCOVERY_INTERVAL, DEFAULT_HTTP_BIND,
    DEFAULT_LOCK_POLL_INTERVAL, DEFAULT_SENSOR_TIMEOUT, DEFAULT_UNLOCK_SETTLE,
    DISCOVERY_BROADCAST_ADDR, DISCOVERY_PORT, DISCOVERY_PROBE, DISCOVERY_REPLY,
    MAX_CONTROLLER_ID, RECONNECT_BASE_DELAY, RECONNECT_MAX_DELAY, SENSOR_BAUD_RATE,
    WIRED_DEVICE_IDS,
};
use elocker_network::{DiscoveryConfig, PeerLinkConfig};
use elocker_protocol::FramingMode;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{GatewayError, Result};

/// Config file read when no path is given.
pub const DEFAULT_CONFIG_PATH: &str = "elocker.toml";

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub http: HttpConfig,
    pub lock: LockConfig,
    pub sensor: SensorConfig,
    pub discovery: DiscoverySettings,
    pub reconnect: ReconnectConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_HTTP_BIND.to_string(),
        }
    }
}

/// CU lock controller link.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LockConfig {
    pub port: String,
    pub baud_rate: u32,
    pub controller_id: u8,
    pub poll_interval_ms: u64,

    /// Pause between an open command and the follow-up status query.
    pub settle_ms: u64,

    /// Open slots that report locked while drawing no current.
    pub release_empty_slots: bool,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: CU_BAUD_RATE,
            controller_id: DEFAULT_CU_CONTROLLER,
            poll_interval_ms: DEFAULT_LOCK_POLL_INTERVAL,
            settle_ms: DEFAULT_UNLOCK_SETTLE,
            release_empty_slots: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorMode {
    /// Sensors polled over a local serial bus.
    #[default]
    Serial,
    /// Sensor readings tunnelled from a discovered peer.
    Network,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    #[default]
    Length,
    Delimited,
}

impl From<Framing> for FramingMode {
    fn from(framing: Framing) -> Self {
        match framing {
            Framing::Length => FramingMode::LengthPrefixed,
            Framing::Delimited => FramingMode::Delimited,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SensorConfig {
    pub mode: SensorMode,
    pub port: String,
    pub baud_rate: u32,
    pub device_ids: Vec<u8>,
    pub timeout_ms: u64,
    pub framing: Framing,

    /// Open a slot on its own once the charge gate passes.
    pub auto_unlock: bool,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            mode: SensorMode::default(),
            port: "/dev/ttyUSB1".to_string(),
            baud_rate: SENSOR_BAUD_RATE,
            device_ids: WIRED_DEVICE_IDS.to_vec(),
            timeout_ms: DEFAULT_SENSOR_TIMEOUT,
            framing: Framing::default(),
            auto_unlock: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoverySettings {
    pub port: u16,
    pub broadcast_addr: String,
    pub interval_ms: u64,
    pub probe: String,
    pub reply: String,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            port: DISCOVERY_PORT,
            broadcast_addr: DISCOVERY_BROADCAST_ADDR.to_string(),
            interval_ms: DEFAULT_DISCOVERY_INTERVAL,
            probe: DISCOVERY_PROBE.to_string(),
            reply: DISCOVERY_REPLY.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub base_ms: u64,
    pub max_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_ms: RECONNECT_BASE_DELAY,
            max_ms: RECONNECT_MAX_DELAY,
            connect_timeout_ms: 3000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("store.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive; `RUST_LOG` takes precedence.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Read and validate a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| GatewayError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: GatewayConfig =
            toml::from_str(&contents).map_err(|source| GatewayError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Check values serde cannot check.
    pub fn validate(&self) -> std::result::Result<(), elocker_core::Error> {
        use elocker_core::Error;

        if self.lock.controller_id > MAX_CONTROLLER_ID {
            return Err(Error::Config(format!(
                "lock.controller_id must be 0-15, got {}",
                self.lock.controller_id
            )));
        }
        if self.sensor.mode == SensorMode::Serial && self.sensor.device_ids.is_empty() {
            return Err(Error::MissingConfig("sensor.device_ids".to_string()));
        }
        for (key, value) in [
            ("lock.poll_interval_ms", self.lock.poll_interval_ms),
            ("sensor.timeout_ms", self.sensor.timeout_ms),
            ("discovery.interval_ms", self.discovery.interval_ms),
            ("reconnect.base_ms", self.reconnect.base_ms),
            ("reconnect.connect_timeout_ms", self.reconnect.connect_timeout_ms),
        ] {
            if value == 0 {
                return Err(Error::Config(format!("{key} must be greater than 0")));
            }
        }
        self.discovery_config()?;
        Ok(())
    }

    pub fn device_ids(&self) -> Vec<DeviceId> {
        self.sensor.device_ids.iter().copied().map(DeviceId::new).collect()
    }

    pub fn discovery_config(&self) -> std::result::Result<DiscoveryConfig, elocker_core::Error> {
        let settings = &self.discovery;
        let broadcast: IpAddr = settings.broadcast_addr.parse().map_err(|_| {
            elocker_core::Error::Config(format!(
                "discovery.broadcast_addr is not an IP address: {}",
                settings.broadcast_addr
            ))
        })?;

        Ok(DiscoveryConfig {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), settings.port),
            target: SocketAddr::new(broadcast, settings.port),
            interval: Duration::from_millis(settings.interval_ms),
            probe: settings.probe.clone(),
            reply: settings.reply.clone(),
        })
    }

    pub fn peer_link_config(&self) -> PeerLinkConfig {
        PeerLinkConfig {
            connect_timeout: Duration::from_millis(self.reconnect.connect_timeout_ms),
            base_delay: Duration::from_millis(self.reconnect.base_ms),
            max_delay: Duration::from_millis(self.reconnect.max_ms),
        }
    }
}
