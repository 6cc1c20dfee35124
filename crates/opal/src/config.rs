//! Endpoint configuration.
//!
//! `opal.toml` mirrors the transport's tuning knobs; every field is
//! optional except the bind address, and missing fields fall back to the
//! defaults [`rakopal::Config`] itself ships with. On first run a
//! commented template is written out instead.

use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const FILE_NAME: &str = "opal.toml";

const TEMPLATE: &str = r#"# Opal transport endpoint.
address = "0.0.0.0:1001"

# Peers must present this during the handshake; empty means open.
password = ""

# Open-connection requests beyond this many peers are ignored.
max_connections = 64

[timers]
# Seconds without inbound traffic before a peer is reaped.
timeout = 10
# Seconds of outbound silence before a keepalive ping goes out.
ping_interval = 5
# Retransmission floor in milliseconds.
min_rto = 1000
# Unacknowledged retransmissions before a peer counts as lost.
max_resends = 10
"#;

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    pub address: SocketAddr,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default)]
    pub timers: Timers,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Timers {
    pub timeout: u64,
    pub ping_interval: u64,
    pub min_rto: u64,
    pub max_resends: u32,
}

fn default_max_connections() -> usize {
    rakopal::Config::default().max_connections
}

impl Default for Timers {
    fn default() -> Self {
        let transport = rakopal::Config::default();
        Self {
            timeout: transport.timeout.as_secs(),
            ping_interval: transport.ping_interval.as_secs(),
            min_rto: transport.min_rto.as_millis() as u64,
            max_resends: transport.max_resends,
        }
    }
}

impl EndpointConfig {
    /// Converts into the transport's config, rejecting combinations the
    /// endpoint cannot actually run with.
    pub fn transport(&self) -> Result<rakopal::Config, ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "max_connections of 0 refuses every handshake".to_string(),
            ));
        }
        let timers = &self.timers;
        if timers.min_rto == 0 {
            return Err(ConfigError::Invalid(
                "min_rto must be positive, retransmission cannot be immediate".to_string(),
            ));
        }
        if timers.max_resends == 0 {
            return Err(ConfigError::Invalid(
                "max_resends of 0 drops peers on the first lost datagram".to_string(),
            ));
        }
        if timers.ping_interval >= timers.timeout {
            return Err(ConfigError::Invalid(format!(
                "ping_interval ({}s) must be shorter than timeout ({}s) or idle \
                 peers get reaped between keepalives",
                timers.ping_interval, timers.timeout
            )));
        }
        Ok(rakopal::Config {
            password: self.password.clone(),
            max_connections: self.max_connections,
            timeout: Duration::from_secs(timers.timeout),
            ping_interval: Duration::from_secs(timers.ping_interval),
            min_rto: Duration::from_millis(timers.min_rto),
            max_resends: timers.max_resends,
            ..rakopal::Config::default()
        })
    }
}

/// Loads the configuration, writing the commented template first if the
/// file does not exist yet.
pub fn load(path: &Path) -> Result<EndpointConfig, ConfigError> {
    if !path.exists() {
        fs::write(path, TEMPLATE)?;
    }
    Ok(toml::from_str(&fs::read_to_string(path)?)?)
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
