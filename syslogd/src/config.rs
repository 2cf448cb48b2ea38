//! syslogd configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use syslogd_common::LoggingConfig;

use crate::filter::{FilterConfig, MessageFilter};

/// Default receive buffer size in bytes.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024;

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Syslog server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Syslog server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listener configurations.
    #[serde(default)]
    pub listeners: Vec<ListenerConfig>,

    /// Extra characters accepted in program tags besides letters and digits.
    #[serde(default)]
    pub allowed_tag_runes: String,

    /// Hostname overrides keyed by source IP or reported hostname.
    #[serde(default)]
    pub hostname_aliases: HashMap<String, String>,

    /// Message filtering configuration.
    #[serde(default)]
    pub filter: FilterConfig,

    /// Where accepted messages are written.
    #[serde(default)]
    pub output: OutputKind,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listeners: vec![ListenerConfig::new(Transport::Datagram, "0.0.0.0:514")],
            allowed_tag_runes: String::new(),
            hostname_aliases: HashMap::new(),
            filter: FilterConfig::default(),
            output: OutputKind::default(),
        }
    }
}

/// Individual listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Transport: "udp", "tcp", or "unix".
    pub protocol: Transport,

    /// Bind address.
    /// - For UDP/TCP: "0.0.0.0:514"
    /// - For Unix: "/var/run/syslog.sock"
    pub bind: String,

    /// Receive buffer size in bytes; longer packets are truncated.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Unix socket: file permissions (octal, e.g., 0o666 = 438).
    #[serde(default = "default_socket_mode")]
    pub socket_mode: u32,

    /// Unix socket: remove existing socket file before binding.
    #[serde(default = "default_true")]
    pub remove_existing_socket: bool,
}

fn default_max_message_size() -> usize {
    DEFAULT_MAX_MESSAGE_SIZE
}

fn default_socket_mode() -> u32 {
    0o666
}

fn default_true() -> bool {
    true
}

impl ListenerConfig {
    /// Listener with default settings.
    pub fn new(protocol: Transport, bind: impl Into<String>) -> Self {
        Self {
            protocol,
            bind: bind.into(),
            max_message_size: default_max_message_size(),
            socket_mode: default_socket_mode(),
            remove_existing_socket: default_true(),
        }
    }
}

/// Transport kind of a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Transport {
    /// Connectionless datagrams over the network.
    #[serde(rename = "udp")]
    Datagram,
    /// Connection-oriented stream over the network.
    #[serde(rename = "tcp")]
    Stream,
    /// Connection-oriented stream over a local Unix socket.
    #[serde(rename = "unix")]
    Local,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Datagram => "udp",
            Self::Stream => "tcp",
            Self::Local => "unix",
        }
    }

    /// Whether the bind address is a `host:port` pair.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Datagram | Self::Stream)
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "udp" => Ok(Self::Datagram),
            "tcp" => Ok(Self::Stream),
            "unix" => Ok(Self::Local),
            other => Err(format!("unknown transport '{}'", other)),
        }
    }
}

/// Output handler placed at the end of the chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// Emit messages as tracing events.
    #[default]
    Log,
    /// Write messages to stdout as JSON lines.
    Json,
}

impl DaemonConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let config: Self = syslogd_common::load_config(path)?;
        config.validate_config()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate_config(&self) -> anyhow::Result<()> {
        if self.server.listeners.is_empty() {
            anyhow::bail!("At least one listener must be configured");
        }

        for (i, listener) in self.server.listeners.iter().enumerate() {
            if listener.bind.is_empty() {
                anyhow::bail!("Listener {} has empty bind address", i);
            }

            if listener.max_message_size == 0 {
                anyhow::bail!("Listener {} has a zero max_message_size", i);
            }

            // Unix socket paths need no port.
            if listener.protocol.is_network() && !listener.bind.contains(':') {
                anyhow::bail!(
                    "Listener {} bind address must include port (e.g., '0.0.0.0:514')",
                    i
                );
            }
        }

        MessageFilter::compile(&self.server.filter)?;

        Ok(())
    }
}
