//! Configuration management for Rural Pipe services.
//!
//! A service reads its options from a TOML file (a `[settings]` table of
//! string values) and from command-line overrides supplied by the launcher.
//! Precedence is flag > file; a missing required option is fatal. The loaded
//! `ServiceConfig` is immutable for the lifetime of the supervisor.

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error reading configuration file
    #[error("Failed to read config file: {0}")]
    Io(#[from] io::Error),

    /// Error parsing TOML configuration
    #[error("Failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    /// Missing required configuration value
    #[error("Missing required configuration value: {0}")]
    MissingValue(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration file not found
    #[error("Configuration file not found at {0}")]
    FileNotFound(PathBuf),
}

/// An IPv4 host address inside a network, expressed in CIDR form
/// (e.g. "10.8.0.2/24"). Derives the network address and the tunnel
/// gateway (the first usable host of the network).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkBinding {
    addr: Ipv4Addr,
    prefix: u8,
}

impl NetworkBinding {
    /// Parse an "address/prefix" string. The address must be a host within
    /// the network: the prefix must leave room for at least two hosts, and
    /// the address must be neither the network nor the broadcast address.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: "bind_ip".to_string(),
            message,
        };

        let (addr_part, prefix_part) = value
            .split_once('/')
            .ok_or_else(|| invalid(format!("expected CIDR notation, got {value:?}")))?;

        let addr: Ipv4Addr = addr_part
            .parse()
            .map_err(|e| invalid(format!("invalid IPv4 address {addr_part:?}: {e}")))?;

        let prefix: u8 = prefix_part
            .parse()
            .map_err(|e| invalid(format!("invalid prefix length {prefix_part:?}: {e}")))?;

        if prefix > 30 {
            return Err(invalid(format!(
                "prefix /{prefix} leaves no room for distinct hosts"
            )));
        }

        let binding = NetworkBinding { addr, prefix };
        if addr == binding.network() || addr == binding.broadcast() {
            return Err(invalid(format!(
                "{value} is not a host address within its network"
            )));
        }

        Ok(binding)
    }

    /// The host address.
    pub fn addr(&self) -> Ipv4Addr {
        self.addr
    }

    /// The network prefix length.
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    fn mask(&self) -> u32 {
        if self.prefix == 0 {
            0
        } else {
            u32::MAX << (32 - self.prefix)
        }
    }

    /// The network address (host bits cleared).
    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.addr) & self.mask())
    }

    /// The broadcast address (host bits set).
    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.addr) | !self.mask())
    }

    /// The first usable host of the network. The server end of the tunnel
    /// binds here, so the client routes through it.
    pub fn gateway(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network()) + 1)
    }
}

impl fmt::Display for NetworkBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

/// Shape of a service configuration file.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    settings: HashMap<String, String>,
}

/// Immutable configuration of one supervised service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Service name ("client" or "server"); also names the control channel
    /// and the default endpoint executable.
    pub name: String,

    /// Name of the tunnel interface device the endpoint creates.
    pub tunnel_interface: String,

    /// Address to assign to the tunnel interface.
    pub bind_ip: NetworkBinding,

    /// Role-specific options (e.g. `wan_interface` for the server role).
    /// Validated lazily by the role's `pre_configure`.
    pub role_specific: HashMap<String, String>,
}

impl ServiceConfig {
    /// Load configuration for the named service.
    ///
    /// When `config_path` is `None`, `<name>.toml` in the working directory
    /// is read if it exists; an explicitly given path must exist. Values in
    /// `overrides` win over the file. `role_options` lists the extra keys
    /// the role understands; they are collected into `role_specific`.
    pub fn load(
        name: &str,
        config_path: Option<&Path>,
        overrides: &HashMap<String, String>,
        role_options: &[&str],
    ) -> Result<Self, ConfigError> {
        let mut options = match config_path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::FileNotFound(path.to_path_buf()));
                }
                Self::read_file(path)?
            }
            None => {
                let default = PathBuf::from(format!("{name}.toml"));
                if default.exists() {
                    Self::read_file(&default)?
                } else {
                    HashMap::new()
                }
            }
        };

        options.extend(overrides.clone());
        Self::from_options(name, options, role_options)
    }

    /// Build a validated configuration from an already-merged option map.
    pub fn from_options(
        name: &str,
        options: HashMap<String, String>,
        role_options: &[&str],
    ) -> Result<Self, ConfigError> {
        let tunnel_interface = options
            .get("tunnel_interface")
            .cloned()
            .ok_or_else(|| ConfigError::MissingValue("tunnel_interface".to_string()))?;
        if tunnel_interface.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "tunnel_interface".to_string(),
                message: "interface name must be non-empty".to_string(),
            });
        }

        let bind_ip = options
            .get("bind_ip")
            .ok_or_else(|| ConfigError::MissingValue("bind_ip".to_string()))
            .and_then(|v| NetworkBinding::parse(v))?;

        let role_specific = role_options
            .iter()
            .filter_map(|key| {
                options
                    .get(*key)
                    .map(|value| (key.to_string(), value.clone()))
            })
            .collect();

        Ok(ServiceConfig {
            name: name.to_string(),
            tunnel_interface,
            bind_ip,
            role_specific,
        })
    }

    fn read_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let file: ConfigFile = toml::from_str(&content)?;
        Ok(file.settings)
    }
}
