//! Control-plane components for Rural Pipe tunnel endpoints.
//!
//! This crate supervises the lifecycle of one tunnel-endpoint process per
//! service: it loads configuration, ensures the per-service control channel
//! exists, launches the endpoint executable, validates its readiness banner,
//! applies the OS network configuration the tunnel interface needs, and
//! streams the endpoint's output until it exits. Client and server roles are
//! variants of the same supervisor contract, differing only in their hook
//! bodies and extra configuration keys.

pub mod config;
pub mod control;
pub mod logging;
pub mod netconf;
pub mod process;
pub mod roles;
pub mod supervisor;

/// Product name, used as the prefix of the readiness banner every endpoint
/// must emit as its first line of output.
pub const PRODUCT: &str = "Rural Pipe";

pub use config::{ConfigError, NetworkBinding, ServiceConfig};
pub use supervisor::{RoleHooks, ServiceSupervisor, SupervisorError};
