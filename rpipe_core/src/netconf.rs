//! OS-level network configuration for the tunnel interface.
//!
//! The configurator issues blocking external commands, strictly in the order
//! the supervisor calls them. A non-zero exit from any command is fatal; no
//! rollback of earlier successful commands is attempted. The trait seam lets
//! tests substitute a recording implementation for the real `ip`/`iptables`
//! invocations.

use crate::config::NetworkBinding;
use async_trait::async_trait;
use std::net::Ipv4Addr;
use thiserror::Error;
use tokio::process::Command as TokioCommand;
use tracing::debug;

/// Result alias for network configuration operations.
pub type NetResult<T> = Result<T, NetError>;

/// Errors surfaced by network configuration operations.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("System command `{command}` failed: {stderr}")]
    CommandFailure { command: String, stderr: String },
}

/// Network state changes the supervisor and role hooks may apply.
#[async_trait]
pub trait NetworkConfigurator: Send + Sync {
    /// Bring the named interface administratively up.
    async fn link_up(&self, interface: &str) -> NetResult<()>;

    /// Assign the configured address/prefix to the interface.
    async fn assign_address(&self, interface: &str, binding: &NetworkBinding) -> NetResult<()>;

    /// Install a default route via the given gateway.
    async fn add_default_route(&self, gateway: Ipv4Addr) -> NetResult<()>;

    /// Whether a MASQUERADE rule exists for traffic leaving `wan_interface`.
    async fn nat_rule_present(&self, wan_interface: &str) -> NetResult<bool>;
}

/// Configurator backed by the `ip` and `iptables` command-line tools.
/// Requires the caller to run with enough privilege to modify interfaces
/// and inspect the NAT table; the launcher checks that before the
/// supervisor starts.
#[derive(Debug, Default)]
pub struct LinuxNetworkConfigurator;

impl LinuxNetworkConfigurator {
    pub fn new() -> Self {
        Self
    }

    pub(crate) async fn run_command(&self, command: &str, args: &[&str]) -> NetResult<String> {
        debug!(cmd = command, ?args, "running network command");
        let output = TokioCommand::new(command)
            .args(args)
            .output()
            .await
            .map_err(NetError::Io)?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(NetError::CommandFailure {
                command: format!("{} {}", command, args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl NetworkConfigurator for LinuxNetworkConfigurator {
    async fn link_up(&self, interface: &str) -> NetResult<()> {
        self.run_command("ip", &["link", "set", "dev", interface, "up"])
            .await?;
        Ok(())
    }

    async fn assign_address(&self, interface: &str, binding: &NetworkBinding) -> NetResult<()> {
        self.run_command(
            "ip",
            &["addr", "add", &binding.to_string(), "dev", interface],
        )
        .await?;
        Ok(())
    }

    async fn add_default_route(&self, gateway: Ipv4Addr) -> NetResult<()> {
        self.run_command("ip", &["route", "add", "default", "via", &gateway.to_string()])
            .await?;
        Ok(())
    }

    async fn nat_rule_present(&self, wan_interface: &str) -> NetResult<bool> {
        // `iptables -C` exits 0 when the rule exists and 1 when it does not;
        // anything else is a real failure.
        let output = TokioCommand::new("iptables")
            .args([
                "-t",
                "nat",
                "-C",
                "POSTROUTING",
                "-o",
                wan_interface,
                "-j",
                "MASQUERADE",
            ])
            .output()
            .await
            .map_err(NetError::Io)?;

        if output.status.success() {
            return Ok(true);
        }
        if output.status.code() == Some(1) {
            return Ok(false);
        }

        Err(NetError::CommandFailure {
            command: format!("iptables -t nat -C POSTROUTING -o {wan_interface} -j MASQUERADE"),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}
