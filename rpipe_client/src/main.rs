//! Rural Pipe client launcher.
//!
//! Starts the client tunnel-endpoint executable under the service
//! supervisor: waits for its readiness banner, brings the tunnel interface
//! up, routes all traffic through it, and streams the endpoint's output.
//! Exits with the endpoint's own exit code.

#[cfg(not(unix))]
compile_error!("rpipe_client is only supported on Unix-like systems");

use anyhow::Result;
use clap::Parser;
use rpipe_core::logging::{init_logging, level_from_str, LogOptions};
use rpipe_core::netconf::LinuxNetworkConfigurator;
use rpipe_core::roles::ClientRole;
use rpipe_core::supervisor::ServiceSupervisor;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

const SERVICE: &str = "client";

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Path to the configuration file (default: ./client.toml if present)
    #[clap(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// The name to use for the tunnel interface device
    #[clap(long, value_name = "NAME")]
    tunnel_interface: Option<String>,

    /// IP address to which to bind the network (CIDR, e.g. 10.8.0.2/24)
    #[clap(long, value_name = "ADDR")]
    bind_ip: Option<String>,

    /// Path to the tunnel endpoint executable (default: ./client)
    #[clap(long, value_name = "PATH")]
    executable: Option<PathBuf>,

    /// Log level (trace|debug|info|warn|error)
    #[clap(short, long, default_value = "info")]
    log_level: String,

    /// Emit logs in JSON format
    #[clap(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(LogOptions {
        level: level_from_str(&args.log_level),
        json_format: args.json_logs,
        ..Default::default()
    });

    if !nix::unistd::geteuid().is_root() {
        anyhow::bail!("the {SERVICE} launcher needs root privileges; try again with sudo");
    }

    let mut overrides = HashMap::new();
    if let Some(value) = args.tunnel_interface {
        overrides.insert("tunnel_interface".to_string(), value);
    }
    if let Some(value) = args.bind_ip {
        overrides.insert("bind_ip".to_string(), value);
    }

    let mut supervisor = ServiceSupervisor::load(
        SERVICE,
        args.config.as_deref(),
        &overrides,
        ClientRole,
        Arc::new(LinuxNetworkConfigurator::new()),
    )?;
    info!(
        service = SERVICE,
        interface = %supervisor.config().tunnel_interface,
        bind_ip = %supervisor.config().bind_ip,
        network = %supervisor.config().bind_ip.network(),
        "starting service"
    );

    let executable = args
        .executable
        .unwrap_or_else(|| PathBuf::from(format!("./{SERVICE}")));
    match supervisor.run(&executable).await {
        Ok(code) => {
            info!(service = SERVICE, code, "endpoint exited");
            std::process::exit(code);
        }
        Err(err) => {
            error!(service = SERVICE, "failed to run service: {err}");
            std::process::exit(1);
        }
    }
}
