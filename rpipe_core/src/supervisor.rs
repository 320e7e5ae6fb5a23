//! Service supervisor: the end-to-end lifecycle of one tunnel endpoint.
//!
//! The lifecycle is strictly sequential: ensure the control channel, run the
//! role's `pre_configure`, spawn the endpoint, consume its readiness banner,
//! bring the tunnel interface up and address it, run `post_configure`, then
//! stream the endpoint's output until it exits. The only compensating action
//! is killing the child when a step after the spawn fails; network state
//! already applied is never rolled back.

use crate::config::{ConfigError, ServiceConfig};
use crate::control::{ChannelError, ControlChannel, CHANNEL_MODE, DEFAULT_CHANNEL_DIR};
use crate::netconf::{NetError, NetworkConfigurator};
use crate::process::{exit_code, ExternalProcess, ProcessError};
use crate::PRODUCT;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// How long the supervisor waits for the readiness banner before giving up
/// and killing the endpoint.
pub const READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Result alias for supervisor operations.
pub type SupervisorResult<T> = Result<T, SupervisorError>;

/// Fatal failures of a supervised run. The endpoint's own exit code is not
/// an error; it is returned from [`ServiceSupervisor::run`] and propagated
/// verbatim by the launcher.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Missing or malformed required option
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Control-channel creation failure
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Role-specific pre-check failed before the endpoint was spawned
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// The endpoint did not emit the expected banner as its first line
    #[error("endpoint did not report ready (received: {received:?}, exit code: {exit_code:?})")]
    Readiness {
        /// The first line actually received, if any arrived before
        /// end-of-stream or the timeout.
        received: Option<String>,
        /// The endpoint's exit code after the kill, if one was available.
        exit_code: Option<i32>,
    },

    /// An OS network-configuration command returned non-zero
    #[error("Network configuration failed: {0}")]
    ConfigCommand(#[from] NetError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// State of the supervised lifecycle. Linear, with `Failed` absorbing any
/// error before the streaming phase completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Init,
    PreConfiguring,
    Launching,
    AwaitingReady,
    ConfiguringNetwork,
    PostConfiguring,
    Running,
    Terminated,
    Failed,
}

/// What a role hook gets to work with: the immutable service configuration
/// and the network configurator, for role-specific interface and route
/// changes under the same blocking-command contract as the base steps.
pub struct HookContext<'a> {
    pub config: &'a ServiceConfig,
    pub net: &'a dyn NetworkConfigurator,
}

/// Role-specific behavior injected into the supervisor at construction.
///
/// `pre_configure` runs before the endpoint exists and may fail; it must not
/// leave persistent side effects behind when it does. `post_configure` runs
/// after the base interface/address commands succeed; a failure there is
/// fatal and the supervisor kills the endpoint before surfacing it.
#[async_trait]
pub trait RoleHooks: Send + Sync {
    /// Role label used in the readiness banner ("client" or "server").
    fn role(&self) -> &'static str;

    /// Extra configuration keys this role understands. Never fails; a
    /// required role option is validated lazily inside `pre_configure`.
    fn service_options(&self) -> &'static [&'static str] {
        &[]
    }

    async fn pre_configure(&self, ctx: &HookContext<'_>) -> SupervisorResult<()> {
        let _ = ctx;
        Ok(())
    }

    async fn post_configure(&self, ctx: &HookContext<'_>) -> SupervisorResult<()> {
        let _ = ctx;
        Ok(())
    }
}

/// Supervises one tunnel-endpoint instance from launch to exit.
pub struct ServiceSupervisor<R: RoleHooks> {
    config: ServiceConfig,
    hooks: R,
    net: Arc<dyn NetworkConfigurator>,
    channel_dir: PathBuf,
    ready_timeout: Option<Duration>,
    state: SupervisorState,
}

impl<R: RoleHooks> ServiceSupervisor<R> {
    pub fn new(config: ServiceConfig, hooks: R, net: Arc<dyn NetworkConfigurator>) -> Self {
        ServiceSupervisor {
            config,
            hooks,
            net,
            channel_dir: PathBuf::from(DEFAULT_CHANNEL_DIR),
            ready_timeout: Some(READY_TIMEOUT),
            state: SupervisorState::Init,
        }
    }

    /// Load the named service's configuration and build a supervisor around
    /// it. The role's option schema decides which extra keys are collected;
    /// a missing or malformed required option fails here, before any process
    /// is spawned or network state touched.
    pub fn load(
        name: &str,
        config_path: Option<&Path>,
        overrides: &HashMap<String, String>,
        hooks: R,
        net: Arc<dyn NetworkConfigurator>,
    ) -> SupervisorResult<Self> {
        let config = ServiceConfig::load(name, config_path, overrides, hooks.service_options())?;
        Ok(ServiceSupervisor::new(config, hooks, net))
    }

    /// Override the directory the control channel is created under.
    pub fn with_channel_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.channel_dir = dir.into();
        self
    }

    /// Override or disable the readiness timeout.
    pub fn with_ready_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.ready_timeout = timeout;
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// The exact banner the endpoint's first output line must start with.
    pub fn banner(&self) -> String {
        format!("{} {} running", PRODUCT, self.hooks.role())
    }

    /// Run the full lifecycle and return the endpoint's exit code.
    pub async fn run(&mut self, executable: &Path) -> SupervisorResult<i32> {
        match self.run_lifecycle(executable).await {
            Ok(code) => {
                self.set_state(SupervisorState::Terminated);
                Ok(code)
            }
            Err(err) => {
                self.set_state(SupervisorState::Failed);
                Err(err)
            }
        }
    }

    async fn run_lifecycle(&mut self, executable: &Path) -> SupervisorResult<i32> {
        let channel = ControlChannel::ensure(&self.channel_dir, &self.config.name, CHANNEL_MODE)?;
        debug!(path = %channel.path().display(), "control channel ready");

        self.set_state(SupervisorState::PreConfiguring);
        let ctx = HookContext {
            config: &self.config,
            net: &*self.net,
        };
        self.hooks.pre_configure(&ctx).await?;

        self.set_state(SupervisorState::Launching);
        let mut endpoint = ExternalProcess::spawn(executable)?;

        self.set_state(SupervisorState::AwaitingReady);
        let banner = self.banner();
        match endpoint.await_ready(self.ready_timeout).await {
            Ok(line) if line.starts_with(&banner) => {
                info!(service = %self.config.name, "endpoint ready, configuring network");
            }
            Ok(line) => {
                warn!(service = %self.config.name, received = %line, "unexpected response from endpoint");
                let status = endpoint.kill_and_wait().await?;
                return Err(SupervisorError::Readiness {
                    received: Some(line),
                    exit_code: status.code(),
                });
            }
            Err(ProcessError::Io(err)) => {
                let _ = endpoint.kill_and_wait().await;
                return Err(SupervisorError::Io(err));
            }
            Err(reason @ (ProcessError::EndOfStream | ProcessError::Timeout(_))) => {
                warn!(service = %self.config.name, %reason, "endpoint never became ready");
                let status = endpoint.kill_and_wait().await?;
                return Err(SupervisorError::Readiness {
                    received: None,
                    exit_code: status.code(),
                });
            }
        }

        self.set_state(SupervisorState::ConfiguringNetwork);
        if let Err(err) = self.configure_network().await {
            let _ = endpoint.kill_and_wait().await;
            return Err(err);
        }

        self.set_state(SupervisorState::PostConfiguring);
        let ctx = HookContext {
            config: &self.config,
            net: &*self.net,
        };
        if let Err(err) = self.hooks.post_configure(&ctx).await {
            let _ = endpoint.kill_and_wait().await;
            return Err(err);
        }

        self.set_state(SupervisorState::Running);
        loop {
            match endpoint.next_line().await {
                Ok(Some(line)) => info!(service = %self.config.name, "{}", line),
                Ok(None) => break,
                Err(err) => {
                    let _ = endpoint.kill_and_wait().await;
                    return Err(err.into());
                }
            }
        }

        let status = endpoint.wait().await?;
        let code = exit_code(status);
        info!(service = %self.config.name, code, "endpoint exited");
        Ok(code)
    }

    async fn configure_network(&self) -> SupervisorResult<()> {
        self.net.link_up(&self.config.tunnel_interface).await?;
        self.net
            .assign_address(&self.config.tunnel_interface, &self.config.bind_ip)
            .await?;
        Ok(())
    }

    fn set_state(&mut self, next: SupervisorState) {
        debug!(service = %self.config.name, from = ?self.state, to = ?next, "state transition");
        self.state = next;
    }
}
