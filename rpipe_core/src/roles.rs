//! Client and server role hooks.
//!
//! Both roles share the supervisor contract; they differ only in the hook
//! bodies and the extra configuration keys they understand.

use crate::supervisor::{HookContext, RoleHooks, SupervisorError, SupervisorResult};
use async_trait::async_trait;
use tracing::info;

/// Client role: routes all traffic through the tunnel once the endpoint is
/// up, via the first usable host of the bind network (the server's end).
#[derive(Debug, Default)]
pub struct ClientRole;

#[async_trait]
impl RoleHooks for ClientRole {
    fn role(&self) -> &'static str {
        "client"
    }

    async fn post_configure(&self, ctx: &HookContext<'_>) -> SupervisorResult<()> {
        let gateway = ctx.config.bind_ip.gateway();
        ctx.net.add_default_route(gateway).await?;
        info!(gateway = %gateway, "default route installed through the tunnel");
        Ok(())
    }
}

/// Server role: requires a `wan_interface` option and a MASQUERADE rule on
/// it so tunneled traffic can reach the internet. The rule is verified
/// before the endpoint is spawned; a missing rule aborts the run.
#[derive(Debug, Default)]
pub struct ServerRole;

#[async_trait]
impl RoleHooks for ServerRole {
    fn role(&self) -> &'static str {
        "server"
    }

    fn service_options(&self) -> &'static [&'static str] {
        &["wan_interface"]
    }

    async fn pre_configure(&self, ctx: &HookContext<'_>) -> SupervisorResult<()> {
        let wan = ctx
            .config
            .role_specific
            .get("wan_interface")
            .ok_or_else(|| {
                SupervisorError::Precondition("wan_interface is not configured".to_string())
            })?;

        if !ctx.net.nat_rule_present(wan).await? {
            return Err(SupervisorError::Precondition(format!(
                "NAT is not configured for {wan}. Run: \
                 iptables -t nat -A POSTROUTING -o {wan} -j MASQUERADE"
            )));
        }

        info!(wan_interface = %wan, "NAT rule present");
        Ok(())
    }
}
