use async_trait::async_trait;

use super::plan::{self, ApplyOutcome, Plan, RemovalReport};
use super::ForwardRule;
use crate::error::{NetmgrError, NetmgrResult};
use crate::executor::CommandRunner;
use tracing::debug;

/// Common interface that every port forwarding backend implements
///
/// A backend only describes what to run; the provided methods execute those
/// plans through a [`CommandRunner`], so the same backend serves real runs,
/// dry runs and tests.
#[async_trait]
pub trait PlatformBackend: Send + Sync {
    /// Name of this backend (e.g., "linux", "windows", "macos")
    fn name(&self) -> &'static str;

    /// External tools the plans shell out to
    fn required_tools(&self) -> &'static [&'static str];

    /// Steps that turn on IP forwarding host-wide (may be empty)
    fn ip_forwarding_plan(&self) -> Plan;

    /// Ordered steps that realize `rule`
    fn apply_plan(&self, rule: &ForwardRule) -> Plan;

    /// Steps that tear `rule` down
    fn remove_plan(&self, rule: &ForwardRule) -> Plan;

    /// Whether the native tooling can forward to an IPv6 destination
    fn supports_ipv6(&self) -> bool {
        false
    }

    /// Enable IP forwarding
    async fn enable_ip_forwarding(&self, runner: &dyn CommandRunner) -> NetmgrResult<()> {
        let forwarding = self.ip_forwarding_plan();
        if forwarding.is_empty() {
            debug!("The {} backend has no host-wide forwarding switch", self.name());
            return Ok(());
        }

        let outcome = plan::execute(runner, &forwarding, false).await;
        match outcome.failed {
            Some(step) => Err(NetmgrError::BackendStepFailed {
                rule: "ip-forwarding".to_string(),
                step,
            }),
            None => Ok(()),
        }
    }

    /// Apply `rule`; the outcome succeeded only if every required step did
    async fn apply(
        &self,
        runner: &dyn CommandRunner,
        rule: &ForwardRule,
        rollback: bool,
    ) -> ApplyOutcome {
        plan::execute(runner, &self.apply_plan(rule), rollback).await
    }

    /// Tear `rule` down, attempting every step
    async fn remove(&self, runner: &dyn CommandRunner, rule: &ForwardRule) -> RemovalReport {
        plan::execute_all(runner, &self.remove_plan(rule)).await
    }
}
