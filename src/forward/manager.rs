use std::fmt::Write as _;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::backend::PlatformBackend;
use super::plan::RemovalReport;
use super::platform::{self, PlatformDetector};
use super::{ForwardCollection, ForwardRule, Protocol};
use crate::config::{ForwardSettings, NetmgrConfig};
use crate::error::{NetmgrError, NetmgrResult};
use crate::executor::{CommandRunner, ExecOptions, SystemRunner};
use crate::store::{ConfigStore, StoreLock};
use crate::validation;

/// Forward Manager - keeps `forwarding.json` and the host rules in step
///
/// Every command loads the collection, changes it, and writes it back whole.
/// A forward is written only after its backend plan succeeded; a removal is
/// written whether or not the teardown succeeded.
pub struct ForwardManager {
    store: ConfigStore,
    backend: Box<dyn PlatformBackend>,
    runner: Arc<dyn CommandRunner>,
    settings: ForwardSettings,
}

impl ForwardManager {
    /// Create a forward manager
    pub fn new(
        store: ConfigStore,
        backend: Box<dyn PlatformBackend>,
        runner: Arc<dyn CommandRunner>,
        settings: ForwardSettings,
    ) -> Self {
        Self {
            store,
            backend,
            runner,
            settings,
        }
    }

    /// Build a manager running real commands for the detected platform
    pub fn from_config(
        config: &NetmgrConfig,
        options: ExecOptions,
        detector: &dyn PlatformDetector,
    ) -> NetmgrResult<Self> {
        let backend = platform::select_backend(detector)?;
        Ok(Self::new(
            ConfigStore::new(config.paths.config_dir.clone()).with_lock_dir(config.paths.state_dir.clone()),
            backend,
            Arc::new(SystemRunner::new(options)),
            config.forward.clone(),
        ))
    }

    pub fn backend(&self) -> &dyn PlatformBackend {
        self.backend.as_ref()
    }

    fn state_key(&self) -> &str {
        &self.settings.state_file
    }

    fn lock(&self) -> NetmgrResult<Option<StoreLock>> {
        if !self.settings.lock_state || self.runner.dry_run() {
            return Ok(None);
        }
        self.store.lock(self.state_key()).map(Some)
    }

    /// All recorded forwards; never writes
    pub fn list(&self) -> NetmgrResult<ForwardCollection> {
        self.store.load(self.state_key())
    }

    /// A single recorded forward
    pub fn get(&self, name: &str) -> NetmgrResult<ForwardRule> {
        self.list()?
            .remove(name)
            .ok_or_else(|| NetmgrError::NotFound(name.to_string()))
    }

    /// Add and apply a forward
    pub async fn add(
        &self,
        name: &str,
        src_port: &str,
        dest_ip: &str,
        dest_port: &str,
        protocol: Protocol,
    ) -> NetmgrResult<ForwardRule> {
        validation::validate_forward_name(name)?;
        validation::validate_port(src_port)?;
        validation::validate_hostname(dest_ip)?;
        validation::validate_port(dest_port)?;

        if let Ok(IpAddr::V6(_)) = validation::validate_ip_address(dest_ip) {
            if !self.backend.supports_ipv6() {
                return Err(NetmgrError::InvalidParameter(format!(
                    "The {} backend only forwards to IPv4 destinations, got {}",
                    self.backend.name(),
                    dest_ip
                )));
            }
        }

        let _guard = self.lock()?;
        let mut forwards = self.list()?;

        if forwards.contains_key(name) {
            return Err(NetmgrError::DuplicateName(name.to_string()));
        }

        info!(
            "Adding port forward: {} ({} {} -> {}:{})",
            name, protocol, src_port, dest_ip, dest_port
        );

        if let Err(e) = self.backend.enable_ip_forwarding(self.runner.as_ref()).await {
            warn!("Failed to enable IP forwarding: {}", e);
        }

        let mut rule = ForwardRule::new(name, src_port, dest_ip, dest_port, protocol);
        debug!("Applying {} with the {} backend", name, self.backend.name());

        let outcome = self
            .backend
            .apply(self.runner.as_ref(), &rule, self.settings.rollback_on_failure)
            .await;

        if let Some(step) = outcome.failed {
            return Err(NetmgrError::BackendStepFailed {
                rule: name.to_string(),
                step,
            });
        }

        rule.active = true;

        if self.runner.dry_run() {
            info!(
                "[DRY-RUN] Would record port forward '{}' in {}",
                name,
                self.store.path(self.state_key()).display()
            );
            return Ok(rule);
        }

        forwards.insert(name.to_string(), rule.clone());
        self.store.save(self.state_key(), &forwards)?;

        info!("Port forward {} is active", name);
        Ok(rule)
    }

    /// Tear a forward down and forget it
    ///
    /// Teardown failures are logged; the record is dropped regardless. The
    /// name is not validated: only recorded names are acted on, and records
    /// from older versions may use any name.
    pub async fn remove(&self, name: &str) -> NetmgrResult<RemovalReport> {
        let _guard = self.lock()?;
        let mut forwards = self.list()?;

        let rule = forwards
            .remove(name)
            .ok_or_else(|| NetmgrError::NotFound(name.to_string()))?;

        info!("Removing port forward: {}", name);

        let report = self.backend.remove(self.runner.as_ref(), &rule).await;
        if !report.is_clean() {
            warn!(
                "Port forward {} was not fully torn down ({} of {} steps failed: {}); dropping the record anyway",
                name,
                report.failures.len(),
                report.attempted,
                report.failures.join(", ")
            );
        }

        if self.runner.dry_run() {
            info!(
                "[DRY-RUN] Would drop port forward '{}' from {}",
                name,
                self.store.path(self.state_key()).display()
            );
            return Ok(report);
        }

        self.store.save(self.state_key(), &forwards)?;

        info!("Port forward {} removed", name);
        Ok(report)
    }
}

/// Render forwards as the `forward show` table
pub fn render_table(forwards: &ForwardCollection) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "{:<15} {:<10} {:<25} {:<10} {:<20}",
                     "NAME", "PROTOCOL", "FORWARD", "STATUS", "CREATED");
    let _ = writeln!(out, "{:<15} {:<10} {:<25} {:<10} {:<20}",
                     "----", "--------", "-------", "------", "-------");

    for (name, forward) in forwards {
        let created = forward.created.format("%Y-%m-%d %H:%M:%S").to_string();
        let _ = writeln!(out, "{:<15} {:<10} {:<25} {:<10} {:<20}",
                         name, forward.protocol, forward.target(), forward.status(), created);
    }

    out
}
