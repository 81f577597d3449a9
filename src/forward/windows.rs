//! Windows backend: netsh portproxy + advfirewall

use super::backend::PlatformBackend;
use super::plan::{Action, CommandSpec, Plan, Step};
use super::ForwardRule;

/// Prefix of the firewall rule opened for each forward
pub const FIREWALL_RULE_PREFIX: &str = "NetMgr-Forward-";

const REQUIRED_TOOLS: &[&str] = &["netsh", "powershell"];

pub struct WindowsBackend;

impl WindowsBackend {
    pub fn new() -> Self {
        Self
    }

    fn firewall_rule_name(rule: &ForwardRule) -> String {
        format!("{}{}", FIREWALL_RULE_PREFIX, rule.name)
    }

    fn portproxy_add(rule: &ForwardRule) -> CommandSpec {
        CommandSpec::new("netsh", [
            "interface".to_string(), "portproxy".to_string(), "add".to_string(), "v4tov4".to_string(),
            format!("listenport={}", rule.src_port),
            "listenaddress=0.0.0.0".to_string(),
            format!("connectport={}", rule.dest_port),
            format!("connectaddress={}", rule.dest_ip),
            format!("protocol={}", rule.protocol),
        ])
    }

    fn portproxy_delete(rule: &ForwardRule) -> CommandSpec {
        CommandSpec::new("netsh", [
            "interface".to_string(), "portproxy".to_string(), "delete".to_string(), "v4tov4".to_string(),
            format!("listenport={}", rule.src_port),
            "listenaddress=0.0.0.0".to_string(),
            format!("protocol={}", rule.protocol),
        ])
    }

    fn firewall_add(rule: &ForwardRule) -> CommandSpec {
        CommandSpec::new("netsh", [
            "advfirewall".to_string(), "firewall".to_string(), "add".to_string(), "rule".to_string(),
            format!("name={}", Self::firewall_rule_name(rule)),
            "dir=in".to_string(),
            "action=allow".to_string(),
            format!("protocol={}", rule.protocol),
            format!("localport={}", rule.src_port),
        ])
    }

    fn firewall_delete(rule: &ForwardRule) -> CommandSpec {
        CommandSpec::new("netsh", [
            "advfirewall".to_string(), "firewall".to_string(), "delete".to_string(), "rule".to_string(),
            format!("name={}", Self::firewall_rule_name(rule)),
        ])
    }
}

impl Default for WindowsBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformBackend for WindowsBackend {
    fn name(&self) -> &'static str {
        "windows"
    }

    fn required_tools(&self) -> &'static [&'static str] {
        REQUIRED_TOOLS
    }

    // Forwarding is per interface on Windows and portproxy does not need it
    fn ip_forwarding_plan(&self) -> Plan {
        Plan::new()
    }

    fn apply_plan(&self, rule: &ForwardRule) -> Plan {
        Plan::new()
            .step(Step::run("add port proxy", Self::portproxy_add(rule))
                .with_compensation(Action::Run(Self::portproxy_delete(rule))))
            .step(Step::run("add firewall rule", Self::firewall_add(rule))
                .with_compensation(Action::Run(Self::firewall_delete(rule))))
    }

    fn remove_plan(&self, rule: &ForwardRule) -> Plan {
        Plan::new()
            .step(Step::run("remove port proxy", Self::portproxy_delete(rule)))
            .step(Step::run("remove firewall rule", Self::firewall_delete(rule)))
    }
}

pub fn create_backend() -> Box<dyn PlatformBackend> {
    Box::new(WindowsBackend::new())
}
