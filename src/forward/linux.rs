//! Linux backend: iptables DNAT + FORWARD + MASQUERADE
//!
//! Every rule carries an iptables comment `NETMGR:<name>` so teardown can
//! find all of them again without remembering the exact rule text.

use super::backend::PlatformBackend;
use super::plan::{Action, CommandSpec, Plan, Step};
use super::ForwardRule;

/// Comment prefix tagging every rule netmgr installs
pub const RULE_TAG: &str = "NETMGR";

const REQUIRED_TOOLS: &[&str] = &["ip", "iptables", "tc"];

pub struct LinuxBackend;

impl LinuxBackend {
    pub fn new() -> Self {
        Self
    }

    fn comment(rule: &ForwardRule) -> String {
        format!("{}:{}", RULE_TAG, rule.name)
    }

    fn dnat(op: &str, rule: &ForwardRule) -> CommandSpec {
        CommandSpec::new("iptables", [
            "-t".to_string(), "nat".to_string(), op.to_string(), "PREROUTING".to_string(),
            "-p".to_string(), rule.protocol.to_string(),
            "--dport".to_string(), rule.src_port.clone(),
            "-j".to_string(), "DNAT".to_string(),
            "--to-destination".to_string(), format!("{}:{}", rule.dest_ip, rule.dest_port),
            "-m".to_string(), "comment".to_string(),
            "--comment".to_string(), Self::comment(rule),
        ])
    }

    fn forward_accept(op: &str, rule: &ForwardRule) -> CommandSpec {
        CommandSpec::new("iptables", [
            op.to_string(), "FORWARD".to_string(),
            "-p".to_string(), rule.protocol.to_string(),
            "-d".to_string(), rule.dest_ip.clone(),
            "--dport".to_string(), rule.dest_port.clone(),
            "-j".to_string(), "ACCEPT".to_string(),
            "-m".to_string(), "comment".to_string(),
            "--comment".to_string(), Self::comment(rule),
        ])
    }

    fn masquerade(op: &str, rule: &ForwardRule) -> CommandSpec {
        CommandSpec::new("iptables", [
            "-t".to_string(), "nat".to_string(), op.to_string(), "POSTROUTING".to_string(),
            "-p".to_string(), rule.protocol.to_string(),
            "-d".to_string(), rule.dest_ip.clone(),
            "--dport".to_string(), rule.dest_port.clone(),
            "-j".to_string(), "MASQUERADE".to_string(),
            "-m".to_string(), "comment".to_string(),
            "--comment".to_string(), Self::comment(rule),
        ])
    }

    /// Pipeline rewriting the whole rule set without lines tagged for `rule`
    ///
    /// The pattern is anchored on what follows the comment so that removing
    /// `web` leaves `web2` alone. Records written by older versions may carry
    /// any name, so the name is escaped for both grep and the shell.
    fn strip_tagged(rule: &ForwardRule) -> CommandSpec {
        let pattern = format!("{}([\" ]|$)", ere_escape(&Self::comment(rule)));
        CommandSpec::new("sh", [
            "-c".to_string(),
            format!("iptables-save | grep -v -E {} | iptables-restore", shell_quote(&pattern)),
        ])
    }
}

/// Escape the metacharacters of a POSIX extended regular expression
fn ere_escape(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if "\\.^$|?*+()[]{}".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Single-quote `s` for `sh -c`
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

impl Default for LinuxBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformBackend for LinuxBackend {
    fn name(&self) -> &'static str {
        "linux"
    }

    fn required_tools(&self) -> &'static [&'static str] {
        REQUIRED_TOOLS
    }

    fn ip_forwarding_plan(&self) -> Plan {
        Plan::new().step(Step::run(
            "enable IP forwarding",
            CommandSpec::new("sysctl", ["-w", "net.ipv4.ip_forward=1"]),
        ))
    }

    fn apply_plan(&self, rule: &ForwardRule) -> Plan {
        Plan::new()
            .step(Step::run("add DNAT rule", Self::dnat("-A", rule))
                .with_compensation(Action::Run(Self::dnat("-D", rule))))
            .step(Step::run("add FORWARD rule", Self::forward_accept("-A", rule))
                .with_compensation(Action::Run(Self::forward_accept("-D", rule))))
            .step(Step::run("add MASQUERADE rule", Self::masquerade("-A", rule))
                .with_compensation(Action::Run(Self::masquerade("-D", rule))))
    }

    fn remove_plan(&self, rule: &ForwardRule) -> Plan {
        Plan::new().step(Step::run("remove port forward rules", Self::strip_tagged(rule)))
    }
}

pub fn create_backend() -> Box<dyn PlatformBackend> {
    Box::new(LinuxBackend::new())
}
