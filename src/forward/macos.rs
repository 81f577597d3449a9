//! macOS backend: one pf anchor per forward

use std::path::PathBuf;

use super::backend::PlatformBackend;
use super::plan::{Action, CommandSpec, Plan, Step};
use super::ForwardRule;

/// Parent anchor; each forward loads into `com.netmgr/<name>`
pub const ANCHOR_ROOT: &str = "com.netmgr";

const REQUIRED_TOOLS: &[&str] = &["networksetup", "scutil", "pfctl"];

pub struct MacOsBackend {
    /// Where the temporary rule files are written
    rule_dir: PathBuf,
}

impl MacOsBackend {
    pub fn new() -> Self {
        Self::with_rule_dir(std::env::temp_dir())
    }

    pub fn with_rule_dir(rule_dir: PathBuf) -> Self {
        Self { rule_dir }
    }

    pub fn anchor(rule: &ForwardRule) -> String {
        format!("{}/{}", ANCHOR_ROOT, rule.name)
    }

    fn rule_file(&self, rule: &ForwardRule) -> PathBuf {
        self.rule_dir.join(format!("netmgr_pf_{}.conf", rule.name))
    }

    fn redirect_rule(rule: &ForwardRule) -> String {
        format!(
            "rdr pass on lo0 proto {} from any to any port {} -> {} port {}\n",
            rule.protocol, rule.src_port, rule.dest_ip, rule.dest_port
        )
    }

    fn flush_anchor(rule: &ForwardRule) -> CommandSpec {
        CommandSpec::new("pfctl", ["-a".to_string(), Self::anchor(rule), "-F".to_string(), "all".to_string()])
    }
}

impl Default for MacOsBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformBackend for MacOsBackend {
    fn name(&self) -> &'static str {
        "macos"
    }

    fn required_tools(&self) -> &'static [&'static str] {
        REQUIRED_TOOLS
    }

    fn supports_ipv6(&self) -> bool {
        true
    }

    fn ip_forwarding_plan(&self) -> Plan {
        Plan::new().step(Step::run(
            "enable IP forwarding",
            CommandSpec::new("sysctl", ["-w", "net.inet.ip.forwarding=1"]),
        ))
    }

    fn apply_plan(&self, rule: &ForwardRule) -> Plan {
        let rule_file = self.rule_file(rule);

        Plan::new()
            .step(Step::new("create pf rule file", Action::WriteFile {
                path: rule_file.clone(),
                contents: Self::redirect_rule(rule),
            }))
            .step(Step::run("load pf rule", CommandSpec::new("pfctl", [
                "-a".to_string(),
                Self::anchor(rule),
                "-f".to_string(),
                rule_file.display().to_string(),
            ])).with_compensation(Action::Run(Self::flush_anchor(rule))))
            // pf may already be enabled, in which case pfctl -e exits non-zero
            .step(Step::run("enable pf", CommandSpec::new("pfctl", ["-e"])).optional())
            .cleanup(Action::RemoveFile(rule_file))
    }

    fn remove_plan(&self, rule: &ForwardRule) -> Plan {
        Plan::new().step(Step::run("remove pf anchor", Self::flush_anchor(rule)))
    }
}

pub fn create_backend() -> Box<dyn PlatformBackend> {
    Box::new(MacOsBackend::new())
}
