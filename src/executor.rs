//! External command execution
//!
//! Every backend step goes through a [`CommandRunner`]. The system runner
//! honors dry-run (log the invocation, touch nothing) and verbose (log the
//! captured output) and never retries.

use crate::error::{NetmgrError, NetmgrResult};
use crate::validation;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, info};

/// Execution options set once at startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOptions {
    /// Log captured output of successful commands
    pub verbose: bool,
    /// Log commands instead of running them
    pub dry_run: bool,
}

/// Runs one external command and returns its combined stdout/stderr
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`; a non-zero exit is an error
    async fn run(&self, program: &str, args: &[String]) -> NetmgrResult<String>;

    /// Whether side effects are suppressed
    fn dry_run(&self) -> bool;
}

/// Render a command line for logs and error messages
pub fn format_command(program: &str, args: &[String]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

/// Runs commands on the host
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    options: ExecOptions,
}

impl SystemRunner {
    pub fn new(options: ExecOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[String]) -> NetmgrResult<String> {
        let cmd_str = format_command(program, args);
        debug!("Executing: {}", cmd_str);

        if self.options.dry_run {
            info!("[DRY-RUN] Would execute: {}", cmd_str);
            return Ok(String::new());
        }

        let output = match Command::new(program).args(args).output().await {
            Ok(output) => output,
            Err(e) => {
                error!("Command failed: {}", cmd_str);
                error!("Error: {}", e);
                return Err(NetmgrError::CommandFailed {
                    cmd: cmd_str,
                    code: None,
                    stderr: e.to_string(),
                });
            }
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            let captured = validation::sanitize_error_message(&combined);
            error!("Command failed: {}", cmd_str);
            error!("Error: exit status {:?}", output.status.code());
            error!("Output: {}", captured);
            return Err(NetmgrError::CommandFailed {
                cmd: cmd_str,
                code: output.status.code(),
                stderr: captured,
            });
        }

        if self.options.verbose && !combined.trim().is_empty() {
            debug!("Output: {}", combined.trim_end());
        }
        debug!("Command successful");
        Ok(combined)
    }

    fn dry_run(&self) -> bool {
        self.options.dry_run
    }
}

/// Check that every tool a backend shells out to is on PATH
pub fn check_dependencies(tools: &[&str]) -> NetmgrResult<()> {
    for tool in tools {
        if which::which(tool).is_err() {
            return Err(NetmgrError::ToolMissing(tool.to_string()));
        }
        debug!("Found required tool: {}", tool);
    }
    Ok(())
}

/// Whether the process may change host networking
#[cfg(unix)]
pub fn is_privileged() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Whether the process may change host networking
#[cfg(windows)]
pub fn is_privileged() -> bool {
    use std::fs::File;

    // Only administrators can create files in the Windows directory
    let windir = std::env::var("WINDIR").unwrap_or_else(|_| "C:\\Windows".to_string());
    let test_path = std::path::Path::new(&windir).join("temp_netmgr_test");
    match File::create(&test_path) {
        Ok(_) => {
            let _ = std::fs::remove_file(&test_path);
            true
        }
        Err(_) => false,
    }
}

#[cfg(not(any(unix, windows)))]
pub fn is_privileged() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_format_command() {
        assert_eq!(format_command("pfctl", &[]), "pfctl");
        assert_eq!(
            format_command("sysctl", &args(&["-w", "net.ipv4.ip_forward=1"])),
            "sysctl -w net.ipv4.ip_forward=1"
        );
    }

    #[tokio::test]
    async fn test_dry_run_does_not_spawn() {
        let runner = SystemRunner::new(ExecOptions { verbose: false, dry_run: true });
        // A binary that cannot exist; dry-run must not try to spawn it
        let output = runner
            .run("netmgr-definitely-not-a-real-tool", &args(&["--flag"]))
            .await
            .unwrap();
        assert!(output.is_empty());
        assert!(runner.dry_run());
    }

    #[tokio::test]
    async fn test_missing_program_is_command_failed() {
        let runner = SystemRunner::new(ExecOptions::default());
        let err = runner
            .run("netmgr-definitely-not-a-real-tool", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, NetmgrError::CommandFailed { code: None, .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captures_combined_output() {
        let runner = SystemRunner::new(ExecOptions { verbose: true, dry_run: false });
        let output = runner
            .run("sh", &args(&["-c", "echo out; echo err 1>&2"]))
            .await
            .unwrap();
        assert!(output.contains("out"));
        assert!(output.contains("err"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_reports_code_and_output() {
        let runner = SystemRunner::new(ExecOptions::default());
        let err = runner
            .run("sh", &args(&["-c", "echo 'Bad rule' 1>&2; exit 3"]))
            .await
            .unwrap_err();
        match err {
            NetmgrError::CommandFailed { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "Bad rule");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_check_dependencies_reports_missing_tool() {
        let err = check_dependencies(&["netmgr-definitely-not-a-real-tool"]).unwrap_err();
        assert!(matches!(err, NetmgrError::ToolMissing(tool) if tool == "netmgr-definitely-not-a-real-tool"));
        assert!(check_dependencies(&[]).is_ok());
    }
}
