//! Ordered backend step plans and their execution

use crate::error::{NetmgrError, NetmgrResult};
use crate::executor::{format_command, CommandRunner};
use std::fmt;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// One external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_command(&self.program, &self.args))
    }
}

/// What a step does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Run(CommandSpec),
    WriteFile { path: PathBuf, contents: String },
    RemoveFile(PathBuf),
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Run(cmd) => write!(f, "{}", cmd),
            Action::WriteFile { path, .. } => write!(f, "write {}", path.display()),
            Action::RemoveFile(path) => write!(f, "remove {}", path.display()),
        }
    }
}

/// A step of a backend plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub description: String,
    pub action: Action,
    /// Undoes `action` once it has succeeded
    pub compensation: Option<Action>,
    /// A failed optional step is logged and the plan continues
    pub required: bool,
}

impl Step {
    pub fn new(description: impl Into<String>, action: Action) -> Self {
        Self {
            description: description.into(),
            action,
            compensation: None,
            required: true,
        }
    }

    pub fn run(description: impl Into<String>, command: CommandSpec) -> Self {
        Self::new(description, Action::Run(command))
    }

    pub fn with_compensation(mut self, compensation: Action) -> Self {
        self.compensation = Some(compensation);
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// Steps in order, plus cleanup actions that run however the steps went
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub steps: Vec<Step>,
    pub cleanup: Vec<Action>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn cleanup(mut self, action: Action) -> Self {
        self.cleanup.push(action);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty() && self.cleanup.is_empty()
    }

    /// Every command the plan would run, in order, ignoring failures
    pub fn commands(&self) -> Vec<&CommandSpec> {
        self.steps
            .iter()
            .map(|s| &s.action)
            .chain(self.cleanup.iter())
            .filter_map(|a| match a {
                Action::Run(cmd) => Some(cmd),
                _ => None,
            })
            .collect()
    }
}

/// Result of running an apply plan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Descriptions of steps that succeeded
    pub completed: Vec<String>,
    /// The required step that failed, if any
    pub failed: Option<String>,
    /// Compensations that ran successfully after the failure
    pub compensated: usize,
}

impl ApplyOutcome {
    pub fn succeeded(&self) -> bool {
        self.failed.is_none()
    }
}

/// Result of a best-effort teardown
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalReport {
    pub attempted: usize,
    pub failures: Vec<String>,
}

impl RemovalReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Perform a single action through `runner`
pub async fn perform(runner: &dyn CommandRunner, action: &Action) -> NetmgrResult<()> {
    match action {
        Action::Run(cmd) => runner.run(&cmd.program, &cmd.args).await.map(|_| ()),
        Action::WriteFile { path, contents } => {
            if runner.dry_run() {
                info!("[DRY-RUN] Would write {}:\n{}", path.display(), contents.trim_end());
                return Ok(());
            }
            debug!("Writing {}", path.display());
            tokio::fs::write(path, contents).await.map_err(NetmgrError::from)
        }
        Action::RemoveFile(path) => {
            if runner.dry_run() {
                info!("[DRY-RUN] Would remove {}", path.display());
                return Ok(());
            }
            match tokio::fs::remove_file(path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            }
        }
    }
}

/// Run `plan` until a required step fails
///
/// With `rollback` set, the compensations of the steps that already
/// succeeded run in reverse order after a failure. Cleanup actions always run.
pub async fn execute(runner: &dyn CommandRunner, plan: &Plan, rollback: bool) -> ApplyOutcome {
    let mut outcome = ApplyOutcome::default();
    let mut undo: Vec<(&str, &Action)> = Vec::new();

    for step in &plan.steps {
        match perform(runner, &step.action).await {
            Ok(()) => {
                debug!("Step done: {}", step.description);
                outcome.completed.push(step.description.clone());
                if let Some(compensation) = &step.compensation {
                    undo.push((step.description.as_str(), compensation));
                }
            }
            Err(e) if !step.required => {
                warn!("Failed to {} (continuing): {}", step.description, e);
            }
            Err(e) => {
                error!("Failed to {}: {}", step.description, e);
                outcome.failed = Some(step.description.clone());
                break;
            }
        }
    }

    if outcome.failed.is_some() && !undo.is_empty() {
        if rollback {
            for (description, compensation) in undo.iter().rev() {
                info!("Rolling back: {}", description);
                match perform(runner, compensation).await {
                    Ok(()) => outcome.compensated += 1,
                    Err(e) => warn!("Failed to roll back '{}': {}", description, e),
                }
            }
        } else {
            warn!(
                "Leaving {} applied step(s) in place; clean up manually: {}",
                undo.len(),
                undo.iter().map(|(d, _)| *d).collect::<Vec<_>>().join(", ")
            );
        }
    }

    run_cleanup(runner, plan).await;
    outcome
}

/// Attempt every step of `plan`, recording failures instead of stopping
pub async fn execute_all(runner: &dyn CommandRunner, plan: &Plan) -> RemovalReport {
    let mut report = RemovalReport::default();

    for step in &plan.steps {
        report.attempted += 1;
        if let Err(e) = perform(runner, &step.action).await {
            error!("Failed to {}: {}", step.description, e);
            report.failures.push(step.description.clone());
        }
    }

    run_cleanup(runner, plan).await;
    report
}

async fn run_cleanup(runner: &dyn CommandRunner, plan: &Plan) {
    for action in &plan.cleanup {
        if let Err(e) = perform(runner, action).await {
            warn!("Cleanup '{}' failed: {}", action, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::MockCommandRunner;
    use std::sync::{Arc, Mutex};

    fn cmd(program: &str, args: &[&str]) -> CommandSpec {
        CommandSpec::new(program, args.iter().copied())
    }

    /// Mock that records every command and fails those whose line contains `fail_on`
    fn recording_runner(fail_on: Option<&'static str>) -> (MockCommandRunner, Arc<Mutex<Vec<String>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let seen = calls.clone();
        let mut runner = MockCommandRunner::new();
        runner.expect_dry_run().return_const(false);
        runner.expect_run().returning(move |program, args| {
            let line = format_command(program, args);
            seen.lock().unwrap().push(line.clone());
            match fail_on {
                Some(pattern) if line.contains(pattern) => Err(NetmgrError::CommandFailed {
                    cmd: line,
                    code: Some(1),
                    stderr: "simulated failure".to_string(),
                }),
                _ => Ok(String::new()),
            }
        });
        (runner, calls)
    }

    fn three_step_plan() -> Plan {
        Plan::new()
            .step(Step::run("add first", cmd("tool", &["add", "first"]))
                .with_compensation(Action::Run(cmd("tool", &["del", "first"]))))
            .step(Step::run("add second", cmd("tool", &["add", "second"]))
                .with_compensation(Action::Run(cmd("tool", &["del", "second"]))))
            .step(Step::run("add third", cmd("tool", &["add", "third"]))
                .with_compensation(Action::Run(cmd("tool", &["del", "third"]))))
    }

    #[tokio::test]
    async fn test_all_steps_succeed() {
        let (runner, calls) = recording_runner(None);
        let outcome = execute(&runner, &three_step_plan(), true).await;

        assert!(outcome.succeeded());
        assert_eq!(outcome.completed.len(), 3);
        assert_eq!(calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_failure_rolls_back_in_reverse_order() {
        let (runner, calls) = recording_runner(Some("add third"));
        let outcome = execute(&runner, &three_step_plan(), true).await;

        assert_eq!(outcome.failed.as_deref(), Some("add third"));
        assert_eq!(outcome.compensated, 2);
        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                "tool add first",
                "tool add second",
                "tool add third",
                "tool del second",
                "tool del first",
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_without_rollback_stops() {
        let (runner, calls) = recording_runner(Some("add second"));
        let outcome = execute(&runner, &three_step_plan(), false).await;

        assert_eq!(outcome.failed.as_deref(), Some("add second"));
        assert_eq!(outcome.compensated, 0);
        assert_eq!(*calls.lock().unwrap(), vec!["tool add first", "tool add second"]);
    }

    #[tokio::test]
    async fn test_optional_step_failure_continues() {
        let plan = Plan::new()
            .step(Step::run("enable", cmd("tool", &["enable"])).optional())
            .step(Step::run("add", cmd("tool", &["add"])));
        let (runner, calls) = recording_runner(Some("enable"));
        let outcome = execute(&runner, &plan, true).await;

        assert!(outcome.succeeded());
        assert_eq!(outcome.completed, vec!["add"]);
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_execute_all_attempts_every_step() {
        let plan = Plan::new()
            .step(Step::run("delete proxy", cmd("tool", &["delete", "proxy"])))
            .step(Step::run("delete rule", cmd("tool", &["delete", "rule"])));
        let (runner, calls) = recording_runner(Some("proxy"));
        let report = execute_all(&runner, &plan).await;

        assert_eq!(report.attempted, 2);
        assert_eq!(report.failures, vec!["delete proxy"]);
        assert!(!report.is_clean());
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_file_actions_are_skipped_in_dry_run() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("rule.conf");
        let mut runner = MockCommandRunner::new();
        runner.expect_dry_run().return_const(true);
        runner.expect_run().never();

        let write = Action::WriteFile { path: path.clone(), contents: "rule\n".to_string() };
        perform(&runner, &write).await.unwrap();
        assert!(!path.exists());

        std::fs::write(&path, "keep").unwrap();
        perform(&runner, &Action::RemoveFile(path.clone())).await.unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_plan_commands_include_cleanup() {
        let plan = Plan::new()
            .step(Step::run("load", cmd("pfctl", &["-f", "x"])))
            .cleanup(Action::Run(cmd("rm", &["x"])));
        let lines: Vec<String> = plan.commands().iter().map(|c| c.to_string()).collect();
        assert_eq!(lines, vec!["pfctl -f x", "rm x"]);
        assert!(!plan.is_empty());
        assert!(Plan::new().is_empty());
    }
}
