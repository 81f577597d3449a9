//! Error types for netmgr

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetmgrError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Command execution failed
    #[error("Command '{cmd}' failed{suffix}: {stderr}", suffix = exit_code_suffix(.code))]
    CommandFailed { cmd: String, code: Option<i32>, stderr: String },

    /// A port forward with this name is already recorded
    #[error("Port forward with name '{0}' already exists")]
    DuplicateName(String),

    /// No port forward with this name is recorded
    #[error("Port forward with name '{0}' does not exist")]
    NotFound(String),

    /// One of the ordered backend commands failed while applying a forward
    #[error("Failed to apply port forward '{rule}': step '{step}' failed")]
    BackendStepFailed { rule: String, step: String },

    /// Existing state file is not valid JSON
    #[error("Corrupt state file {path:?}: {reason}")]
    ConfigCorrupt { path: PathBuf, reason: String },

    /// State could not be persisted
    #[error("Failed to write state file {path:?}: {reason}")]
    ConfigWriteFailed { path: PathBuf, reason: String },

    /// Required external tool is not installed
    #[error("Required tool not found: {0}")]
    ToolMissing(String),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Not supported
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type NetmgrResult<T> = Result<T, NetmgrError>;

fn exit_code_suffix(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!(" with code {}", code),
        None => String::new(),
    }
}
