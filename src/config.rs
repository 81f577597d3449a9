//! Configuration management for netmgr

use serde::Deserialize;
use std::path::{Path, PathBuf};
use crate::error::{NetmgrError, NetmgrResult};

/// Default location of the tool configuration file
#[cfg(windows)]
pub const DEFAULT_CONFIG_FILE: &str = "C:\\ProgramData\\NetMgr\\netmgr.toml";
#[cfg(not(windows))]
pub const DEFAULT_CONFIG_FILE: &str = "/etc/netmgr/netmgr.toml";

/// Name of the log file inside `log_dir`
pub const LOG_FILE_NAME: &str = "netmgr.log";

/// Main netmgr configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetmgrConfig {
    /// Configuration file paths
    #[serde(default)]
    pub paths: ConfigPaths,
    /// Port forwarding settings
    #[serde(default)]
    pub forward: ForwardSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigPaths {
    /// Base configuration directory (holds the JSON state documents)
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,
    /// Runtime state directory (lock files)
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    /// Log directory; every run appends to `netmgr.log` here
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForwardSettings {
    /// State document for port forwards, relative to `config_dir`
    #[serde(default = "default_state_file")]
    pub state_file: String,
    /// Undo already-applied steps when a later step fails
    #[serde(default = "default_true")]
    pub rollback_on_failure: bool,
    /// Hold an advisory lock across read-modify-write of the state file
    #[serde(default = "default_true")]
    pub lock_state: bool,
}

#[cfg(windows)]
fn program_data_dir() -> PathBuf {
    let program_data = std::env::var("PROGRAMDATA")
        .unwrap_or_else(|_| "C:\\ProgramData".to_string());
    PathBuf::from(program_data).join("NetMgr")
}

#[cfg(windows)]
fn default_config_dir() -> PathBuf {
    program_data_dir()
}

#[cfg(not(windows))]
fn default_config_dir() -> PathBuf {
    PathBuf::from("/etc/netmgr")
}

#[cfg(windows)]
fn default_state_dir() -> PathBuf {
    program_data_dir().join("state")
}

#[cfg(not(windows))]
fn default_state_dir() -> PathBuf {
    PathBuf::from("/var/lib/netmgr")
}

#[cfg(windows)]
fn default_log_dir() -> PathBuf {
    program_data_dir().join("logs")
}

#[cfg(not(windows))]
fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log")
}

fn default_state_file() -> String {
    "forwarding.json".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self {
            config_dir: default_config_dir(),
            state_dir: default_state_dir(),
            log_dir: default_log_dir(),
        }
    }
}

impl Default for ForwardSettings {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
            rollback_on_failure: true,
            lock_state: true,
        }
    }
}

impl ConfigPaths {
    /// File the log lines of every run are appended to
    pub fn log_file(&self) -> PathBuf {
        self.log_dir.join(LOG_FILE_NAME)
    }
}

impl NetmgrConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> NetmgrResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| NetmgrError::ConfigError(format!("Failed to read config: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| NetmgrError::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from file, falling back to defaults when the file is absent
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> NetmgrResult<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Point every directory at `dir`, keeping the layout used by the defaults
    pub fn with_config_dir(mut self, dir: PathBuf) -> Self {
        self.paths.state_dir = dir.join("state");
        self.paths.log_dir = dir.join("logs");
        self.paths.config_dir = dir;
        self
    }

    /// Ensure all directories exist
    pub fn ensure_directories(&self) -> NetmgrResult<()> {
        for dir in [&self.paths.config_dir, &self.paths.state_dir, &self.paths.log_dir] {
            std::fs::create_dir_all(dir)
                .map_err(|e| NetmgrError::ConfigError(format!("Failed to create directory {:?}: {}", dir, e)))?;
        }
        Ok(())
    }
}
