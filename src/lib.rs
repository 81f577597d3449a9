//! netmgr - Network Management Library
//!
//! Persistent port forwarding over the host's native tooling:
//! - Execution gateway for external commands (with dry-run)
//! - JSON config store with atomic replace and advisory locking
//! - Platform backends (iptables on Linux, netsh portproxy on Windows,
//!   pf anchors on macOS)
//! - Forward orchestrator (add, remove, list)

pub mod config;
pub mod error;
pub mod executor;
pub mod forward;
pub mod store;
pub mod validation;

// Re-export commonly used types
pub use config::{ConfigPaths, ForwardSettings, NetmgrConfig, DEFAULT_CONFIG_FILE};
pub use error::{NetmgrError, NetmgrResult};
pub use executor::{check_dependencies, is_privileged, CommandRunner, ExecOptions, SystemRunner};
pub use forward::{
    render_table, ForwardCollection, ForwardManager, ForwardRule, Platform, PlatformBackend,
    PlatformDetector, Protocol,
};
pub use store::{ConfigStore, StoreLock};
