//! Port forwarding
//!
//! Forwards are recorded in `forwarding.json` and realized by a
//! platform backend:
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │   ForwardManager (add/remove/list)  │──── ConfigStore (forwarding.json)
//! └──────────────┬──────────────────────┘
//!                │ Plan (ordered steps + compensations)
//!    ┌───────────┼───────────┐
//!    ▼           ▼           ▼
//! ┌───────┐  ┌───────┐  ┌───────┐
//! │ Linux │  │Windows│  │ macOS │   <- PlatformBackend
//! └───────┘  └───────┘  └───────┘
//!                │
//!                ▼
//!          CommandRunner (iptables / netsh / pfctl)
//! ```
//!
//! A rule is persisted only after every required step of its apply plan
//! succeeded, so the state file never holds a half-applied forward.

pub mod backend;
pub mod linux;
pub mod macos;
pub mod manager;
pub mod plan;
pub mod platform;
pub mod windows;

pub use backend::PlatformBackend;
pub use manager::{render_table, ForwardManager};
pub use plan::{Action, ApplyOutcome, CommandSpec, Plan, RemovalReport, Step};
pub use platform::{FixedPlatform, HostDetector, Platform, PlatformDetector};

use crate::error::NetmgrError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Transport protocol of a forward
///
/// Written lowercase; read in any case, since older state files stored
/// whatever the user typed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = NetmgrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            _ => Err(NetmgrError::InvalidParameter(format!(
                "Unsupported protocol '{}' (expected tcp or udp)",
                s
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for Protocol {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One persisted forwarding intent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardRule {
    /// Unique, user-chosen identifier
    pub name: String,
    /// Local port, numeric or service name
    pub src_port: String,
    /// Destination IP address or hostname
    pub dest_ip: String,
    /// Destination port
    pub dest_port: String,
    #[serde(default)]
    pub protocol: Protocol,
    pub created: DateTime<Utc>,
    /// True once the backend applied every step
    #[serde(default)]
    pub active: bool,
}

impl ForwardRule {
    /// A requested forward that has not been applied yet
    pub fn new(
        name: &str,
        src_port: &str,
        dest_ip: &str,
        dest_port: &str,
        protocol: Protocol,
    ) -> Self {
        Self {
            name: name.to_string(),
            src_port: src_port.to_string(),
            dest_ip: dest_ip.to_string(),
            dest_port: dest_port.to_string(),
            protocol,
            created: Utc::now(),
            active: false,
        }
    }

    /// `src->dest:port` as shown by `forward show`
    pub fn target(&self) -> String {
        format!("{}->{}:{}", self.src_port, self.dest_ip, self.dest_port)
    }

    pub fn status(&self) -> &'static str {
        if self.active {
            "ACTIVE"
        } else {
            "INACTIVE"
        }
    }
}

/// All recorded forwards keyed by name
pub type ForwardCollection = BTreeMap<String, ForwardRule>;
