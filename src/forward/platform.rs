//! Platform detection and backend selection

use super::backend::PlatformBackend;
use super::{linux, macos, windows};
use crate::error::{NetmgrError, NetmgrResult};
use std::fmt;
use tracing::debug;

/// Operating systems with a port forwarding backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    Windows,
    MacOs,
}

impl Platform {
    /// The platform this binary was built for
    pub fn current() -> Option<Self> {
        if cfg!(target_os = "linux") {
            Some(Platform::Linux)
        } else if cfg!(target_os = "windows") {
            Some(Platform::Windows)
        } else if cfg!(target_os = "macos") {
            Some(Platform::MacOs)
        } else {
            None
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::Windows => "windows",
            Platform::MacOs => "macos",
        }
    }

    pub fn backend(&self) -> Box<dyn PlatformBackend> {
        match self {
            Platform::Linux => linux::create_backend(),
            Platform::Windows => windows::create_backend(),
            Platform::MacOs => macos::create_backend(),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Decides which backend drives the forwards
pub trait PlatformDetector {
    fn detect(&self) -> Option<Platform>;
}

/// Detects the host operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct HostDetector;

impl PlatformDetector for HostDetector {
    fn detect(&self) -> Option<Platform> {
        Platform::current()
    }
}

/// Always reports the same platform
#[derive(Debug, Clone, Copy)]
pub struct FixedPlatform(pub Platform);

impl PlatformDetector for FixedPlatform {
    fn detect(&self) -> Option<Platform> {
        Some(self.0)
    }
}

/// Pick the backend once, at startup
pub fn select_backend(detector: &dyn PlatformDetector) -> NetmgrResult<Box<dyn PlatformBackend>> {
    let platform = detector.detect().ok_or_else(|| {
        NetmgrError::NotSupported(format!(
            "Port forwarding not implemented for this platform ({})",
            std::env::consts::OS
        ))
    })?;

    debug!("Using {} port forwarding backend", platform);
    Ok(platform.backend())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoPlatform;

    impl PlatformDetector for NoPlatform {
        fn detect(&self) -> Option<Platform> {
            None
        }
    }

    #[test]
    fn test_fixed_platform_selects_backend() {
        for platform in [Platform::Linux, Platform::Windows, Platform::MacOs] {
            let backend = select_backend(&FixedPlatform(platform)).unwrap();
            assert_eq!(backend.name(), platform.name());
        }
    }

    #[test]
    fn test_unknown_platform_is_not_supported() {
        assert!(matches!(select_backend(&NoPlatform), Err(NetmgrError::NotSupported(_))));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_host_detector() {
        assert_eq!(HostDetector.detect(), Some(Platform::Linux));
    }
}
