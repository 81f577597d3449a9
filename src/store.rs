//! JSON state documents in the configuration directory
//!
//! Each rule category lives in its own document (`forwarding.json`,
//! `firewall.json`, ...). Documents are read and rewritten whole.

use crate::error::{NetmgrError, NetmgrResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{File, OpenOptions, Permissions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Documents created empty by [`ConfigStore::bootstrap`]
pub const DEFAULT_DOCUMENTS: &[&str] = &[
    "interfaces.json",
    "forwarding.json",
    "firewall.json",
    "routing.json",
    "dns.json",
    "tunnels.json",
];

/// Reads and writes JSON documents under one directory
#[derive(Debug, Clone)]
pub struct ConfigStore {
    dir: PathBuf,
    /// Where `<key>.lock` files are created; defaults to `dir`
    lock_dir: PathBuf,
}

impl ConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            lock_dir: dir.clone(),
            dir,
        }
    }

    /// Keep lock files in `lock_dir` (the runtime state directory)
    pub fn with_lock_dir(mut self, lock_dir: impl Into<PathBuf>) -> Self {
        self.lock_dir = lock_dir.into();
        self
    }

    /// Path of the document stored under `key`
    pub fn path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    /// Create the directory and seed every default document with `{}`
    pub fn bootstrap(&self) -> NetmgrResult<()> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| NetmgrError::ConfigError(format!("Failed to create directory {:?}: {}", self.dir, e)))?;

        for key in DEFAULT_DOCUMENTS {
            let path = self.path(key);
            if !path.exists() {
                std::fs::write(&path, "{}").map_err(|e| NetmgrError::ConfigWriteFailed {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
                debug!("Created {}", path.display());
            }
        }

        Ok(())
    }

    /// Load the document stored under `key`
    ///
    /// A missing or empty file yields `T::default()`. Anything that does not
    /// parse is reported as [`NetmgrError::ConfigCorrupt`].
    pub fn load<T: DeserializeOwned + Default>(&self, key: &str) -> NetmgrResult<T> {
        let path = self.path(key);

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("{} does not exist, starting empty", path.display());
                return Ok(T::default());
            }
            Err(e) => return Err(NetmgrError::Io(e)),
        };

        if content.trim().is_empty() {
            return Ok(T::default());
        }

        serde_json::from_str(&content).map_err(|e| NetmgrError::ConfigCorrupt {
            path,
            reason: e.to_string(),
        })
    }

    /// Replace the document stored under `key`
    ///
    /// The new content is written to a temporary file in the same directory
    /// and renamed over the old one, so readers see either version in full.
    pub fn save<T: Serialize>(&self, key: &str, data: &T) -> NetmgrResult<()> {
        let path = self.path(key);
        let write_failed = |reason: String| NetmgrError::ConfigWriteFailed {
            path: path.clone(),
            reason,
        };

        let json = serde_json::to_string_pretty(data).map_err(|e| write_failed(e.to_string()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).map_err(|e| write_failed(e.to_string()))?;
        tmp.write_all(json.as_bytes()).map_err(|e| write_failed(e.to_string()))?;
        tmp.write_all(b"\n").map_err(|e| write_failed(e.to_string()))?;
        // The temporary file is created 0600; readers of the old document keep access
        if let Some(permissions) = document_permissions(&path) {
            tmp.as_file()
                .set_permissions(permissions)
                .map_err(|e| write_failed(e.to_string()))?;
        }
        tmp.as_file().sync_all().map_err(|e| write_failed(e.to_string()))?;
        tmp.persist(&path).map_err(|e| write_failed(e.error.to_string()))?;

        info!("Saved {}", path.display());
        Ok(())
    }

    /// Take an exclusive advisory lock guarding read-modify-write of `key`
    ///
    /// Blocks until any other netmgr process holding the lock finishes.
    pub fn lock(&self, key: &str) -> NetmgrResult<StoreLock> {
        std::fs::create_dir_all(&self.lock_dir).map_err(|e| NetmgrError::ConfigWriteFailed {
            path: self.lock_dir.clone(),
            reason: e.to_string(),
        })?;

        let path = self.lock_dir.join(format!("{}.lock", key));
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| NetmgrError::ConfigWriteFailed {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        lock_exclusive(&file).map_err(|e| NetmgrError::ConfigWriteFailed {
            path: path.clone(),
            reason: format!("failed to lock: {}", e),
        })?;

        debug!("Locked {}", path.display());
        Ok(StoreLock { file, path })
    }
}

/// Permissions a rewritten document gets: those of the file it replaces,
/// or world-readable for a new one
fn document_permissions(path: &Path) -> Option<Permissions> {
    match std::fs::metadata(path) {
        Ok(meta) => Some(meta.permissions()),
        Err(_) => new_document_permissions(),
    }
}

#[cfg(unix)]
fn new_document_permissions() -> Option<Permissions> {
    use std::os::unix::fs::PermissionsExt;

    Some(Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn new_document_permissions() -> Option<Permissions> {
    None
}

/// Held for the duration of one mutation; released on drop
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        unlock(&self.file);
        debug!("Unlocked {}", self.path.display());
    }
}

#[cfg(unix)]
fn lock_exclusive(file: &File) -> std::io::Result<()> {
    use std::os::unix::io::AsRawFd;

    loop {
        let ret = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
        if ret == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.kind() != ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

#[cfg(unix)]
fn unlock(file: &File) {
    use std::os::unix::io::AsRawFd;

    unsafe {
        libc::flock(file.as_raw_fd(), libc::LOCK_UN);
    }
}

/// No advisory locking outside unix; concurrent invocations are not serialized
#[cfg(not(unix))]
fn lock_exclusive(_file: &File) -> std::io::Result<()> {
    Ok(())
}

#[cfg(not(unix))]
fn unlock(_file: &File) {}
