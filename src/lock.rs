//! Hardware access lock.
//!
//! The registers of the radio are not protected against concurrent access by
//! different processes. This module implements an advisory lock with
//! `flock(2)` on a lock file that is held while the registers are being
//! configured.

use anyhow::{Context, Result};
use nix::fcntl::{Flock, FlockArg};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Default path of the lock file.
pub const DEFAULT_LOCK_FILE: &str = "/run/lock/radio-tuner.lock";

/// Hardware lock.
///
/// This represents the location of the lock file, or no locking at all.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct HardwareLock {
    path: Option<PathBuf>,
}

/// Held hardware lock.
///
/// The lock is released when this is dropped.
#[derive(Debug)]
pub struct HardwareLockGuard {
    _flock: Option<Flock<File>>,
}

impl HardwareLock {
    /// Creates a lock that uses the lock file at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> HardwareLock {
        HardwareLock {
            path: Some(path.as_ref().to_path_buf()),
        }
    }

    /// Creates a lock that does nothing.
    pub fn disabled() -> HardwareLock {
        HardwareLock { path: None }
    }

    /// Returns the path of the lock file, if locking is enabled.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Acquires the lock.
    ///
    /// This blocks until no other process holds the lock. The lock file is
    /// created if it does not exist.
    pub fn acquire(&self) -> Result<HardwareLockGuard> {
        let Some(path) = &self.path else {
            return Ok(HardwareLockGuard { _flock: None });
        };
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("failed to open lock file {}", path.display()))?;
        let flock = Flock::lock(file, FlockArg::LockExclusive)
            .map_err(|(_, errno)| errno)
            .with_context(|| format!("failed to lock {}", path.display()))?;
        tracing::debug!("acquired hardware lock {}", path.display());
        Ok(HardwareLockGuard {
            _flock: Some(flock),
        })
    }
}

impl Default for HardwareLock {
    fn default() -> HardwareLock {
        HardwareLock::new(DEFAULT_LOCK_FILE)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn lock_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("radio-tuner-{}-{}.lock", name, std::process::id()))
    }

    #[test]
    fn exclusive() {
        let path = lock_path("exclusive");
        let lock = HardwareLock::new(&path);
        let guard = lock.acquire().unwrap();
        // flock locks belong to the open file description, so a second open
        // conflicts even within the same process
        let other = File::open(&path).unwrap();
        assert!(Flock::lock(other, FlockArg::LockExclusiveNonblock).is_err());
        drop(guard);
        let other = File::open(&path).unwrap();
        assert!(Flock::lock(other, FlockArg::LockExclusiveNonblock).is_ok());
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn disabled() {
        let lock = HardwareLock::disabled();
        assert!(lock.path().is_none());
        let _a = lock.acquire().unwrap();
        let _b = lock.acquire().unwrap();
    }

    #[test]
    fn unreachable_lock_file() {
        let lock = HardwareLock::new("/nonexistent/radio-tuner/radio-tuner.lock");
        let err = lock.acquire().unwrap_err();
        assert!(format!("{err:#}").starts_with("failed to open lock file"));
    }
}
