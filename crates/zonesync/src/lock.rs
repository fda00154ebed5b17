//! Exclusive run lock
//!
//! Two runs against the same configuration directory would race on the
//! ledgers. The lock is a file created with `create_new`; it is removed when
//! the guard drops. A lock left by a run that no longer exists is taken over.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Name of the lock file inside the configuration directory
pub const LOCK_FILE_NAME: &str = "zonesync.lock";

/// Guard holding the run lock
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Take the lock in `config_dir`
    ///
    /// Fails if another run holds it.
    pub fn acquire(config_dir: &Path) -> Result<Self> {
        let path = config_dir.join(LOCK_FILE_NAME);
        let mut file = match Self::create(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let Some(pid) = Self::stale_holder(&path) else {
                    anyhow::bail!(
                        "Another zonesync run holds {}. Remove it if no run is active.",
                        path.display()
                    );
                };
                tracing::warn!(
                    "Removing run lock {} left by process {}, which is gone",
                    path.display(),
                    pid
                );
                std::fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove stale {}", path.display()))?;
                Self::create(&path)
                    .with_context(|| format!("Failed to create {}", path.display()))?
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to create {}", path.display()));
            }
        };

        writeln!(file, "{}", std::process::id())
            .with_context(|| format!("Failed to write {}", path.display()))?;

        tracing::debug!("Acquired run lock {}", path.display());
        Ok(Self { path })
    }
}

impl RunLock {
    fn create(path: &Path) -> std::io::Result<std::fs::File> {
        OpenOptions::new().write(true).create_new(true).open(path)
    }

    /// PID recorded in the lock file, when that process no longer runs
    ///
    /// An unreadable lock is never considered stale.
    fn stale_holder(path: &Path) -> Option<u32> {
        let pid = std::fs::read_to_string(path).ok()?.trim().parse::<u32>().ok()?;
        (!process_alive(pid)).then_some(pid)
    }
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    true
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!("Failed to remove run lock {}: {}", self.path.display(), e);
        }
    }
}
