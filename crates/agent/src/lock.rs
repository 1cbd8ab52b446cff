//! Run lock
//!
//! A lock file serializes convergence runs on one node. It holds either the
//! pid of the owning process or the word `anonymous` (an administrator
//! disabled runs). Acquisition never waits: the caller either gets the lock
//! or skips its run.

use crate::error::{Error, Result};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const ANONYMOUS: &str = "anonymous";

/// Who holds a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOwner {
    /// A running (or crashed) process.
    Pid(u32),
    /// Runs were disabled by hand.
    Anonymous,
}

/// Pid-based advisory lock file.
#[derive(Debug, Clone)]
pub struct Pidlock {
    path: PathBuf,
    pid: u32,
}

impl Pidlock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pid: std::process::id(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the lock for this process. Returns `false` if it is held.
    pub fn lock(&self) -> Result<bool> {
        self.acquire(&self.pid.to_string())
    }

    /// Take the lock without an owning process.
    pub fn lock_anonymous(&self) -> Result<bool> {
        self.acquire(ANONYMOUS)
    }

    /// Release a lock held by this process.
    pub fn unlock(&self) -> Result<bool> {
        self.release(LockOwner::Pid(self.pid))
    }

    /// Release an anonymous lock.
    pub fn unlock_anonymous(&self) -> Result<bool> {
        self.release(LockOwner::Anonymous)
    }

    /// Check if any live owner holds the lock.
    pub fn is_locked(&self) -> bool {
        match self.owner() {
            Some(LockOwner::Pid(pid)) => process_alive(pid),
            Some(LockOwner::Anonymous) => true,
            None => false,
        }
    }

    /// Current owner, as recorded in the file.
    pub fn owner(&self) -> Option<LockOwner> {
        let content = fs::read_to_string(&self.path).ok()?;
        let content = content.trim();
        if content == ANONYMOUS {
            return Some(LockOwner::Anonymous);
        }
        content.parse().ok().map(LockOwner::Pid)
    }

    /// Check if this process holds the lock.
    pub fn is_mine(&self) -> bool {
        self.owner() == Some(LockOwner::Pid(self.pid))
    }

    fn acquire(&self, owner: &str) -> Result<bool> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
        }
        // One retry after clearing a stale lock
        for _ in 0..2 {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.path)
            {
                Ok(mut file) => {
                    file.write_all(owner.as_bytes())
                        .map_err(|e| Error::io(&self.path, e))?;
                    log::debug!("Locked {} for {owner}", self.path.display());
                    return Ok(true);
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    if !self.clear_stale()? {
                        return Ok(false);
                    }
                }
                Err(err) => return Err(Error::io(&self.path, err)),
            }
        }
        Ok(false)
    }

    /// Remove the lock file if it names a process that no longer exists.
    fn clear_stale(&self) -> Result<bool> {
        match self.owner() {
            Some(LockOwner::Pid(pid)) if !process_alive(pid) => {
                log::warn!(
                    "Removing stale lock {} held by pid {pid}",
                    self.path.display()
                );
                self.remove()?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn release(&self, owner: LockOwner) -> Result<bool> {
        if self.owner() != Some(owner) {
            return Ok(false);
        }
        self.remove()?;
        log::debug!("Unlocked {}", self.path.display());
        Ok(true)
    }

    fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::io(&self.path, err)),
        }
    }
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: signal 0 only checks for existence and permission
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_is_exclusive() {
        let dir = TempDir::new().unwrap();
        let lock = Pidlock::new(dir.path().join("agent.lock"));
        assert!(!lock.is_locked());

        assert!(lock.lock().unwrap());
        assert!(lock.is_locked());
        assert!(lock.is_mine());
        assert!(!lock.lock().unwrap());

        assert!(lock.unlock().unwrap());
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_anonymous_lock() {
        let dir = TempDir::new().unwrap();
        let lock = Pidlock::new(dir.path().join("agent.lock"));
        assert!(lock.lock_anonymous().unwrap());
        assert_eq!(lock.owner(), Some(LockOwner::Anonymous));
        assert!(!lock.lock().unwrap());
        // A pid unlock does not release an anonymous lock
        assert!(!lock.unlock().unwrap());
        assert!(lock.unlock_anonymous().unwrap());
        assert!(lock.lock().unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_stale_lock_is_recovered() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agent.lock");
        // Pids are bounded well below this on every supported system
        fs::write(&path, "999999999").unwrap();

        let lock = Pidlock::new(&path);
        assert!(!lock.is_locked());
        assert!(lock.lock().unwrap());
        assert!(lock.is_mine());
    }
}
