//! Advisory process lock.
//!
//! Guards against two orchestrator host processes running against the same
//! record store. The lock is a JSON file holding pid, start time, and
//! process kind. A stale lock (pid no longer running) is reclaimed
//! automatically; a live foreign lock produces a warning rather than a hard
//! block, since the underlying store tolerates concurrent readers.

use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Lock file name inside the repository's data directory.
const LOCK_FILE: &str = "orchestrator.lock";

/// Contents of the lock file.
#[derive(Debug, Serialize, Deserialize)]
pub struct LockInfo {
    /// Holder's process id
    pub pid: u32,
    /// When the holder started
    pub started_at: DateTime<Utc>,
    /// Kind of process holding the lock (e.g., "cli", "mcp")
    pub kind: String,
}

/// Outcome of a lock acquisition attempt.
#[derive(Debug)]
pub enum LockState {
    /// We hold the lock now
    Acquired,
    /// A stale lock from a dead process was reclaimed
    Reclaimed(LockInfo),
    /// Another live process holds the lock; proceed with caution
    HeldByOther(LockInfo),
}

/// An acquired (or tolerated) advisory lock. Removes the lock file on drop
/// when this process owns it.
pub struct ProcessLock {
    path: PathBuf,
    owned: bool,
    /// What acquisition found
    pub state: LockState,
}

impl ProcessLock {
    /// Acquire the advisory lock under `data_root` for a process of `kind`.
    pub fn acquire(data_root: &Path, kind: &str) -> Result<Self> {
        let path = data_root.join(LOCK_FILE);

        let state = match read_lock(&path) {
            Some(existing) if existing.pid != std::process::id() => {
                if process_alive(existing.pid) {
                    // Live foreign lock: warn, do not block.
                    return Ok(Self {
                        path,
                        owned: false,
                        state: LockState::HeldByOther(existing),
                    });
                }
                LockState::Reclaimed(existing)
            }
            _ => LockState::Acquired,
        };

        let info = LockInfo {
            pid: std::process::id(),
            started_at: Utc::now(),
            kind: kind.to_string(),
        };
        fs::create_dir_all(data_root)?;
        fs::write(&path, serde_json::to_string_pretty(&info)?)?;

        Ok(Self {
            path,
            owned: true,
            state,
        })
    }

    /// Whether this process owns the lock file.
    pub fn is_owned(&self) -> bool {
        self.owned
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        if self.owned {
            let _ = fs::remove_file(&self.path);
        }
    }
}

fn read_lock(path: &Path) -> Option<LockInfo> {
    let contents = fs::read_to_string(path).ok()?;
    serde_json::from_str(&contents).ok()
}

/// Check whether a pid refers to a running process (signal 0 probe).
#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

/// Without a liveness probe, treat foreign locks as stale.
#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    false
}
