//! Cross-process collection locks
//!
//! A collection is locked by creating `.<collection>.lock` exclusively and
//! writing the holder's pid into it. The holder also keeps an OS advisory lock
//! (`fs2`) on the file, so a lock whose holder died is recognisable even if the
//! pid has since been reused.
//!
//! Within one process, callers for the same collection queue on a ticket gate
//! before touching the lock file and are served in arrival order.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use fs2::FileExt;
use serde::{Deserialize, Serialize};

use super::error::{Result, StoreError};

/// Acquisition budget for a single lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockPolicy {
    /// Waits allowed while the lock is genuinely held by someone else. The
    /// lock is checked once more after the last wait before giving up.
    pub max_attempts: u32,

    /// Wait `n` is `retry_delay_ms * n`, so the defaults wait 2.75s in total
    pub retry_delay_ms: u64,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            retry_delay_ms: 50,
        }
    }
}

/// How long an empty, unlocked lock file is given to receive its pid
const EMPTY_LOCK_GRACE: Duration = Duration::from_secs(5);

/// What a probe of an existing lock file found
#[derive(Debug, PartialEq, Eq)]
enum Holder {
    Live,
    Stale(String),
    Gone,
}

/// Checks if a process with the given PID is running
pub fn is_process_running(pid: u32) -> bool {
    #[cfg(target_os = "linux")]
    {
        Path::new("/proc").join(pid.to_string()).exists()
    }

    #[cfg(all(unix, not(target_os = "linux")))]
    {
        use std::process::{Command, Stdio};

        Command::new("kill")
            .args(["-0", &pid.to_string()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    #[cfg(windows)]
    {
        use std::process::{Command, Stdio};

        Command::new("tasklist")
            .args(["/FI", &format!("PID eq {}", pid)])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .map(|o| String::from_utf8_lossy(&o.stdout).contains(&pid.to_string()))
            .unwrap_or(false)
    }
}

/// An acquired lock file. Removed from disk when dropped.
#[derive(Debug)]
pub struct FileLock {
    file: Option<File>,
    path: PathBuf,
}

impl FileLock {
    /// Acquires the lock file at `path`, waiting while another live process
    /// holds it and reclaiming it if its holder is gone.
    pub fn acquire(path: &Path, resource: &str, policy: &LockPolicy) -> Result<Self> {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0;
        let mut reclaims = 0;

        loop {
            match OpenOptions::new()
                .read(true)
                .write(true)
                .create_new(true)
                .open(path)
            {
                Ok(file) => return Self::claim(file, path),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => return Err(StoreError::io(path, e)),
            }

            match probe(path)? {
                Holder::Live => {
                    if attempt >= max_attempts {
                        return Err(StoreError::LockFailed {
                            resource: resource.to_string(),
                            attempts: attempt,
                        });
                    }
                    attempt += 1;
                    let delay = policy.retry_delay_ms.saturating_mul(attempt as u64);
                    tracing::debug!(resource, attempt, delay_ms = delay, "lock held, waiting");
                    thread::sleep(Duration::from_millis(delay));
                }
                Holder::Stale(_) | Holder::Gone => {
                    // Reclaims retry immediately but are still bounded, since
                    // another process may keep winning the race for the file.
                    reclaims += 1;
                    if reclaims > max_attempts {
                        return Err(StoreError::LockFailed {
                            resource: resource.to_string(),
                            attempts: attempt + reclaims,
                        });
                    }
                }
            }
        }
    }

    fn claim(mut file: File, path: &Path) -> Result<Self> {
        // OS lock first, so a concurrent probe never sees an unlocked file
        // with our pid in it.
        file.lock_exclusive().map_err(|e| StoreError::io(path, e))?;

        let pid = std::process::id();
        let written = write_pid(&mut file, pid);

        // Dropping the half-made lock removes the file again
        let lock = Self {
            file: Some(file),
            path: path.to_path_buf(),
        };
        written.map_err(|e| StoreError::io(path, e))?;

        tracing::debug!(path = %path.display(), pid, "lock acquired");
        Ok(lock)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Releases the lock now instead of at drop
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };

        match fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "lock released"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove lock file");
            }
        }

        let _ = FileExt::unlock(&file);
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        self.release_inner();
    }
}

fn write_pid(file: &mut File, pid: u32) -> std::io::Result<()> {
    file.set_len(0)?;
    write!(file, "{}", pid)?;
    file.flush()
}

/// Inspects an existing lock file and removes it if its holder is gone
fn probe(path: &Path) -> Result<Holder> {
    let mut file = match OpenOptions::new().read(true).write(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Holder::Gone),
        Err(e) => return Err(StoreError::io(path, e)),
    };

    match file.try_lock_exclusive() {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(Holder::Live),
        // Filesystems without advisory locks fall back to the pid check alone
        Err(e) => tracing::debug!(path = %path.display(), error = %e, "cannot probe OS lock"),
    }

    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| StoreError::io(path, e))?;
    let recorded = content.trim();

    let holder = if recorded.is_empty() {
        // Either the creator has not written its pid yet, or it died in between
        let age = file
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.elapsed().ok());
        match age {
            Some(age) if age > EMPTY_LOCK_GRACE => Holder::Stale(String::new()),
            _ => Holder::Live,
        }
    } else {
        match recorded.parse::<u32>() {
            Ok(pid) if pid != std::process::id() && is_process_running(pid) => Holder::Live,
            _ => Holder::Stale(recorded.to_string()),
        }
    };

    if let Holder::Stale(recorded) = &holder {
        if still_same_file(&file, path) {
            tracing::warn!(path = %path.display(), pid = %recorded, "reclaiming stale lock");
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(StoreError::io(path, e)),
            }
        }
    }

    let _ = FileExt::unlock(&file);
    Ok(holder)
}

/// True if `path` still names the file we opened, rather than a lock
/// created by someone else after a reclaim
#[cfg(unix)]
fn still_same_file(file: &File, path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (file.metadata(), fs::metadata(path)) {
        (Ok(a), Ok(b)) => a.dev() == b.dev() && a.ino() == b.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn still_same_file(_file: &File, path: &Path) -> bool {
    path.exists()
}

#[derive(Debug, Default)]
struct Queue {
    next_ticket: u64,
    serving: u64,
}

/// Hands out per-collection locks, queuing same-process callers in order
#[derive(Debug, Default)]
pub struct LockManager {
    policy: LockPolicy,
    queues: Mutex<HashMap<String, Queue>>,
    turn: Condvar,
}

/// A held collection lock: the in-process turn plus the lock file
#[derive(Debug)]
pub struct CollectionLock<'a> {
    manager: &'a LockManager,
    resource: String,
    file: Option<FileLock>,
}

impl LockManager {
    pub fn new(policy: LockPolicy) -> Self {
        Self {
            policy,
            queues: Mutex::new(HashMap::new()),
            turn: Condvar::new(),
        }
    }

    pub fn policy(&self) -> &LockPolicy {
        &self.policy
    }

    /// Waits for this process's turn on `resource`, then acquires its lock file
    pub fn acquire(&self, resource: &str, lock_path: &Path) -> Result<CollectionLock<'_>> {
        self.wait_turn(resource);

        let mut lock = CollectionLock {
            manager: self,
            resource: resource.to_string(),
            file: None,
        };

        // On failure `lock` drops here and passes the turn on
        lock.file = Some(FileLock::acquire(lock_path, resource, &self.policy)?);
        Ok(lock)
    }

    fn queues(&self) -> MutexGuard<'_, HashMap<String, Queue>> {
        self.queues.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn wait_turn(&self, resource: &str) {
        let mut queues = self.queues();
        let queue = queues.entry(resource.to_string()).or_default();
        let ticket = queue.next_ticket;
        queue.next_ticket += 1;

        while queues.get(resource).map(|q| q.serving) != Some(ticket) {
            queues = self.turn.wait(queues).unwrap_or_else(|e| e.into_inner());
        }
    }

    fn end_turn(&self, resource: &str) {
        let mut queues = self.queues();
        if let Some(queue) = queues.get_mut(resource) {
            queue.serving += 1;
            if queue.serving == queue.next_ticket {
                queues.remove(resource);
            }
        }
        drop(queues);
        self.turn.notify_all();
    }
}

impl CollectionLock<'_> {
    pub fn resource(&self) -> &str {
        &self.resource
    }
}

impl Drop for CollectionLock<'_> {
    fn drop(&mut self) {
        // Remove the lock file before letting the next in-process caller in
        drop(self.file.take());
        self.manager.end_turn(&self.resource);
    }
}
