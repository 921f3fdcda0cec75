//! Cross-process ledger lock.
//!
//! The lock is a sibling file (`<ledger>.lock`) holding the owner's identity.
//! Acquisition writes a per-attempt temporary file with exclusive creation,
//! then renames it onto the lock path; the rename is the single linearization
//! point, and a re-read of the lock id decides who won. A stale lock is
//! stolen only when it is old enough, was taken on this host, and its owner
//! process is provably gone. A lock from another host is always treated as
//! live; remote liveness cannot be disproven from here.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Tunables for lock acquisition.
#[derive(Debug, Clone)]
pub struct LockOptions {
    /// Total time to keep retrying before giving up.
    pub acquire_timeout_ms: u64,
    /// Pause between attempts.
    pub retry_delay_ms: u64,
    /// Age past which a same-host lock with a dead owner may be stolen.
    pub stale_timeout_ms: u64,
}

impl Default for LockOptions {
    fn default() -> Self {
        LockOptions {
            acquire_timeout_ms: 30_000,
            retry_delay_ms: 100,
            stale_timeout_ms: 600_000,
        }
    }
}

/// The identity recorded inside the lock file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockOwner {
    pub pid: u32,
    pub hostname: String,
    pub lock_id: String,
    pub acquired_at: String,
}

/// Proof of lock ownership. Dropping the guard releases the lock on a
/// best-effort basis; [`LockGuard::release`] reports failures.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    lock_id: String,
    released: bool,
}

impl LockGuard {
    /// Unlink the lock file. Call after the protected write has been
    /// persisted.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Integrity(format!(
                "failed to release ledger lock {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        // Only remove the file if it is still ours.
        if let Ok(Some(owner)) = read_owner(&self.path) {
            if owner.lock_id == self.lock_id {
                let _ = std::fs::remove_file(&self.path);
            }
        }
    }
}

/// Acquire the lock at `path`, retrying until the configured deadline.
pub fn acquire(path: &Path, options: &LockOptions) -> Result<LockGuard> {
    let started = Instant::now();
    let retry = Duration::from_millis(options.retry_delay_ms.max(1));
    let deadline = Duration::from_millis(options.acquire_timeout_ms);

    loop {
        if let Some(owner) = read_owner(path)? {
            if is_stale(&owner, options)? {
                tracing::warn!(
                    pid = owner.pid,
                    lock_id = %owner.lock_id,
                    "removing stale ledger lock from dead process"
                );
                remove_quietly(path);
            } else {
                if started.elapsed() >= deadline {
                    return Err(contention(path, &owner, started));
                }
                std::thread::sleep(retry);
                continue;
            }
        }

        let mine = LockOwner {
            pid: std::process::id(),
            hostname: local_hostname(),
            lock_id: Uuid::new_v4().to_string(),
            acquired_at: Utc::now().to_rfc3339(),
        };
        if let Err(e) = attempt(path, &mine) {
            // Another attempt collided on the temporary file or the rename;
            // back off and try again.
            tracing::debug!(error = %e, "lock attempt failed, retrying");
        } else {
            match read_owner(path)? {
                Some(owner) if owner.lock_id == mine.lock_id => {
                    return Ok(LockGuard {
                        path: path.to_path_buf(),
                        lock_id: mine.lock_id,
                        released: false,
                    });
                }
                _ => {} // lost the race; the winner's id is on disk
            }
        }

        if started.elapsed() >= deadline {
            let holder = read_owner(path)?;
            return Err(match holder {
                Some(owner) => contention(path, &owner, started),
                None => Error::Integrity(format!(
                    "could not acquire ledger lock {} within {} ms",
                    path.display(),
                    started.elapsed().as_millis()
                )),
            });
        }
        std::thread::sleep(retry);
    }
}

/// Remove the lock unconditionally. Returns whether a lock file existed.
pub fn force_unlock(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::Integrity(format!(
            "failed to remove ledger lock {}: {}",
            path.display(),
            e
        ))),
    }
}

fn attempt(path: &Path, mine: &LockOwner) -> std::io::Result<()> {
    let temp = path.with_extension(format!(
        "lock.{}.{}",
        mine.pid,
        &mine.lock_id[..8.min(mine.lock_id.len())]
    ));
    {
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp)?;
        file.write_all(serde_json::to_string_pretty(mine).unwrap_or_default().as_bytes())?;
        file.sync_all()?;
    }
    let renamed = std::fs::rename(&temp, path);
    if renamed.is_err() {
        remove_quietly(&temp);
    }
    renamed
}

fn read_owner(path: &Path) -> Result<Option<LockOwner>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(Error::Integrity(format!(
                "failed to read ledger lock {}: {}",
                path.display(),
                e
            )));
        }
    };
    let owner: LockOwner = serde_json::from_str(&content).map_err(|e| {
        Error::Integrity(format!(
            "ledger lock {} holds corrupted owner data ({}); use force-unlock after verifying no migration is running",
            path.display(),
            e
        ))
    })?;
    Ok(Some(owner))
}

fn is_stale(owner: &LockOwner, options: &LockOptions) -> Result<bool> {
    let acquired_at: DateTime<Utc> = owner
        .acquired_at
        .parse()
        .map_err(|_| {
            Error::Integrity(format!(
                "ledger lock holds an unreadable acquisition time '{}'",
                owner.acquired_at
            ))
        })?;
    let age = Utc::now().signed_duration_since(acquired_at);
    if age < chrono::Duration::milliseconds(options.stale_timeout_ms as i64) {
        return Ok(false);
    }
    if owner.hostname != local_hostname() {
        // Never steal from another host.
        return Ok(false);
    }
    Ok(!process_alive(owner.pid))
}

fn contention(path: &Path, owner: &LockOwner, started: Instant) -> Error {
    Error::Integrity(format!(
        "could not acquire ledger lock {} within {} ms; held by pid {} on host {} since {}",
        path.display(),
        started.elapsed().as_millis(),
        owner.pid,
        owner.hostname,
        owner.acquired_at
    ))
}

fn remove_quietly(path: &Path) {
    let _ = std::fs::remove_file(path);
}

/// This machine's hostname, as recorded in lock files.
pub fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Zero-signal liveness probe. Where the probe is unavailable the owner is
/// reported alive, so an unprovable lock is never stolen.
#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    match kill(Pid::from_raw(pid as i32), None) {
        Ok(()) => true,
        Err(Errno::ESRCH) => false,
        Err(_) => true,
    }
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    true
}
