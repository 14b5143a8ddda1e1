//! Exclusive file-based locking serializing tick execution.
//!
//! Only one tick may run against a project's data directory at a time.
//! The lock is a real OS-level advisory lock (`flock` on Unix,
//! `LockFileEx` on Windows via `fs4`), not an exists-check: two
//! processes racing `acquire` at the same instant cannot both win. The
//! lock file also records the holding tick's id and hostname so a
//! contended acquire can say who holds it, not just that it's held.

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fs4::FileExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const LOCK_FILE: &str = "lock";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub hostname: String,
    pub tick_id: String,
    pub acquired_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock already held by tick {tick_id} (pid {pid}) on {hostname} since {acquired_at}")]
    Held { tick_id: String, pid: u32, hostname: String, acquired_at: DateTime<Utc> },
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

/// Lock file handle that releases automatically on drop. Holds the
/// open `File` the OS lock is attached to; the lock is released the
/// moment the handle closes, whether via `release` or `Drop`.
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
    file: Option<File>,
}

impl LockFile {
    /// Acquire a lock in `state_dir`, failing if one is already held.
    pub fn acquire(state_dir: &Path, tick_id: &str) -> Result<Self, LockError> {
        let lock_path = state_dir.join(LOCK_FILE);

        fs::create_dir_all(state_dir)
            .with_context(|| format!("failed to create state dir {}", state_dir.display()))
            .map_err(LockError::Io)?;

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("failed to open lock file {}", lock_path.display()))
            .map_err(LockError::Io)?;

        if file.try_lock_exclusive().is_err() {
            let existing = read_lock_info_from_path(&lock_path).map_err(LockError::Io)?;
            return Err(LockError::Held {
                tick_id: existing.tick_id,
                pid: existing.pid,
                hostname: existing.hostname,
                acquired_at: existing.acquired_at,
            });
        }

        let info = LockInfo {
            pid: std::process::id(),
            hostname: gethostname::gethostname().to_string_lossy().to_string(),
            tick_id: tick_id.to_string(),
            acquired_at: Utc::now(),
        };

        write_lock_info(&mut file, &info).map_err(LockError::Io)?;

        Ok(Self { path: lock_path, file: Some(file) })
    }

    /// Acquire a lock, treating a lock older than `timeout` as stale
    /// and removing it first. The stale check reads the lock file's
    /// recorded timestamp, not an OS lock state, since a stale lock
    /// from a crashed process holds no live OS lock to query.
    pub fn acquire_with_timeout(
        state_dir: &Path,
        tick_id: &str,
        timeout: Duration,
    ) -> Result<Self, LockError> {
        let lock_path = state_dir.join(LOCK_FILE);

        if lock_path.exists() {
            match Self::read_lock_info(state_dir) {
                Ok(info) => {
                    let age = Utc::now() - info.acquired_at;
                    if age.num_seconds().unsigned_abs() > timeout.as_secs() {
                        fs::remove_file(&lock_path)
                            .with_context(|| {
                                format!("failed to remove stale lock file {}", lock_path.display())
                            })
                            .map_err(LockError::Io)?;
                    }
                }
                Err(_) => {
                    fs::remove_file(&lock_path)
                        .with_context(|| {
                            format!("failed to remove corrupt lock file {}", lock_path.display())
                        })
                        .map_err(LockError::Io)?;
                }
            }
        }

        Self::acquire(state_dir, tick_id)
    }

    pub fn release(&mut self) -> Result<()> {
        if let Some(file) = self.file.take() {
            file.unlock().context("failed to unlock lock file")?;
            drop(file);
        }
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("failed to remove lock file {}", self.path.display()))?;
        }
        Ok(())
    }

    /// Probe whether `state_dir` is currently locked without holding
    /// the lock afterward: opens the file, attempts the OS lock, and
    /// immediately unlocks if it succeeds.
    pub fn is_locked(state_dir: &Path) -> Result<bool> {
        let lock_path = state_dir.join(LOCK_FILE);
        if !lock_path.exists() {
            return Ok(false);
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("failed to open lock file {}", lock_path.display()))?;
        if file.try_lock_exclusive().is_err() {
            return Ok(true);
        }
        file.unlock().context("failed to unlock probe lock")?;
        Ok(false)
    }

    pub fn read_lock_info(state_dir: &Path) -> Result<LockInfo> {
        read_lock_info_from_path(&state_dir.join(LOCK_FILE))
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

fn write_lock_info(file: &mut File, info: &LockInfo) -> Result<()> {
    let json = serde_json::to_string_pretty(info).context("failed to serialize lock info")?;
    file.set_len(0).context("failed to truncate lock file")?;
    file.seek(SeekFrom::Start(0)).context("failed to seek lock file")?;
    file.write_all(json.as_bytes()).context("failed to write lock file")?;
    file.sync_all().context("failed to sync lock file")?;
    Ok(())
}

fn read_lock_info_from_path(path: &Path) -> Result<LockInfo> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read lock file {}", path.display()))?;
    let info: LockInfo = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse lock JSON from {}", path.display()))?;
    Ok(info)
}

pub fn lock_path(state_dir: &Path) -> PathBuf {
    state_dir.join(LOCK_FILE)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn acquire_creates_lock_file() {
        let td = tempdir().expect("tempdir");
        let mut lock = LockFile::acquire(td.path(), "tick-1").expect("acquire");
        assert!(lock_path(td.path()).exists());
        lock.release().expect("release");
        assert!(!lock_path(td.path()).exists());
    }

    #[test]
    fn acquire_fails_when_locked() {
        let td = tempdir().expect("tempdir");
        let _lock1 = LockFile::acquire(td.path(), "tick-1").expect("first acquire");

        let result = LockFile::acquire(td.path(), "tick-2");
        assert!(matches!(result, Err(LockError::Held { .. })));
    }

    #[test]
    fn drop_releases_lock() {
        let td = tempdir().expect("tempdir");
        {
            let _lock = LockFile::acquire(td.path(), "tick-1").expect("acquire");
            assert!(lock_path(td.path()).exists());
        }
        assert!(!lock_path(td.path()).exists());
    }

    #[test]
    fn read_lock_info_records_tick_id_and_hostname() {
        let td = tempdir().expect("tempdir");
        let _lock = LockFile::acquire(td.path(), "tick-42").expect("acquire");

        let info = LockFile::read_lock_info(td.path()).expect("read info");
        assert_eq!(info.pid, std::process::id());
        assert_eq!(info.tick_id, "tick-42");
        assert!(!info.hostname.is_empty());
    }

    #[test]
    fn is_locked_returns_correct_status() {
        let td = tempdir().expect("tempdir");
        assert!(!LockFile::is_locked(td.path()).expect("is_locked"));

        let _lock = LockFile::acquire(td.path(), "tick-1").expect("acquire");
        assert!(LockFile::is_locked(td.path()).expect("is_locked"));
    }

    #[test]
    fn acquire_with_timeout_removes_stale_locks() {
        let td = tempdir().expect("tempdir");

        let lock_path = lock_path(td.path());
        let old_info = LockInfo {
            pid: 12345,
            hostname: "test-host".to_string(),
            tick_id: "tick-stale".to_string(),
            acquired_at: Utc::now() - chrono::Duration::hours(2),
        };
        fs::write(&lock_path, serde_json::to_string(&old_info).expect("serialize"))
            .expect("write stale lock");

        let _lock = LockFile::acquire_with_timeout(td.path(), "tick-new", Duration::from_secs(3600))
            .expect("acquire with timeout");

        let info = LockFile::read_lock_info(td.path()).expect("read info");
        assert_eq!(info.tick_id, "tick-new");
    }

    #[test]
    fn acquire_with_timeout_fails_on_fresh_lock() {
        let td = tempdir().expect("tempdir");

        let _lock1 = LockFile::acquire(td.path(), "tick-1").expect("first acquire");

        let result = LockFile::acquire_with_timeout(td.path(), "tick-2", Duration::from_secs(3600));
        assert!(matches!(result, Err(LockError::Held { .. })));
    }
}
