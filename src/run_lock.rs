use crate::error::{Result, StageError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub token: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

/// Single-flight guard for the destination table. Held for the whole run and
/// released on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    info: LockInfo,
}

impl RunLock {
    /// Takes the lock at `path`. A lock older than `stale_after` is assumed to
    /// belong to a crashed run and is taken over.
    pub fn acquire(path: &Path, stale_after: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let info = LockInfo {
            token: Uuid::new_v4().to_string(),
            pid: std::process::id(),
            started_at: Utc::now(),
        };

        match try_create(path, &info) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let holder = read_lock(path);
                match &holder {
                    Some(existing) if Utc::now() - existing.started_at < stale_after => {
                        return Err(already_running(path, existing.token.clone()));
                    }
                    Some(existing) => {
                        warn!(
                            token = %existing.token,
                            pid = existing.pid,
                            started_at = %existing.started_at,
                            "Taking over stale run lock"
                        );
                    }
                    None => warn!("Replacing unreadable run lock at {}", path.display()),
                }
                replace_stale(path, holder.as_ref().map(|h| h.token.as_str()), &info)?;
            }
            Err(e) => return Err(e.into()),
        }

        debug!(token = %info.token, "Acquired run lock at {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            info,
        })
    }

    pub fn token(&self) -> &str {
        &self.info.token
    }

    pub fn info(&self) -> &LockInfo {
        &self.info
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        // Only remove the file if it is still ours
        match read_lock(&self.path) {
            Some(current) if current.token == self.info.token => {
                if let Err(e) = fs::remove_file(&self.path) {
                    warn!("Failed to release run lock {}: {}", self.path.display(), e);
                }
            }
            _ => warn!("Run lock at {} is no longer ours", self.path.display()),
        }
    }
}

fn try_create(path: &Path, info: &LockInfo) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    let body = serde_json::to_string(info).map_err(io::Error::other)?;
    file.write_all(body.as_bytes())?;
    file.sync_all()
}

/// Swaps the stale lock holding `stale_token` (`None` when it was unreadable)
/// for ours. Another run that took the lock over first wins.
fn replace_stale(path: &Path, stale_token: Option<&str>, info: &LockInfo) -> Result<()> {
    if let Some(current) = read_lock(path) {
        if Some(current.token.as_str()) != stale_token {
            return Err(already_running(path, current.token));
        }
    }
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    match try_create(path, info) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            let token = read_lock(path).map(|l| l.token).unwrap_or_default();
            Err(already_running(path, token))
        }
        Err(e) => Err(e.into()),
    }
}

fn already_running(path: &Path, token: String) -> StageError {
    StageError::AlreadyRunning {
        path: path.to_path_buf(),
        token,
    }
}

fn read_lock(path: &Path) -> Option<LockInfo> {
    let content = fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_while_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.lock");

        let first = RunLock::acquire(&path, Duration::hours(1)).unwrap();
        let err = RunLock::acquire(&path, Duration::hours(1)).unwrap_err();

        match err {
            StageError::AlreadyRunning { token, .. } => assert_eq!(token, first.token()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_lock_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.lock");

        {
            let _lock = RunLock::acquire(&path, Duration::hours(1)).unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
        assert!(RunLock::acquire(&path, Duration::hours(1)).is_ok());
    }

    #[test]
    fn test_stale_lock_is_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.lock");
        let stale = LockInfo {
            token: "old-run".to_string(),
            pid: 1,
            started_at: Utc::now() - Duration::hours(5),
        };
        fs::write(&path, serde_json::to_string(&stale).unwrap()).unwrap();

        let lock = RunLock::acquire(&path, Duration::hours(1)).unwrap();

        assert_ne!(lock.token(), "old-run");
        assert_eq!(read_lock(&path).unwrap().token, lock.token());
    }

    fn info(token: &str, started_at: DateTime<Utc>) -> LockInfo {
        LockInfo {
            token: token.to_string(),
            pid: 1,
            started_at,
        }
    }

    #[test]
    fn test_takeover_yields_to_a_run_that_got_there_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.lock");
        // The stale "old-run" lock was already replaced by another run
        fs::write(&path, serde_json::to_string(&info("other-run", Utc::now())).unwrap()).unwrap();

        let err = replace_stale(&path, Some("old-run"), &info("ours", Utc::now())).unwrap_err();

        match err {
            StageError::AlreadyRunning { token, .. } => assert_eq!(token, "other-run"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(read_lock(&path).unwrap().token, "other-run");
    }

    #[test]
    fn test_takeover_tolerates_lock_already_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.lock");

        replace_stale(&path, Some("old-run"), &info("ours", Utc::now())).unwrap();

        assert_eq!(read_lock(&path).unwrap().token, "ours");
    }

    #[test]
    fn test_unreadable_lock_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.lock");
        fs::write(&path, "garbage").unwrap();

        assert!(RunLock::acquire(&path, Duration::hours(1)).is_ok());
    }
}
