//! Local file backend for state storage
//!
//! The state lives in a JSON file; a sibling `.lock` file holds the lock.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};

use crate::backend::{BackendError, BackendResult, StateBackend};
use crate::lock::LockInfo;
use crate::state::StateFile;

/// How long to wait for a lock file another process is still writing
const LOCK_SETTLE_ATTEMPTS: u32 = 20;
const LOCK_SETTLE_DELAY: Duration = Duration::from_millis(10);

/// Local file backend
pub struct LocalBackend {
    state_path: PathBuf,
    lock_path: PathBuf,
}

impl LocalBackend {
    pub fn with_path(state_path: PathBuf) -> Self {
        let lock_path = state_path.with_extension("lock");
        Self {
            state_path,
            lock_path,
        }
    }

    fn ensure_parent_dir(&self) -> BackendResult<()> {
        match self.state_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
                .map_err(|e| BackendError::Io(format!("Failed to create state directory: {}", e))),
            _ => Ok(()),
        }
    }

    fn read_lock(&self) -> BackendResult<Option<LockInfo>> {
        let content = match std::fs::read_to_string(&self.lock_path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BackendError::Io(format!("Failed to read lock file: {}", e))),
        };
        let lock = serde_json::from_str(&content)
            .map_err(|e| BackendError::InvalidState(format!("Failed to parse lock file: {}", e)))?;
        Ok(Some(lock))
    }

    /// Read the lock, giving a process that just created it time to fill it in
    async fn read_settled_lock(&self) -> BackendResult<Option<LockInfo>> {
        for _ in 0..LOCK_SETTLE_ATTEMPTS {
            match self.read_lock() {
                Err(BackendError::InvalidState(_)) => tokio::time::sleep(LOCK_SETTLE_DELAY).await,
                other => return other,
            }
        }
        self.read_lock()
    }

    /// Create the lock file unless one already exists
    ///
    /// Returns false when the file exists.
    fn create_lock(&self, lock: &LockInfo) -> BackendResult<bool> {
        let content = serde_json::to_vec_pretty(lock)
            .map_err(|e| BackendError::Serialization(format!("Failed to serialize lock: {}", e)))?;

        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.lock_path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(BackendError::Io(format!("Failed to create lock file: {}", e))),
        };

        if let Err(e) = file.write_all(&content).and_then(|_| file.sync_all()) {
            let _ = std::fs::remove_file(&self.lock_path);
            return Err(BackendError::Io(format!("Failed to write lock file: {}", e)));
        }
        Ok(true)
    }

    fn remove_lock(&self) -> BackendResult<()> {
        match std::fs::remove_file(&self.lock_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BackendError::Io(format!("Failed to remove lock file: {}", e))),
        }
    }
}

#[async_trait]
impl StateBackend for LocalBackend {
    async fn read_state(&self) -> BackendResult<Option<StateFile>> {
        if !self.state_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.state_path)
            .map_err(|e| BackendError::Io(format!("Failed to read state file: {}", e)))?;

        let state: StateFile = serde_json::from_str(&content).map_err(|e| {
            BackendError::InvalidState(format!("Failed to parse state file: {}", e))
        })?;

        Ok(Some(state))
    }

    async fn write_state(&self, state: &StateFile) -> BackendResult<()> {
        self.ensure_parent_dir()?;

        let content = serde_json::to_string_pretty(state).map_err(|e| {
            BackendError::Serialization(format!("Failed to serialize state: {}", e))
        })?;

        // Atomic replace through a temp file in the same directory
        let tmp_path = self.state_path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content)
            .map_err(|e| BackendError::Io(format!("Failed to write state file: {}", e)))?;
        std::fs::rename(&tmp_path, &self.state_path)
            .map_err(|e| BackendError::Io(format!("Failed to replace state file: {}", e)))?;

        debug!(
            "Wrote state serial {} to {}",
            state.serial,
            self.state_path.display()
        );
        Ok(())
    }

    async fn acquire_lock(&self, operation: &str) -> BackendResult<LockInfo> {
        self.ensure_parent_dir()?;
        let lock = LockInfo::new(operation);

        // A second attempt covers a lock released or expired between create and read
        for _ in 0..2 {
            if self.create_lock(&lock)? {
                return Ok(lock);
            }

            let Some(existing) = self.read_settled_lock().await? else {
                continue;
            };

            if !existing.is_expired() {
                return Err(BackendError::locked(&existing));
            }

            warn!(
                "Taking over expired lock {} held by {} ({})",
                existing.id, existing.who, existing.operation
            );
            self.remove_lock()?;
        }

        match self.read_settled_lock().await? {
            Some(holder) => Err(BackendError::locked(&holder)),
            None => Err(BackendError::Io(format!(
                "Could not create lock file {}",
                self.lock_path.display()
            ))),
        }
    }

    async fn release_lock(&self, lock: &LockInfo) -> BackendResult<()> {
        let existing = self
            .read_lock()?
            .ok_or_else(|| BackendError::LockNotFound(lock.id.clone()))?;

        if existing.id != lock.id {
            return Err(BackendError::LockMismatch {
                expected: lock.id.clone(),
                actual: existing.id,
            });
        }

        self.remove_lock()
    }

    async fn force_unlock(&self, lock_id: &str) -> BackendResult<()> {
        let existing = self
            .read_lock()?
            .ok_or_else(|| BackendError::LockNotFound(lock_id.to_string()))?;

        if existing.id != lock_id {
            return Err(BackendError::LockMismatch {
                expected: lock_id.to_string(),
                actual: existing.id,
            });
        }

        self.remove_lock()
    }

    async fn init(&self) -> BackendResult<()> {
        self.ensure_parent_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn read_write_state() {
        let dir = tempdir().unwrap();
        let backend = LocalBackend::with_path(dir.path().join("nested/web.state.json"));

        assert!(backend.read_state().await.unwrap().is_none());

        let mut state = StateFile::new();
        state.increment_serial();
        backend.write_state(&state).await.unwrap();

        let read = backend.read_state().await.unwrap().unwrap();
        assert_eq!(read.serial, 1);
        assert_eq!(read.lineage, state.lineage);
        assert!(!dir.path().join("nested/web.state.json.tmp").exists());
    }

    #[tokio::test]
    async fn corrupted_state_is_invalid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("web.state.json");
        std::fs::write(&path, "not json").unwrap();

        let backend = LocalBackend::with_path(path);
        let result = backend.read_state().await;
        assert!(matches!(result, Err(BackendError::InvalidState(_))));
    }

    #[tokio::test]
    async fn lock_is_exclusive_until_released() {
        let dir = tempdir().unwrap();
        let backend = LocalBackend::with_path(dir.path().join("web.state.json"));

        let lock = backend.acquire_lock("apply").await.unwrap();
        assert_eq!(lock.operation, "apply");

        let result = backend.acquire_lock("destroy").await;
        assert!(matches!(result, Err(BackendError::Locked { .. })));

        backend.release_lock(&lock).await.unwrap();

        let lock2 = backend.acquire_lock("destroy").await.unwrap();
        assert_eq!(lock2.operation, "destroy");
        backend.release_lock(&lock2).await.unwrap();
    }

    #[tokio::test]
    async fn expired_lock_is_taken_over() {
        let dir = tempdir().unwrap();
        let backend = LocalBackend::with_path(dir.path().join("web.state.json"));

        let stale = LockInfo::with_timeout("apply", -60);
        std::fs::write(
            dir.path().join("web.state.lock"),
            serde_json::to_string(&stale).unwrap(),
        )
        .unwrap();

        let lock = backend.acquire_lock("apply").await.unwrap();
        assert_ne!(lock.id, stale.id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_acquires_have_one_winner() {
        for _ in 0..25 {
            let dir = tempdir().unwrap();
            let path = dir.path().join("web.state.json");

            let contenders: Vec<_> = (0..8)
                .map(|_| {
                    let backend = LocalBackend::with_path(path.clone());
                    tokio::spawn(async move { backend.acquire_lock("apply").await })
                })
                .collect();

            let mut winners = 0;
            for contender in contenders {
                match contender.await.unwrap() {
                    Ok(_) => winners += 1,
                    Err(BackendError::Locked { .. }) => {}
                    Err(other) => panic!("unexpected error: {}", other),
                }
            }
            assert_eq!(winners, 1);
        }
    }

    #[tokio::test]
    async fn release_rejects_foreign_lock() {
        let dir = tempdir().unwrap();
        let backend = LocalBackend::with_path(dir.path().join("web.state.json"));

        let held = backend.acquire_lock("apply").await.unwrap();
        let other = LockInfo::new("apply");

        let result = backend.release_lock(&other).await;
        assert!(matches!(result, Err(BackendError::LockMismatch { .. })));

        let result = backend.force_unlock("no-such-lock").await;
        assert!(matches!(result, Err(BackendError::LockMismatch { .. })));

        backend.force_unlock(&held.id).await.unwrap();
        let result = backend.force_unlock(&held.id).await;
        assert!(matches!(result, Err(BackendError::LockNotFound(_))));
    }
}
