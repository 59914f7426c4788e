//! State backend trait and error types

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lock::LockInfo;
use crate::state::StateFile;

/// Errors that can occur when interacting with a state backend
#[derive(Debug, Error)]
pub enum BackendError {
    /// The state is locked by another process
    #[error("State is locked by {who} (lock ID: {lock_id}, operation: {operation})")]
    Locked {
        lock_id: String,
        who: String,
        operation: String,
    },

    /// The lock was not found (for release/force-unlock operations)
    #[error("Lock not found: {0}")]
    LockNotFound(String),

    /// Lock ID mismatch when trying to release
    #[error("Lock ID mismatch: expected {expected}, got {actual}")]
    LockMismatch { expected: String, actual: String },

    #[error("Backend configuration error: {0}")]
    Configuration(String),

    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    #[error("Failed to create bucket: {0}")]
    BucketCreationFailed(String),

    /// State file is corrupted or invalid
    #[error("Invalid state file: {0}")]
    InvalidState(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("AWS error: {0}")]
    Aws(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl BackendError {
    /// Create a Locked error from a LockInfo
    pub fn locked(lock: &LockInfo) -> Self {
        Self::Locked {
            lock_id: lock.id.clone(),
            who: lock.who.clone(),
            operation: lock.operation.clone(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Storage for the state file and its lock
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// Read the current state, `None` before the first apply
    async fn read_state(&self) -> BackendResult<Option<StateFile>>;

    /// Write the state; callers increment the serial first
    async fn write_state(&self, state: &StateFile) -> BackendResult<()>;

    /// Acquire the lock for `operation`
    ///
    /// Fails while another unexpired lock is held. An expired lock is taken over.
    async fn acquire_lock(&self, operation: &str) -> BackendResult<LockInfo>;

    /// Release a lock this process holds
    async fn release_lock(&self, lock: &LockInfo) -> BackendResult<()>;

    /// Remove a lock by id, whoever holds it
    async fn force_unlock(&self, lock_id: &str) -> BackendResult<()>;

    /// Prepare the storage (create the bucket or directory if needed)
    async fn init(&self) -> BackendResult<()>;
}

fn default_true() -> bool {
    true
}

/// Where the state is stored, as written in `quay.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    /// State file on the local disk; defaults to `.quay/<app>.state.json`
    Local {
        #[serde(default)]
        path: Option<PathBuf>,
    },
    /// State object in an S3 bucket, lock object next to it
    S3 {
        bucket: String,
        key: String,
        region: String,
        #[serde(default = "default_true")]
        encrypt: bool,
        #[serde(default = "default_true")]
        auto_create: bool,
    },
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Local { path: None }
    }
}
