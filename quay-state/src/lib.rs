//! quay State Management
//!
//! Recorded state of a deployed stack, stored in a local file or in S3, with
//! a lock that serializes applies of the same stack.
//!
//! # Overview
//!
//! - **StateFile**: recorded resources (in apply order) and outputs
//! - **StateBackend**: storage trait implemented by the local and S3 backends
//! - **LockInfo**: who holds the stack lock, and until when
//!
//! # Example
//!
//! ```ignore
//! use quay_state::{create_backend, BackendConfig};
//!
//! let config = BackendConfig::S3 {
//!     bucket: "my-state-bucket".to_string(),
//!     key: "quay/web.state.json".to_string(),
//!     region: "us-east-2".to_string(),
//!     encrypt: true,
//!     auto_create: true,
//! };
//! let backend = create_backend(&config, "web").await?;
//!
//! let lock = backend.acquire_lock("apply").await?;
//! let state = backend.read_state().await?.unwrap_or_default();
//! // ... apply ...
//! backend.write_state(&state).await?;
//! backend.release_lock(&lock).await?;
//! ```

pub mod backend;
pub mod backends;
pub mod lock;
pub mod state;

// Re-export main types for convenience
pub use backend::{BackendConfig, BackendError, BackendResult, StateBackend};
pub use backends::create_backend;
pub use lock::LockInfo;
pub use state::{ResourceState, StateFile};
