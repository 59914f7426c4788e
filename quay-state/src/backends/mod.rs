//! Backend implementations for state storage

mod local;
mod s3;

pub use local::LocalBackend;
pub use s3::S3Backend;

use std::path::PathBuf;

use crate::backend::{BackendConfig, BackendResult, StateBackend};

/// Directory holding local state files
pub const LOCAL_STATE_DIR: &str = ".quay";

/// Create a backend from configuration
///
/// A local backend without an explicit path stores `.quay/<app>.state.json`.
pub async fn create_backend(
    config: &BackendConfig,
    app_name: &str,
) -> BackendResult<Box<dyn StateBackend>> {
    match config {
        BackendConfig::Local { path } => {
            let path = path.clone().unwrap_or_else(|| default_local_path(app_name));
            Ok(Box::new(LocalBackend::with_path(path)))
        }
        BackendConfig::S3 {
            bucket,
            key,
            region,
            encrypt,
            auto_create,
        } => {
            let backend = S3Backend::new(bucket, key, region)
                .await?
                .with_encryption(*encrypt)
                .with_auto_create(*auto_create);
            Ok(Box::new(backend))
        }
    }
}

fn default_local_path(app_name: &str) -> PathBuf {
    PathBuf::from(LOCAL_STATE_DIR).join(format!("{}.state.json", app_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn local_state_defaults_under_quay_dir() {
        assert_eq!(
            default_local_path("web"),
            PathBuf::from(".quay/web.state.json")
        );
    }

    #[tokio::test]
    async fn local_backend_uses_configured_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("custom.state.json");
        let backend = create_backend(&BackendConfig::Local { path: Some(path.clone()) }, "web")
            .await
            .unwrap();

        backend.write_state(&crate::StateFile::new()).await.unwrap();
        assert!(path.exists());
    }
}
