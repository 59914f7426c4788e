//! Loading `quay.json`

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use quay_aws::{StackConfig, hash_build_context};
use quay_core::declaration::Declaration;
use quay_state::BackendConfig;

/// Stack parameters plus where the state is kept
#[derive(Debug, Clone, Deserialize)]
pub struct QuayConfig {
    #[serde(flatten)]
    pub stack: StackConfig,
    #[serde(default)]
    pub backend: BackendConfig,
}

impl QuayConfig {
    pub fn parse(content: &str) -> Result<Self> {
        let config: QuayConfig = serde_json::from_str(content)?;
        config.stack.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    /// Declaration of the stack, hashing the build context unless a hash is pinned
    pub fn declare(&self) -> Result<Declaration> {
        let mut stack = self.stack.clone();
        if stack.source_hash.is_none() {
            let hash = hash_build_context(&stack.build_context).with_context(|| {
                format!(
                    "Failed to hash build context {}",
                    stack.build_context.display()
                )
            })?;
            stack.source_hash = Some(hash);
        }
        Ok(quay_aws::declare(&stack)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const MINIMAL: &str = r#"{
        "app_name": "streamlit-app",
        "account_id": "123456789012",
        "region": "us-east-2",
        "inference_endpoint_arns": [
            "arn:aws:sagemaker:us-east-2:123456789012:endpoint/chat-model"
        ]
    }"#;

    #[test]
    fn backend_defaults_to_local() {
        let config = QuayConfig::parse(MINIMAL).unwrap();
        assert_eq!(config.backend, BackendConfig::Local { path: None });
        assert_eq!(config.stack.container_port, 8501);
        assert_eq!(config.stack.app_name, "streamlit-app");
    }

    #[test]
    fn s3_backend_sits_beside_stack_fields() {
        let content = r#"{
            "app_name": "streamlit-app",
            "account_id": "123456789012",
            "region": "us-east-2",
            "inference_endpoint_arns": [],
            "cpu": 512,
            "memory_mib": 1024,
            "backend": {
                "type": "s3",
                "bucket": "quay-state-123456789012",
                "key": "streamlit-app.state.json",
                "region": "us-east-2"
            }
        }"#;
        let config = QuayConfig::parse(content).unwrap();
        assert_eq!(config.stack.cpu, 512);
        assert!(matches!(config.backend, BackendConfig::S3 { ref bucket, .. } if bucket == "quay-state-123456789012"));
    }

    #[test]
    fn invalid_stack_is_rejected_on_load() {
        let content = MINIMAL.replace("\"us-east-2\"", "\"mars-1\"");
        let err = QuayConfig::parse(&content).unwrap_err();
        assert!(format!("{:#}", err).contains("region"));
    }

    #[test]
    fn build_context_is_hashed_when_not_pinned() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM python:3.12-slim\n").unwrap();

        let mut config = QuayConfig::parse(MINIMAL).unwrap();
        config.stack.build_context = dir.path().to_path_buf();
        let decl = config.declare().unwrap();

        let build = decl.find("image_build").unwrap();
        assert!(build.attributes.contains_key("source_hash"));
    }

    #[test]
    fn missing_build_context_is_an_error() {
        let mut config = QuayConfig::parse(MINIMAL).unwrap();
        config.stack.build_context = PathBuf::from("/nonexistent/quay/context");
        assert!(config.declare().is_err());
    }
}
