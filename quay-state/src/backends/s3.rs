//! S3 backend for state storage

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, BucketVersioningStatus, CreateBucketConfiguration,
    PublicAccessBlockConfiguration, ServerSideEncryption, VersioningConfiguration,
};
use log::{debug, info, warn};

use crate::backend::{BackendError, BackendResult, StateBackend};
use crate::lock::LockInfo;
use crate::state::StateFile;

/// S3-based state backend
pub struct S3Backend {
    client: Client,
    bucket: String,
    /// Object key for the state file
    key: String,
    region: String,
    encrypt: bool,
    auto_create: bool,
}

impl S3Backend {
    pub async fn new(bucket: &str, key: &str, region: &str) -> BackendResult<Self> {
        if bucket.is_empty() {
            return Err(BackendError::configuration("S3 backend requires a bucket"));
        }
        if key.is_empty() {
            return Err(BackendError::configuration("S3 backend requires a key"));
        }
        if region.is_empty() {
            return Err(BackendError::configuration("S3 backend requires a region"));
        }

        let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(region.to_string()))
            .load()
            .await;

        Ok(Self {
            client: Client::new(&aws_config),
            bucket: bucket.to_string(),
            key: key.to_string(),
            region: region.to_string(),
            encrypt: true,
            auto_create: true,
        })
    }

    pub fn with_encryption(mut self, encrypt: bool) -> Self {
        self.encrypt = encrypt;
        self
    }

    pub fn with_auto_create(mut self, auto_create: bool) -> Self {
        self.auto_create = auto_create;
        self
    }

    fn lock_key(&self) -> String {
        lock_key_for(&self.key)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> BackendResult<Option<T>> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(output) => {
                let body = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| BackendError::Io(e.to_string()))?;
                let value = serde_json::from_slice(&body.into_bytes())
                    .map_err(|e| BackendError::InvalidState(format!("{}: {}", key, e)))?;
                Ok(Some(value))
            }
            Err(err) if status_of(&err) == Some(404) => Ok(None),
            Err(err) => Err(BackendError::Aws(err.to_string())),
        }
    }

    /// Create the lock object unless one already exists
    ///
    /// Returns false when the object exists.
    async fn put_lock_if_absent(&self, lock: &LockInfo) -> BackendResult<bool> {
        let body = serde_json::to_vec_pretty(lock)
            .map_err(|e| BackendError::Serialization(e.to_string()))?;

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(self.lock_key())
            .body(ByteStream::from(body))
            .content_type("application/json")
            .if_none_match("*");

        if self.encrypt {
            request = request.server_side_encryption(ServerSideEncryption::Aes256);
        }

        match request.send().await {
            Ok(_) => Ok(true),
            // 412 when the object exists, 409 when a concurrent write won
            Err(err) if matches!(status_of(&err), Some(409 | 412)) => Ok(false),
            Err(err) => Err(BackendError::Aws(err.to_string())),
        }
    }

    async fn delete_lock(&self) -> BackendResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.lock_key())
            .send()
            .await
            .map_err(|e| BackendError::Aws(e.to_string()))?;

        Ok(())
    }

    async fn bucket_exists(&self) -> BackendResult<bool> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) if status_of(&err) == Some(404) => Ok(false),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(false),
            Err(err) => Err(BackendError::Aws(err.to_string())),
        }
    }

    async fn create_bucket(&self) -> BackendResult<()> {
        info!("Creating state bucket {} in {}", self.bucket, self.region);

        let mut request = self.client.create_bucket().bucket(&self.bucket);

        // us-east-1 rejects an explicit location constraint
        if self.region != "us-east-1" {
            let config = CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                .build();
            request = request.create_bucket_configuration(config);
        }

        request
            .send()
            .await
            .map_err(|e| BackendError::BucketCreationFailed(e.to_string()))?;

        let versioning = VersioningConfiguration::builder()
            .status(BucketVersioningStatus::Enabled)
            .build();

        self.client
            .put_bucket_versioning()
            .bucket(&self.bucket)
            .versioning_configuration(versioning)
            .send()
            .await
            .map_err(|e| BackendError::Aws(format!("Failed to enable versioning: {}", e)))?;

        let public_access_block = PublicAccessBlockConfiguration::builder()
            .block_public_acls(true)
            .block_public_policy(true)
            .ignore_public_acls(true)
            .restrict_public_buckets(true)
            .build();

        self.client
            .put_public_access_block()
            .bucket(&self.bucket)
            .public_access_block_configuration(public_access_block)
            .send()
            .await
            .map_err(|e| BackendError::Aws(format!("Failed to block public access: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl StateBackend for S3Backend {
    async fn read_state(&self) -> BackendResult<Option<StateFile>> {
        self.get_json(&self.key).await
    }

    async fn write_state(&self, state: &StateFile) -> BackendResult<()> {
        let body = serde_json::to_vec_pretty(state)
            .map_err(|e| BackendError::Serialization(e.to_string()))?;

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .body(ByteStream::from(body))
            .content_type("application/json");

        if self.encrypt {
            request = request.server_side_encryption(ServerSideEncryption::Aes256);
        }

        request
            .send()
            .await
            .map_err(|e| BackendError::Aws(e.to_string()))?;

        debug!("Wrote state serial {} to s3://{}/{}", state.serial, self.bucket, self.key);
        Ok(())
    }

    async fn acquire_lock(&self, operation: &str) -> BackendResult<LockInfo> {
        let lock = LockInfo::new(operation);

        // A second attempt covers a lock released or expired between put and get
        for _ in 0..2 {
            if self.put_lock_if_absent(&lock).await? {
                return Ok(lock);
            }

            let Some(existing) = self.get_json::<LockInfo>(&self.lock_key()).await? else {
                continue;
            };

            if !existing.is_expired() {
                return Err(BackendError::locked(&existing));
            }

            warn!(
                "Taking over expired lock {} held by {} ({})",
                existing.id, existing.who, existing.operation
            );
            self.delete_lock().await?;
        }

        match self.get_json::<LockInfo>(&self.lock_key()).await? {
            Some(holder) => Err(BackendError::locked(&holder)),
            None => Err(BackendError::Aws(format!(
                "Could not create lock object s3://{}/{}",
                self.bucket,
                self.lock_key()
            ))),
        }
    }

    async fn release_lock(&self, lock: &LockInfo) -> BackendResult<()> {
        let existing = self
            .get_json::<LockInfo>(&self.lock_key())
            .await?
            .ok_or_else(|| BackendError::LockNotFound(lock.id.clone()))?;

        if existing.id != lock.id {
            return Err(BackendError::LockMismatch {
                expected: lock.id.clone(),
                actual: existing.id,
            });
        }

        self.delete_lock().await
    }

    async fn force_unlock(&self, lock_id: &str) -> BackendResult<()> {
        let existing = self
            .get_json::<LockInfo>(&self.lock_key())
            .await?
            .ok_or_else(|| BackendError::LockNotFound(lock_id.to_string()))?;

        if existing.id != lock_id {
            return Err(BackendError::LockMismatch {
                expected: lock_id.to_string(),
                actual: existing.id,
            });
        }

        self.delete_lock().await
    }

    async fn init(&self) -> BackendResult<()> {
        if !self.bucket_exists().await? {
            if self.auto_create {
                self.create_bucket().await?;
            } else {
                return Err(BackendError::BucketNotFound(self.bucket.clone()));
            }
        }
        Ok(())
    }
}

fn lock_key_for(state_key: &str) -> String {
    format!("{}.lock", state_key)
}

fn status_of<E>(err: &SdkError<E>) -> Option<u16> {
    err.raw_response().map(|r| r.status().as_u16())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_object_sits_next_to_state() {
        assert_eq!(lock_key_for("quay/web.state.json"), "quay/web.state.json.lock");
    }

    #[tokio::test]
    async fn empty_bucket_is_a_configuration_error() {
        let result = S3Backend::new("", "web.state.json", "us-east-2").await;
        assert!(matches!(result, Err(BackendError::Configuration(_))));
    }
}
