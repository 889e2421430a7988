use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    presigning::PresigningConfig,
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use bytes::Bytes;
use thiserror::Error;
use tracing::debug;

use crate::config::AppConfig;

/// Context attached to a failed storage write so callers can tell it apart
/// from database failures.
#[derive(Error, Debug)]
#[error("{op} object {key}")]
pub struct StorageError {
    pub op: &'static str,
    pub key: String,
}

impl StorageError {
    pub fn new(op: &'static str, key: &str) -> Self {
        Self {
            op,
            key: key.to_string(),
        }
    }
}

/// Object storage for uploaded profile photos.
#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()>;
    async fn delete_object(&self, key: &str) -> anyhow::Result<()>;
    async fn presign_get(&self, key: &str, expires: Duration) -> anyhow::Result<String>;
}

/// S3-compatible bucket (MinIO in development).
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    pub async fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let endpoint = config.minio_endpoint.as_str();
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new(
                &config.minio_access_key,
                &config.minio_secret_key,
                None,
                None,
                "static",
            ))
            .endpoint_url(endpoint)
            .load()
            .await;

        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(endpoint)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(conf),
            bucket: config.minio_bucket.clone(),
        })
    }
}

#[async_trait]
impl StorageClient for S3Storage {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        let size = body.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .with_context(|| format!("s3 put_object {}", key))?;
        debug!(%key, size, "object stored");
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("s3 delete_object {}", key))?;
        debug!(%key, "object deleted");
        Ok(())
    }

    async fn presign_get(&self, key: &str, expires: Duration) -> anyhow::Result<String> {
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(PresigningConfig::expires_in(expires)?)
            .await
            .with_context(|| format!("s3 presign_get {}", key))?;
        Ok(presigned.uri().to_string())
    }
}
