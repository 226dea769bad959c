use axum::async_trait;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    error::SdkError,
    presigning::PresigningConfig,
    Client,
};
use aws_smithy_types::{byte_stream::ByteStream, error::display::DisplayErrorContext};
use bytes::Bytes;
use tracing::{debug, info};

use crate::{
    config::MinioConfig,
    error::StoreError,
    retry::{self, CONNECT_ATTEMPTS, CONNECT_DELAY},
};

/// Content type every profile image is stored under.
pub const IMAGE_CONTENT_TYPE: &str = "image/png";

/// Validity of a presigned profile image URL: 120 hours.
pub const IMAGE_URL_TTL_SECS: u64 = 120 * 60 * 60;

#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Uploads `body` under `key`, replacing any existing object.
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str)
        -> Result<(), StoreError>;
    #[allow(dead_code)]
    async fn get_object(&self, key: &str) -> Result<Bytes, StoreError>;
    /// Removes `key`; a missing object is reported as `NotFound`.
    async fn delete_object(&self, key: &str) -> Result<(), StoreError>;
    /// Time-limited retrieval URL for an existing object.
    async fn presign_get(&self, key: &str, seconds: u64) -> Result<String, StoreError>;
}

fn backend<E>(what: &str, e: SdkError<E>) -> StoreError
where
    E: std::error::Error + Send + Sync + 'static,
{
    StoreError::Backend(format!("s3 {}: {}", what, DisplayErrorContext(&e)))
}

#[derive(Clone)]
pub struct Storage {
    client: Client,
    bucket: String,
}

impl Storage {
    pub async fn new(
        endpoint: &str,
        bucket: &str,
        access_key: &str,
        secret_key: &str,
        region: &str,
    ) -> Self {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(Credentials::new(
                access_key, secret_key, None, None, "static",
            ))
            .endpoint_url(endpoint)
            .load()
            .await;

        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(endpoint)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(conf),
            bucket: bucket.to_string(),
        }
    }

    /// Connects with the startup retry budget and makes sure the bucket exists.
    pub async fn connect(cfg: &MinioConfig) -> Result<Self, StoreError> {
        let endpoint = cfg.endpoint_url();
        retry::with_delay(CONNECT_ATTEMPTS, CONNECT_DELAY, || async {
            let storage =
                Storage::new(&endpoint, &cfg.bucket, &cfg.user, &cfg.password, &cfg.region).await;
            storage.ensure_bucket().await?;
            Ok::<_, StoreError>(storage)
        })
        .await
        .map_err(|e| StoreError::Connection(e.to_string()))
    }

    async fn ensure_bucket(&self) -> Result<(), StoreError> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(()),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => {
                self.client
                    .create_bucket()
                    .bucket(&self.bucket)
                    .send()
                    .await
                    .map_err(|e| backend("create_bucket", e))?;
                info!(bucket = %self.bucket, "bucket created");
                Ok(())
            }
            Err(e) => Err(backend("head_bucket", e)),
        }
    }

    async fn exists(&self, key: &str) -> Result<(), StoreError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => {
                Err(StoreError::NotFound)
            }
            Err(e) => Err(backend("head_object", e)),
        }
    }
}

#[async_trait]
impl StorageClient for Storage {
    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| backend("put_object", e))?;
        debug!(key, "object stored");
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Bytes, StoreError> {
        let resp = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_key()) => {
                return Err(StoreError::NotFound)
            }
            Err(e) => return Err(backend("get_object", e)),
        };
        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| StoreError::Backend(format!("s3 get_object body: {}", e)))?;
        Ok(data.into_bytes())
    }

    async fn delete_object(&self, key: &str) -> Result<(), StoreError> {
        // S3 deletes are silent on missing keys
        self.exists(key).await?;
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| backend("delete_object", e))?;
        debug!(key, "object deleted");
        Ok(())
    }

    async fn presign_get(&self, key: &str, seconds: u64) -> Result<String, StoreError> {
        self.exists(key).await?;
        let presigning =
            PresigningConfig::expires_in(std::time::Duration::from_secs(seconds))
                .map_err(|e| StoreError::Backend(format!("presigning config: {}", e)))?;
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| backend("presign_get", e))?;
        Ok(presigned.uri().to_string())
    }
}
