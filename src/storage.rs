use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder as S3ConfigBuilder, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use uuid::Uuid;

use crate::config::AppConfig;

/// Longest presign duration S3 accepts.
const SECURE_URL_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Handle returned by [`BlobStorage::put`]. `opaque_id` is the only durable
/// way to address the blob; `url` is a provisional locator and must not be
/// persisted without resolving a secure URL first.
#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub opaque_id: String,
    pub url: String,
}

#[async_trait]
pub trait BlobStorage: Send + Sync + 'static {
    async fn put(&self, bytes: Vec<u8>, namespace: &str, extension: &str) -> Result<StoredBlob>;

    async fn resolve_secure_url(&self, opaque_id: &str) -> Result<String>;

    async fn delete(&self, opaque_id: &str) -> Result<()>;
}

pub struct S3BlobStore {
    client: S3Client,
    bucket: String,
}

impl S3BlobStore {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let region = Region::new(config.aws_region.clone());
        let region_provider = RegionProviderChain::first_try(Some(region))
            .or_default_provider()
            .or_else("us-east-1");

        #[allow(deprecated)]
        let mut loader = aws_config::from_env().region(region_provider);

        if let Some(endpoint) = &config.aws_endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }

        if let (Some(access_key), Some(secret_key)) = (
            config.aws_access_key_id.clone(),
            config.aws_secret_access_key.clone(),
        ) {
            let credentials = Credentials::new(access_key, secret_key, None, None, "static");
            loader = loader.credentials_provider(credentials);
        }

        let base_config = loader.load().await;
        let s3_config = S3ConfigBuilder::from(&base_config)
            .force_path_style(true)
            .build();

        Ok(Self::new(S3Client::from_conf(s3_config), config.s3_bucket.clone()))
    }
}

#[async_trait]
impl BlobStorage for S3BlobStore {
    async fn put(&self, bytes: Vec<u8>, namespace: &str, extension: &str) -> Result<StoredBlob> {
        let key = if extension.is_empty() {
            format!("{namespace}/{}", Uuid::new_v4())
        } else {
            format!("{namespace}/{}.{extension}", Uuid::new_v4())
        };

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(bytes));

        if let Some(content_type) = mime_guess::from_ext(extension).first_raw() {
            request = request.content_type(content_type);
        }

        request
            .send()
            .await
            .context("failed to upload blob to S3")?;

        Ok(StoredBlob {
            url: format!("s3://{}/{}", self.bucket, key),
            opaque_id: key,
        })
    }

    async fn resolve_secure_url(&self, opaque_id: &str) -> Result<String> {
        let presign_config = PresigningConfig::builder()
            .expires_in(SECURE_URL_EXPIRY)
            .build()
            .context("failed to build S3 presigning config")?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(opaque_id)
            .presigned(presign_config)
            .await
            .context("failed to generate secure retrieval URL")?;

        Ok(presigned.uri().to_string())
    }

    async fn delete(&self, opaque_id: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(opaque_id)
            .send()
            .await
            .context("failed to delete blob from S3")?;
        Ok(())
    }
}
