use crate::config::S3Config;
use crate::ports::FileStorage;
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use tracing::{debug, info, instrument};

/// S3 storage for todo attachments
pub struct S3FileStorage {
    client: S3Client,
    bucket: String,
}

impl S3FileStorage {
    /// Create a new S3 file storage
    pub async fn new(config: &S3Config) -> Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.bucket,
            region = %config.region,
            "S3 file storage initialized"
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
        })
    }

    /// Get the bucket name
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl FileStorage for S3FileStorage {
    /// Single-part put; the key is stored as given and returned unchanged
    #[instrument(skip(self, data), fields(bucket = %self.bucket, size_bytes = data.len()))]
    async fn upload(&self, key: &str, data: Vec<u8>) -> Result<String> {
        let content_type = get_content_type(key);

        debug!(key = %key, content_type = content_type, "Uploading object to S3");

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .context("Failed to upload file to S3")?;

        info!(key = %key, "File uploaded successfully");

        Ok(key.to_string())
    }
}

/// Content type from the key's extension; generated keys carry none
fn get_content_type(key: &str) -> &'static str {
    let extension = key
        .rsplit_once('/')
        .map_or(key, |(_, name)| name)
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("txt") => "text/plain",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}
