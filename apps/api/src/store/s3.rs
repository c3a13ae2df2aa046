use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use tracing::info;
use uuid::Uuid;

use crate::store::{ArtifactStore, StoreError};

/// Screenshot storage in the API's S3 bucket (MinIO locally).
pub struct S3ArtifactStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ArtifactStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

pub(crate) fn screenshot_key(user_id: Uuid, cycle_id: Uuid, label: &str) -> String {
    let label: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!("auto-apply/{user_id}/{cycle_id}/{label}.png")
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    async fn put_screenshot(
        &self,
        user_id: Uuid,
        cycle_id: Uuid,
        label: &str,
        png: Vec<u8>,
    ) -> Result<String, StoreError> {
        let key = screenshot_key(user_id, cycle_id, label);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(png))
            .content_type("image/png")
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(format!("S3 upload failed: {e}")))?;

        info!("Uploaded screenshot to s3://{}/{}", self.bucket, key);
        Ok(format!("s3://{}/{}", self.bucket, key))
    }
}
