//! S3 / MinIO object storage
//!
//! Thin pass-through to an S3-compatible bucket with path-style addressing,
//! which MinIO requires.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use s3::{creds::Credentials, Bucket, Region};
use tracing::{info, warn};

use super::storage::{join_url, ObjectStorage};
use crate::models::{AppError, AppResult, ObjectInfo, S3Config};

pub struct S3Storage {
    bucket: Box<Bucket>,
    public_base: String,
}

impl S3Storage {
    pub fn new(config: &S3Config, public_base: &str) -> AppResult<Self> {
        let region = Region::Custom {
            region: config.region.clone(),
            endpoint: config.endpoint.clone(),
        };

        let credentials = Credentials::new(
            config.access_key.as_deref(),
            config.secret_key.as_deref(),
            None,
            None,
            None,
        )
        .map_err(|e| AppError::storage(format!("Invalid S3 credentials: {}", e)))?;

        let bucket = Bucket::new(&config.bucket, region, credentials)?.with_path_style();

        info!("🪣 Object storage: bucket '{}' at {}", config.bucket, config.endpoint);

        Ok(Self {
            bucket: Box::new(bucket),
            public_base: public_base.to_string(),
        })
    }
}

/// Status codes other than 2xx are failures for S3 calls
fn ensure_success(status: u16, action: &str, key: &str) -> AppResult<()> {
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(AppError::storage(format!("{} '{}' returned HTTP {}", action, key, status)))
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    fn name(&self) -> &'static str {
        "s3"
    }

    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> AppResult<()> {
        let response = self
            .bucket
            .put_object_with_content_type(key, &data, content_type)
            .await?;
        ensure_success(response.status_code(), "PUT", key)
    }

    async fn get(&self, key: &str) -> AppResult<Option<Bytes>> {
        match self.bucket.get_object(key).await {
            Ok(response) if response.status_code() == 404 => Ok(None),
            Ok(response) => {
                ensure_success(response.status_code(), "GET", key)?;
                Ok(Some(Bytes::copy_from_slice(response.bytes())))
            }
            Err(s3::error::S3Error::HttpFailWithBody(404, _)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        match self.bucket.delete_object(key).await {
            Ok(response) if response.status_code() == 404 => Ok(()),
            Ok(response) => ensure_success(response.status_code(), "DELETE", key),
            Err(s3::error::S3Error::HttpFailWithBody(404, _)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        match self.bucket.head_object(key).await {
            Ok((_, status)) => Ok((200..300).contains(&status)),
            Err(s3::error::S3Error::HttpFailWithBody(404, _)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &str) -> AppResult<Vec<ObjectInfo>> {
        let pages = self.bucket.list(prefix.to_string(), None).await?;

        let mut objects = Vec::new();
        for object in pages.into_iter().flat_map(|page| page.contents) {
            let last_modified = match DateTime::parse_from_rfc3339(&object.last_modified) {
                Ok(at) => at.with_timezone(&Utc),
                Err(e) => {
                    warn!(key = %object.key, "Unparseable last_modified '{}': {}", object.last_modified, e);
                    continue;
                }
            };
            objects.push(ObjectInfo {
                key: object.key,
                size: object.size,
                last_modified,
            });
        }

        Ok(objects)
    }

    fn public_url(&self, key: &str) -> String {
        join_url(&self.public_base, key)
    }
}
