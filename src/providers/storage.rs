//! Object storage abstraction
//!
//! Listing photos and avatars are plain objects under `uploads/<user_id>/`.
//! `S3Storage` talks to MinIO or any S3-compatible service, `MemoryStorage`
//! keeps bytes in a DashMap for development and tests.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::models::{AppResult, ObjectInfo};

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Backend name for health output
    fn name(&self) -> &'static str;

    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> AppResult<()>;
    /// `None` when the object does not exist
    async fn get(&self, key: &str) -> AppResult<Option<Bytes>>;
    /// Deleting a missing object is not an error
    async fn delete(&self, key: &str) -> AppResult<()>;
    async fn exists(&self, key: &str) -> AppResult<bool>;
    async fn list(&self, prefix: &str) -> AppResult<Vec<ObjectInfo>>;
    /// Browser-facing URL of an object
    fn public_url(&self, key: &str) -> String;
}

/// Join a base URL and an object key with exactly one slash
pub fn join_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key.trim_start_matches('/'))
}

#[derive(Clone, Debug)]
struct StoredObject {
    data: Bytes,
    content_type: String,
    last_modified: DateTime<Utc>,
}

pub struct MemoryStorage {
    objects: DashMap<String, StoredObject>,
    public_base: String,
}

impl MemoryStorage {
    pub fn new(public_base: impl Into<String>) -> Self {
        Self {
            objects: DashMap::new(),
            public_base: public_base.into(),
        }
    }

    /// Store an object with an explicit modification time
    pub fn put_at(&self, key: &str, data: Bytes, content_type: &str, last_modified: DateTime<Utc>) {
        self.objects.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
                last_modified,
            },
        );
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects.get(key).map(|o| o.content_type.clone())
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> AppResult<()> {
        self.put_at(key, data, content_type, Utc::now());
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Option<Bytes>> {
        Ok(self.objects.get(key).map(|o| o.data.clone()))
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.objects.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        Ok(self.objects.contains_key(key))
    }

    async fn list(&self, prefix: &str) -> AppResult<Vec<ObjectInfo>> {
        let mut objects: Vec<ObjectInfo> = self
            .objects
            .iter()
            .filter(|o| o.key().starts_with(prefix))
            .map(|o| ObjectInfo {
                key: o.key().clone(),
                size: o.data.len() as u64,
                last_modified: o.last_modified,
            })
            .collect();
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    fn public_url(&self, key: &str) -> String {
        join_url(&self.public_base, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://cdn/bucket/", "/uploads/a.jpg"), "http://cdn/bucket/uploads/a.jpg");
        assert_eq!(join_url("http://cdn/bucket", "uploads/a.jpg"), "http://cdn/bucket/uploads/a.jpg");
    }

    #[tokio::test]
    async fn test_memory_storage_round_trip() {
        let storage = MemoryStorage::new("http://assets");
        storage
            .put("uploads/u/a.png", Bytes::from_static(b"png"), "image/png")
            .await
            .unwrap();
        storage
            .put("other/b.png", Bytes::from_static(b"x"), "image/png")
            .await
            .unwrap();

        assert!(storage.exists("uploads/u/a.png").await.unwrap());
        assert_eq!(storage.get("uploads/u/a.png").await.unwrap().unwrap(), Bytes::from_static(b"png"));
        assert_eq!(storage.content_type("uploads/u/a.png").as_deref(), Some("image/png"));

        let listed = storage.list("uploads/").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].size, 3);

        storage.delete("uploads/u/a.png").await.unwrap();
        storage.delete("uploads/u/a.png").await.unwrap();
        assert!(storage.get("uploads/u/a.png").await.unwrap().is_none());
        assert_eq!(storage.public_url("x/y.jpg"), "http://assets/x/y.jpg");
    }
}
