//! Orphaned upload sweeper
//!
//! Uploads land in object storage before any listing or avatar points at
//! them. Anything under `uploads/` that nothing references once the grace
//! period has passed is deleted. Best effort: failed deletes are logged and
//! retried on the next sweep.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::models::{AppError, AppResult};
use crate::providers::{ObjectStorage, Store};
use crate::utils::constants::UPLOAD_PREFIX;

/// Outcome of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub scanned: usize,
    pub deleted: usize,
    pub failed: usize,
}

/// Delete unreferenced uploads older than `grace`
pub async fn sweep_orphans(
    store: &dyn Store,
    storage: &dyn ObjectStorage,
    grace: Duration,
    now: DateTime<Utc>,
) -> AppResult<CleanupReport> {
    let objects = storage.list(UPLOAD_PREFIX).await?;
    let referenced = store.referenced_object_keys().await?;
    let cutoff = ChronoDuration::from_std(grace)
        .ok()
        .and_then(|grace| now.checked_sub_signed(grace))
        .ok_or_else(|| AppError::internal(format!("Orphan grace of {}s is out of range", grace.as_secs())))?;

    let mut report = CleanupReport {
        scanned: objects.len(),
        ..CleanupReport::default()
    };

    for object in objects {
        if referenced.contains(&object.key) || object.last_modified > cutoff {
            continue;
        }

        match storage.delete(&object.key).await {
            Ok(()) => {
                debug!(key = %object.key, size = object.size, "Orphaned upload deleted");
                report.deleted += 1;
            }
            Err(e) => {
                warn!(key = %object.key, "Failed to delete orphaned upload: {}", e);
                report.failed += 1;
            }
        }
    }

    Ok(report)
}

/// Run `sweep_orphans` every `interval`; `None` when the interval is zero
pub fn spawn_cleanup_task(
    store: Arc<dyn Store>,
    storage: Arc<dyn ObjectStorage>,
    interval: Duration,
    grace: Duration,
) -> Option<JoinHandle<()>> {
    if interval.is_zero() {
        info!("🧹 Orphan cleanup disabled");
        return None;
    }

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick completes immediately; skip it so startup stays quiet
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match sweep_orphans(store.as_ref(), storage.as_ref(), grace, Utc::now()).await {
                Ok(report) if report.deleted > 0 || report.failed > 0 => {
                    info!(
                        scanned = report.scanned,
                        deleted = report.deleted,
                        failed = report.failed,
                        "🧹 Orphan cleanup finished"
                    );
                }
                Ok(report) => debug!(scanned = report.scanned, "🧹 No orphaned uploads"),
                Err(e) => error!("Orphan cleanup failed: {}", e),
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Condition, Listing, ListingStatus, NewUser, User};
    use crate::providers::{MemoryStorage, MemoryStore};
    use bytes::Bytes;
    use uuid::Uuid;

    const DAY: Duration = Duration::from_secs(86_400);

    async fn seller(store: &MemoryStore) -> User {
        let user = User::new(
            NewUser {
                email: "seller@example.com".to_string(),
                username: "seller".to_string(),
                password_hash: "x".to_string(),
                display_name: None,
            },
            Utc::now(),
        );
        store.create_user(user).await.unwrap()
    }

    fn listing(seller_id: Uuid, keys: Vec<String>) -> Listing {
        let now = Utc::now();
        Listing {
            id: Uuid::new_v4(),
            seller_id,
            title: "Wool coat".to_string(),
            description: String::new(),
            price_cents: 5000,
            category: "coats".to_string(),
            size: "L".to_string(),
            condition: Condition::Good,
            brand: None,
            image_keys: keys,
            status: ListingStatus::Available,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_sweep_respects_references_and_grace() {
        let store = MemoryStore::new();
        let storage = MemoryStorage::new("http://assets");
        let user = seller(&store).await;
        let now = Utc::now();
        let old = now - ChronoDuration::days(2);
        let prefix = format!("uploads/{}/", user.id);

        let used = format!("{}used.jpg", prefix);
        let avatar = format!("{}avatar.png", prefix);
        let stale = format!("{}stale.jpg", prefix);
        let fresh = format!("{}fresh.jpg", prefix);

        for key in [&used, &avatar, &stale] {
            storage.put_at(key, Bytes::from_static(b"img"), "image/jpeg", old);
        }
        storage.put_at(&fresh, Bytes::from_static(b"img"), "image/jpeg", now);
        storage.put_at("static/logo.png", Bytes::from_static(b"img"), "image/png", old);

        store.insert_listing(listing(user.id, vec![used.clone()])).await.unwrap();
        let mut with_avatar = user.clone();
        with_avatar.avatar_key = Some(avatar.clone());
        store.update_user(&with_avatar).await.unwrap();

        let report = sweep_orphans(&store, &storage, DAY, now).await.unwrap();

        assert_eq!(report, CleanupReport { scanned: 4, deleted: 1, failed: 0 });
        assert!(!storage.exists(&stale).await.unwrap());
        assert!(storage.exists(&used).await.unwrap());
        assert!(storage.exists(&avatar).await.unwrap());
        assert!(storage.exists(&fresh).await.unwrap());
        assert!(storage.exists("static/logo.png").await.unwrap());
    }

    #[tokio::test]
    async fn test_sweep_on_empty_storage() {
        let store = MemoryStore::new();
        let storage = MemoryStorage::new("http://assets");
        let report = sweep_orphans(&store, &storage, DAY, Utc::now()).await.unwrap();
        assert_eq!(report, CleanupReport::default());
    }

    /// Memory storage whose deletes fail for keys containing "locked"
    struct FlakyStorage(MemoryStorage);

    #[async_trait::async_trait]
    impl ObjectStorage for FlakyStorage {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn put(&self, key: &str, data: Bytes, content_type: &str) -> AppResult<()> {
            self.0.put(key, data, content_type).await
        }

        async fn get(&self, key: &str) -> AppResult<Option<Bytes>> {
            self.0.get(key).await
        }

        async fn delete(&self, key: &str) -> AppResult<()> {
            if key.contains("locked") {
                return Err(AppError::new(crate::models::ErrorCode::StorageError, "access denied"));
            }
            self.0.delete(key).await
        }

        async fn exists(&self, key: &str) -> AppResult<bool> {
            self.0.exists(key).await
        }

        async fn list(&self, prefix: &str) -> AppResult<Vec<crate::models::ObjectInfo>> {
            self.0.list(prefix).await
        }

        fn public_url(&self, key: &str) -> String {
            self.0.public_url(key)
        }
    }

    #[tokio::test]
    async fn test_failed_delete_is_counted_and_sweep_continues() {
        let store = MemoryStore::new();
        let storage = FlakyStorage(MemoryStorage::new("http://assets"));
        let old = Utc::now() - ChronoDuration::days(2);

        // Sorted listing puts the failing key first
        storage.0.put_at("uploads/u/a-locked.jpg", Bytes::from_static(b"img"), "image/jpeg", old);
        storage.0.put_at("uploads/u/b-stale.jpg", Bytes::from_static(b"img"), "image/jpeg", old);

        let report = sweep_orphans(&store, &storage, DAY, Utc::now()).await.unwrap();

        assert_eq!(report, CleanupReport { scanned: 2, deleted: 1, failed: 1 });
        assert!(storage.exists("uploads/u/a-locked.jpg").await.unwrap());
        assert!(!storage.exists("uploads/u/b-stale.jpg").await.unwrap());
    }

    #[tokio::test]
    async fn test_out_of_range_grace_is_an_error() {
        let store = MemoryStore::new();
        let storage = MemoryStorage::new("http://assets");
        let grace = Duration::from_secs(u64::MAX / 2);
        assert!(sweep_orphans(&store, &storage, grace, Utc::now()).await.is_err());
    }

    #[test]
    fn test_zero_interval_disables_task() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let storage: Arc<dyn ObjectStorage> = Arc::new(MemoryStorage::new("http://assets"));
        assert!(spawn_cleanup_task(store, storage, Duration::ZERO, DAY).is_none());
    }
}
