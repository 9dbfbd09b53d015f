//! Listing search abstraction
//!
//! `DatabaseSearch` lets the store rank results (pg_trgm or its in-memory
//! twin); `MeiliSearch` keeps an external index in sync.

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use super::store::Store;
use crate::models::{AppResult, Listing, ListingQuery, SearchHits};

#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Backend name for health output
    fn name(&self) -> &'static str;

    /// Insert or replace the listing's document
    async fn index_listing(&self, listing: &Listing) -> AppResult<()>;
    async fn remove_listing(&self, id: Uuid) -> AppResult<()>;
    async fn search(&self, query: &ListingQuery) -> AppResult<SearchHits>;
}

/// Search answered by the store itself; indexing is a no-op
pub struct DatabaseSearch {
    store: Arc<dyn Store>,
}

impl DatabaseSearch {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SearchIndex for DatabaseSearch {
    fn name(&self) -> &'static str {
        "database"
    }

    async fn index_listing(&self, _listing: &Listing) -> AppResult<()> {
        Ok(())
    }

    async fn remove_listing(&self, _id: Uuid) -> AppResult<()> {
        Ok(())
    }

    async fn search(&self, query: &ListingQuery) -> AppResult<SearchHits> {
        self.store.search_listings(query).await
    }
}
