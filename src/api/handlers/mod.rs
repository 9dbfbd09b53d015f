//! API Request Handlers

use axum::{extract::State, http::StatusCode, Json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use super::middleware::{RateLimitConfig, RateLimiter};
use super::types::*;
use crate::core::{ChatHub, TokenService};
use crate::models::{AppConfig, AppResult, Listing, SearchBackend};
use crate::utils::constants::APP_VERSION;
use crate::providers::{
    DatabaseSearch, MeiliSearch, MemoryStorage, MemoryStore, ObjectStorage, PgStore, S3Storage,
    SearchIndex, Store, TryOnClient,
};

pub mod auth;
pub mod chat;
pub mod images;
pub mod listings;
pub mod tryon;
pub mod users;
pub mod wishlist;

/// JSON envelope with status 200
pub type ApiResult<T> = AppResult<Json<ApiResponse<T>>>;

/// JSON envelope with an explicit status
pub type ApiStatusResult<T> = AppResult<(StatusCode, Json<ApiResponse<T>>)>;

pub fn ok<T: serde::Serialize>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::success(data)))
}

pub fn created<T: serde::Serialize>(data: T) -> ApiStatusResult<T> {
    Ok((StatusCode::CREATED, Json(ApiResponse::success(data))))
}

/// Shared application state
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn Store>,
    pub search: Arc<dyn SearchIndex>,
    pub storage: Arc<dyn ObjectStorage>,
    pub tokens: TokenService,
    pub hub: ChatHub,
    /// `None` when no try-on upstream is configured
    pub tryon: Option<TryOnClient>,
    /// Per-user try-on quota
    pub tryon_limiter: RateLimiter,
    /// Per-client request quota
    pub rate_limiter: RateLimiter,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn Store>,
        search: Arc<dyn SearchIndex>,
        storage: Arc<dyn ObjectStorage>,
        tryon: Option<TryOnClient>,
    ) -> Self {
        Self {
            tokens: TokenService::from_config(&config),
            hub: ChatHub::new(),
            tryon_limiter: RateLimiter::new(RateLimitConfig::per_hour(config.tryon_requests_per_hour)),
            rate_limiter: RateLimiter::new(RateLimitConfig::per_minute(config.rate_limit_per_minute)),
            start_time: Instant::now(),
            config,
            store,
            search,
            storage,
            tryon,
        }
    }

    /// Connect every backend selected by the configuration
    pub async fn from_config(config: AppConfig) -> AppResult<Self> {
        let store: Arc<dyn Store> = match &config.database_url {
            Some(url) => Arc::new(PgStore::connect(url, config.database_max_connections).await?),
            None => {
                warn!("⚠️  DATABASE_URL not set, using the in-memory store (data is lost on restart)");
                Arc::new(MemoryStore::new())
            }
        };

        let search: Arc<dyn SearchIndex> = match config.search_backend {
            SearchBackend::Database => Arc::new(DatabaseSearch::new(store.clone())),
            SearchBackend::Meilisearch => {
                let meili = MeiliSearch::connect(&config.meili_url, config.meili_api_key.as_deref()).await?;
                meili.reindex(store.as_ref()).await?;
                Arc::new(meili)
            }
        };

        let storage: Arc<dyn ObjectStorage> = match &config.s3 {
            Some(s3) => Arc::new(S3Storage::new(s3, &config.public_asset_url)?),
            None => {
                warn!("⚠️  S3_ENDPOINT not set, using in-memory object storage");
                Arc::new(MemoryStorage::new(config.public_asset_url.clone()))
            }
        };

        let tryon = config.tryon.as_ref().map(TryOnClient::new).transpose()?;

        info!(
            store = store.name(),
            search = search.name(),
            storage = storage.name(),
            tryon = tryon.is_some(),
            "Backends ready"
        );

        Ok(Self::new(config, store, search, storage, tryon))
    }

    /// Every backend in memory; try-on still follows the configuration
    pub fn in_memory(config: AppConfig) -> AppResult<Self> {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let search = Arc::new(DatabaseSearch::new(store.clone()));
        let storage = Arc::new(MemoryStorage::new(config.public_asset_url.clone()));
        let tryon = config.tryon.as_ref().map(TryOnClient::new).transpose()?;

        Ok(Self::new(config, store, search, storage, tryon))
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

// ============================================
// Shared helpers
// ============================================

/// Listings with image URLs and seller profiles, order preserved
pub async fn listing_responses(state: &AppState, listings: Vec<Listing>) -> AppResult<Vec<ListingResponse>> {
    let mut sellers: HashMap<Uuid, Option<PublicProfile>> = HashMap::new();
    let mut responses = Vec::with_capacity(listings.len());

    for listing in listings {
        if !sellers.contains_key(&listing.seller_id) {
            let profile = state
                .store
                .find_user(listing.seller_id)
                .await?
                .map(|u| PublicProfile::new(&u, state.storage.as_ref()));
            sellers.insert(listing.seller_id, profile);
        }
        let seller = sellers.get(&listing.seller_id).cloned().flatten();
        responses.push(ListingResponse::new(listing, seller, state.storage.as_ref()));
    }

    Ok(responses)
}

pub async fn listing_response(state: &AppState, listing: Listing) -> AppResult<ListingResponse> {
    let seller = state
        .store
        .find_user(listing.seller_id)
        .await?
        .map(|u| PublicProfile::new(&u, state.storage.as_ref()));
    Ok(ListingResponse::new(listing, seller, state.storage.as_ref()))
}

/// Mirror a listing write into the search backend; the store stays authoritative
pub async fn sync_search(state: &AppState, listing: &Listing) {
    if let Err(e) = state.search.index_listing(listing).await {
        warn!(listing = %listing.id, "Search index update failed: {}", e);
    }
}

pub async fn unsync_search(state: &AppState, listing_id: Uuid) {
    if let Err(e) = state.search.remove_listing(listing_id).await {
        warn!(listing = %listing_id, "Search index removal failed: {}", e);
    }
}

// ============================================
// Health Check
// ============================================

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<ApiResponse<HealthData>> {
    let data = HealthData {
        status: "healthy".to_string(),
        version: APP_VERSION.to_string(),
        uptime_seconds: state.uptime_seconds(),
        store: state.store.name(),
        search: state.search.name(),
        storage: state.storage.name(),
    };

    Json(ApiResponse::success(data))
}
