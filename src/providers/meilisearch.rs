//! # Meilisearch
//!
//! Optional search engine for listings. The store stays the source of truth;
//! every listing write is mirrored into the `listings` index and searches
//! only return ids, which the API resolves through the store.
//!
//! ## Schema
//! - Index `listings`, primary key `id`
//! - Searchable: title, brand, category, description
//! - Filterable: category, size, condition, price_cents, status, seller_id
//! - Sortable: price_cents, created_at (unix seconds)

use async_trait::async_trait;
use meilisearch_sdk::{client::Client, settings::Settings};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::search::SearchIndex;
use super::store::Store;
use crate::models::{AppError, AppResult, Listing, ListingQuery, ListingSort, SearchHits};
use crate::utils::constants::{MAX_PAGE_SIZE, MEILI_LISTING_INDEX};

pub const LISTING_ID: &str = "id";

/// Document stored in the index
#[derive(Debug, Serialize, Deserialize)]
pub struct MeiliListing {
    pub id: String,
    pub title: String,
    pub description: String,
    pub brand: Option<String>,
    pub category: String,
    pub size: String,
    pub condition: String,
    pub price_cents: i64,
    pub status: String,
    pub seller_id: String,
    pub created_at: i64,
}

impl From<&Listing> for MeiliListing {
    fn from(listing: &Listing) -> Self {
        Self {
            id: listing.id.to_string(),
            title: listing.title.clone(),
            description: listing.description.clone(),
            brand: listing.brand.clone(),
            category: listing.category.clone(),
            size: listing.size.to_lowercase(),
            condition: listing.condition.as_str().to_string(),
            price_cents: listing.price_cents,
            status: listing.status.as_str().to_string(),
            seller_id: listing.seller_id.to_string(),
            created_at: listing.created_at.timestamp(),
        }
    }
}

/// Only the id is read back from hits
#[derive(Debug, Deserialize)]
struct MeiliHit {
    id: String,
}

pub struct MeiliSearch {
    client: Arc<Client>,
}

impl MeiliSearch {
    /// Connect and apply index settings
    pub async fn connect(url: &str, api_key: Option<&str>) -> AppResult<Self> {
        let client = Arc::new(Client::new(url, api_key)?);

        client
            .index(MEILI_LISTING_INDEX)
            .set_settings(&init_settings())
            .await?
            .wait_for_completion(&client, None, None)
            .await?;

        info!("🔎 Meilisearch index '{}' ready at {}", MEILI_LISTING_INDEX, url);
        Ok(Self { client })
    }

    /// Push every listing from the store into the index
    pub async fn reindex(&self, store: &dyn Store) -> AppResult<usize> {
        let mut query = ListingQuery {
            status: None,
            limit: MAX_PAGE_SIZE,
            ..ListingQuery::default()
        };
        let mut indexed = 0;

        loop {
            let hits = store.search_listings(&query).await?;
            if hits.ids.is_empty() {
                break;
            }

            let listings = store.find_listings(&hits.ids).await?;
            let docs: Vec<MeiliListing> = listings.iter().map(MeiliListing::from).collect();
            self.client
                .index(MEILI_LISTING_INDEX)
                .add_or_update(&docs, Some(LISTING_ID))
                .await?;

            indexed += docs.len();
            query.offset += query.limit;
            if u64::from(query.offset) >= hits.total {
                break;
            }
        }

        info!("🔎 Reindexed {} listings", indexed);
        Ok(indexed)
    }
}

fn init_settings() -> Settings {
    Settings::new()
        .with_ranking_rules([
            "words",
            "typo",
            "proximity",
            "attribute",
            "sort",
            "exactness",
        ])
        .with_searchable_attributes(["title", "brand", "category", "description"])
        .with_filterable_attributes([
            "category",
            "size",
            "condition",
            "price_cents",
            "status",
            "seller_id",
        ])
        .with_sortable_attributes(["price_cents", "created_at"])
}

/// Quote a string value for a Meilisearch filter expression
fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Render structured filters into Meilisearch filter syntax
pub fn build_filter(query: &ListingQuery) -> Option<String> {
    let mut clauses = Vec::new();

    if let Some(category) = &query.category {
        clauses.push(format!("category = {}", quote(category)));
    }
    // Sizes are indexed lowercased so the filter matches case-insensitively
    if let Some(size) = &query.size {
        clauses.push(format!("size = {}", quote(&size.to_lowercase())));
    }
    if let Some(condition) = query.condition {
        clauses.push(format!("condition = {}", quote(condition.as_str())));
    }
    if let Some(min) = query.min_price {
        clauses.push(format!("price_cents >= {}", min));
    }
    if let Some(max) = query.max_price {
        clauses.push(format!("price_cents <= {}", max));
    }
    if let Some(seller) = query.seller_id {
        clauses.push(format!("seller_id = {}", quote(&seller.to_string())));
    }
    if let Some(status) = query.status {
        clauses.push(format!("status = {}", quote(status.as_str())));
    }

    if clauses.is_empty() {
        None
    } else {
        Some(clauses.join(" AND "))
    }
}

/// Sort rule for a listing sort; relevance uses Meilisearch's own ranking
pub fn sort_rule(sort: ListingSort) -> Option<&'static str> {
    match sort {
        ListingSort::Relevance => None,
        ListingSort::Newest => Some("created_at:desc"),
        ListingSort::PriceAsc => Some("price_cents:asc"),
        ListingSort::PriceDesc => Some("price_cents:desc"),
    }
}

#[async_trait]
impl SearchIndex for MeiliSearch {
    fn name(&self) -> &'static str {
        "meilisearch"
    }

    async fn index_listing(&self, listing: &Listing) -> AppResult<()> {
        self.client
            .index(MEILI_LISTING_INDEX)
            .add_or_update(&[MeiliListing::from(listing)], Some(LISTING_ID))
            .await?;
        Ok(())
    }

    async fn remove_listing(&self, id: Uuid) -> AppResult<()> {
        self.client
            .index(MEILI_LISTING_INDEX)
            .delete_document(id.to_string())
            .await?;
        Ok(())
    }

    async fn search(&self, query: &ListingQuery) -> AppResult<SearchHits> {
        let index = self.client.index(MEILI_LISTING_INDEX);
        let filter = build_filter(query);
        let sort: Vec<&str> = sort_rule(query.sort).into_iter().collect();

        let mut search = index.search();
        search
            .with_offset(query.offset as usize)
            .with_limit(query.limit as usize);
        if let Some(text) = &query.text {
            search.with_query(text);
        }
        if let Some(filter) = &filter {
            search.with_filter(filter);
        }
        if !sort.is_empty() {
            search.with_sort(&sort);
        }

        let results = search.execute::<MeiliHit>().await?;

        let ids = results
            .hits
            .into_iter()
            .map(|hit| {
                Uuid::parse_str(&hit.result.id)
                    .map_err(|_| AppError::search(format!("Malformed document id '{}'", hit.result.id)))
            })
            .collect::<AppResult<Vec<Uuid>>>()?;

        let total = results
            .estimated_total_hits
            .or(results.total_hits)
            .unwrap_or(ids.len()) as u64;

        Ok(SearchHits { ids, total })
    }
}
