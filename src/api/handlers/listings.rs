//! Listing CRUD and search

use axum::{extract::State, http::StatusCode};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    created, listing_response, listing_responses, ok, sync_search, unsync_search, ApiResult,
    ApiStatusResult, AppState,
};
use crate::api::extract::{ApiJson, ApiPath, ApiQuery, AuthUser};
use crate::api::types::{
    CreateListingRequest, ListingResponse, ListingSearchParams, Page, UpdateListingRequest,
};
use crate::core::validation::{optional_text, required_text, validate_image_keys, validate_price};
use crate::models::{
    AppError, AppResult, Listing, ListingQuery, ListingSort, ListingStatus,
};
use crate::utils::constants::{
    BRAND_MAX_LEN, CATEGORY_MAX_LEN, DEFAULT_PAGE_SIZE, DESCRIPTION_MAX_LEN, MAX_PAGE_SIZE,
    SIZE_MAX_LEN, TITLE_MAX_LEN,
};

/// Validate image keys and make sure each one was actually uploaded
async fn checked_image_keys(state: &AppState, owner: Uuid, keys: &[String]) -> AppResult<Vec<String>> {
    let keys = validate_image_keys(&owner, keys)?;
    for key in &keys {
        if !state.storage.exists(key).await? {
            return Err(AppError::validation(format!("Image '{}' was not uploaded", key)));
        }
    }
    Ok(keys)
}

fn description(raw: &str) -> AppResult<String> {
    Ok(optional_text("Description", Some(raw), DESCRIPTION_MAX_LEN)?.unwrap_or_default())
}

pub async fn create_listing(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiJson(req): ApiJson<CreateListingRequest>,
) -> ApiStatusResult<ListingResponse> {
    let now = Utc::now();
    let listing = Listing {
        id: Uuid::new_v4(),
        seller_id: auth.id(),
        title: required_text("Title", &req.title, TITLE_MAX_LEN)?,
        description: description(&req.description)?,
        price_cents: validate_price(req.price_cents)?,
        category: required_text("Category", &req.category, CATEGORY_MAX_LEN)?.to_lowercase(),
        size: required_text("Size", &req.size, SIZE_MAX_LEN)?,
        condition: req.condition,
        brand: optional_text("Brand", req.brand.as_deref(), BRAND_MAX_LEN)?,
        image_keys: checked_image_keys(&state, auth.id(), &req.image_keys).await?,
        status: ListingStatus::Available,
        created_at: now,
        updated_at: now,
    };

    let listing = state.store.insert_listing(listing).await?;
    sync_search(&state, &listing).await;
    info!(listing = %listing.id, seller = %listing.seller_id, "🏷️  Listing created");

    created(listing_response(&state, listing).await?)
}

pub async fn get_listing(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<ListingResponse> {
    let listing = find_listing(&state, id).await?;
    ok(listing_response(&state, listing).await?)
}

async fn find_listing(state: &AppState, id: Uuid) -> AppResult<Listing> {
    state
        .store
        .find_listing(id)
        .await?
        .ok_or_else(|| AppError::not_found("Listing"))
}

async fn find_own_listing(state: &AppState, id: Uuid, user_id: Uuid) -> AppResult<Listing> {
    let listing = find_listing(state, id).await?;
    if listing.seller_id != user_id {
        return Err(AppError::forbidden("Only the seller can change this listing"));
    }
    Ok(listing)
}

pub async fn update_listing(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateListingRequest>,
) -> ApiResult<ListingResponse> {
    let mut listing = find_own_listing(&state, id, auth.id()).await?;

    if let Some(title) = &req.title {
        listing.title = required_text("Title", title, TITLE_MAX_LEN)?;
    }
    if let Some(desc) = &req.description {
        listing.description = description(desc)?;
    }
    if let Some(price) = req.price_cents {
        listing.price_cents = validate_price(price)?;
    }
    if let Some(category) = &req.category {
        listing.category = required_text("Category", category, CATEGORY_MAX_LEN)?.to_lowercase();
    }
    if let Some(size) = &req.size {
        listing.size = required_text("Size", size, SIZE_MAX_LEN)?;
    }
    if let Some(condition) = req.condition {
        listing.condition = condition;
    }
    if let Some(brand) = req.brand.as_deref() {
        listing.brand = optional_text("Brand", Some(brand), BRAND_MAX_LEN)?;
    }
    if let Some(keys) = &req.image_keys {
        listing.image_keys = checked_image_keys(&state, auth.id(), keys).await?;
    }
    if let Some(status) = req.status {
        listing.status = status;
    }

    listing.updated_at = Utc::now();
    state.store.update_listing(&listing).await?;
    sync_search(&state, &listing).await;

    ok(listing_response(&state, listing).await?)
}

/// Images are deleted best effort; leftovers go to the orphan sweeper
pub async fn delete_listing(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> AppResult<StatusCode> {
    let listing = find_own_listing(&state, id, auth.id()).await?;

    state.store.delete_listing(listing.id).await?;
    unsync_search(&state, listing.id).await;

    let still_referenced = state.store.referenced_object_keys().await?;
    for key in listing.image_keys.iter().filter(|k| !still_referenced.contains(*k)) {
        if let Err(e) = state.storage.delete(key).await {
            debug!(key = %key, "Image delete deferred to sweeper: {}", e);
        }
    }

    info!(listing = %listing.id, "🏷️  Listing deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Turn query parameters into a normalized search, returning (query, page, page_size)
pub fn build_query(params: ListingSearchParams) -> AppResult<(ListingQuery, u32, u32)> {
    fn non_empty(value: Option<String>) -> Option<String> {
        value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }

    let text = non_empty(params.q);

    if let (Some(min), Some(max)) = (params.min_price, params.max_price) {
        if min > max {
            return Err(AppError::validation("min_price must not exceed max_price"));
        }
    }
    if params.min_price.map_or(false, |p| p < 0) || params.max_price.map_or(false, |p| p < 0) {
        return Err(AppError::validation("Prices must not be negative"));
    }

    let status = match non_empty(params.status).as_deref() {
        None | Some("available") => Some(ListingStatus::Available),
        Some("any") => None,
        Some(other) => Some(other.parse::<ListingStatus>().map_err(AppError::validation)?),
    };

    let sort = match (params.sort, &text) {
        (Some(ListingSort::Relevance), None) | (None, None) => ListingSort::Newest,
        (None, Some(_)) => ListingSort::Relevance,
        (Some(sort), _) => sort,
    };

    let page = params.page.unwrap_or(1);
    if page == 0 {
        return Err(AppError::validation("page starts at 1"));
    }
    let page_size = params.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
    if page_size == 0 {
        return Err(AppError::validation("page_size must be at least 1"));
    }
    let page_size = page_size.min(MAX_PAGE_SIZE);

    let query = ListingQuery {
        text,
        category: non_empty(params.category).map(|c| c.to_lowercase()),
        size: non_empty(params.size),
        condition: params.condition,
        min_price: params.min_price,
        max_price: params.max_price,
        seller_id: params.seller_id,
        status,
        sort,
        offset: (page - 1).saturating_mul(page_size),
        limit: page_size,
    };

    Ok((query, page, page_size))
}

pub async fn search_listings(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<ListingSearchParams>,
) -> ApiResult<Page<ListingResponse>> {
    let (query, page, page_size) = build_query(params)?;

    let hits = state.search.search(&query).await?;
    let listings = state.store.find_listings(&hits.ids).await?;

    ok(Page {
        items: listing_responses(&state, listings).await?,
        page,
        page_size,
        total: hits.total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Condition, ErrorCode};

    #[test]
    fn test_build_query_defaults() {
        let (query, page, page_size) = build_query(ListingSearchParams::default()).unwrap();
        assert_eq!(page, 1);
        assert_eq!(page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(query.status, Some(ListingStatus::Available));
        assert_eq!(query.sort, ListingSort::Newest);
        assert_eq!(query.offset, 0);
        assert!(query.text.is_none());
    }

    #[test]
    fn test_build_query_text_defaults_to_relevance() {
        let params = ListingSearchParams {
            q: Some("  denim ".to_string()),
            category: Some("Jackets".to_string()),
            condition: Some(Condition::Good),
            status: Some("any".to_string()),
            page: Some(3),
            page_size: Some(500),
            ..ListingSearchParams::default()
        };
        let (query, page, page_size) = build_query(params).unwrap();
        assert_eq!(query.text.as_deref(), Some("denim"));
        assert_eq!(query.category.as_deref(), Some("jackets"));
        assert_eq!(query.sort, ListingSort::Relevance);
        assert_eq!(query.status, None);
        assert_eq!(page, 3);
        assert_eq!(page_size, MAX_PAGE_SIZE);
        assert_eq!(query.offset, 2 * MAX_PAGE_SIZE);
    }

    #[test]
    fn test_build_query_rejects_bad_input() {
        let inverted = ListingSearchParams {
            min_price: Some(500),
            max_price: Some(100),
            ..ListingSearchParams::default()
        };
        assert_eq!(build_query(inverted).unwrap_err().code, ErrorCode::ValidationFailed);

        let bad_status = ListingSearchParams {
            status: Some("reserved".to_string()),
            ..ListingSearchParams::default()
        };
        assert_eq!(build_query(bad_status).unwrap_err().code, ErrorCode::ValidationFailed);

        let zero_page = ListingSearchParams { page: Some(0), ..ListingSearchParams::default() };
        assert!(build_query(zero_page).is_err());
    }

    #[test]
    fn test_relevance_without_text_falls_back_to_newest() {
        let params = ListingSearchParams {
            sort: Some(ListingSort::Relevance),
            ..ListingSearchParams::default()
        };
        assert_eq!(build_query(params).unwrap().0.sort, ListingSort::Newest);
    }
}
