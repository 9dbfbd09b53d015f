//! Wishlist

use axum::{extract::State, http::StatusCode};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::{listing_responses, ok, ApiResult, AppState};
use crate::api::extract::{ApiPath, AuthUser};
use crate::api::types::WishlistItemResponse;
use crate::models::{AppError, AppResult, WishlistEntry};

/// Newest first; listings deleted meanwhile are skipped
pub async fn get_wishlist(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> ApiResult<Vec<WishlistItemResponse>> {
    let entries = state.store.wishlist(auth.id()).await?;
    let added: HashMap<Uuid, _> = entries.iter().map(|e| (e.listing_id, e.added_at)).collect();
    let ids: Vec<Uuid> = entries.iter().map(|e| e.listing_id).collect();

    let listings = state.store.find_listings(&ids).await?;
    let items = listing_responses(&state, listings)
        .await?
        .into_iter()
        .filter_map(|listing| {
            added
                .get(&listing.id)
                .map(|&added_at| WishlistItemResponse { listing, added_at })
        })
        .collect();

    ok(items)
}

/// Idempotent; the first `added_at` is kept
pub async fn add_to_wishlist(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(listing_id): ApiPath<Uuid>,
) -> AppResult<StatusCode> {
    let listing = state
        .store
        .find_listing(listing_id)
        .await?
        .ok_or_else(|| AppError::not_found("Listing"))?;

    if listing.seller_id == auth.id() {
        return Err(AppError::bad_request("You cannot wishlist your own listing"));
    }

    state
        .store
        .add_wishlist(WishlistEntry {
            user_id: auth.id(),
            listing_id,
            added_at: Utc::now(),
        })
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_from_wishlist(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(listing_id): ApiPath<Uuid>,
) -> AppResult<StatusCode> {
    if !state.store.remove_wishlist(auth.id(), listing_id).await? {
        return Err(AppError::not_found("Wishlist entry"));
    }
    Ok(StatusCode::NO_CONTENT)
}
