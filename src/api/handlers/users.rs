//! Profiles and account management

use axum::{extract::State, http::StatusCode};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::{listing_responses, ok, unsync_search, ApiResult, AppState};
use crate::api::extract::{ApiJson, ApiPath, AuthUser};
use crate::api::types::{
    ChangePasswordRequest, ListingResponse, PublicProfile, UpdateProfileRequest, UserResponse,
};
use crate::core::auth::{hash_password, verify_password};
use crate::core::validation::{is_owned_upload, optional_text, validate_password};
use crate::models::{AppError, AppResult};
use crate::utils::constants::{
    user_upload_prefix, BIO_MAX_LEN, DISPLAY_NAME_MAX_LEN, LOCATION_MAX_LEN,
};

pub async fn me(State(state): State<Arc<AppState>>, auth: AuthUser) -> ApiResult<UserResponse> {
    ok(UserResponse::new(&auth.user, state.storage.as_ref()))
}

pub async fn update_me(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> ApiResult<UserResponse> {
    let mut user = auth.user;

    if let Some(display_name) = req.display_name.as_deref() {
        user.display_name = optional_text("Display name", Some(display_name), DISPLAY_NAME_MAX_LEN)?;
    }
    if let Some(bio) = req.bio.as_deref() {
        user.bio = optional_text("Bio", Some(bio), BIO_MAX_LEN)?;
    }
    if let Some(location) = req.location.as_deref() {
        user.location = optional_text("Location", Some(location), LOCATION_MAX_LEN)?;
    }
    if let Some(avatar_key) = req.avatar_key.as_deref().map(str::trim) {
        user.avatar_key = if avatar_key.is_empty() {
            None
        } else {
            Some(check_own_upload(&state, user.id, avatar_key).await?)
        };
    }

    user.updated_at = Utc::now();
    state.store.update_user(&user).await?;

    ok(UserResponse::new(&user, state.storage.as_ref()))
}

/// Key must be one of the user's uploads and present in storage
async fn check_own_upload(state: &AppState, user_id: Uuid, key: &str) -> AppResult<String> {
    if !is_owned_upload(&user_upload_prefix(&user_id), key) {
        return Err(AppError::validation("Avatar must be one of your uploads"));
    }
    if !state.storage.exists(key).await? {
        return Err(AppError::validation(format!("Image '{}' was not uploaded", key)));
    }
    Ok(key.to_string())
}

/// Revokes every refresh token on success
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> AppResult<StatusCode> {
    if !verify_password(&req.current_password, &auth.user.password_hash) {
        return Err(AppError::invalid_credentials());
    }
    validate_password(&req.new_password)?;

    let now = Utc::now();
    let mut user = auth.user;
    user.password_hash = hash_password(&req.new_password)?;
    user.updated_at = now;
    state.store.update_user(&user).await?;

    let revoked = state.store.revoke_user_refresh_tokens(user.id, now).await?;
    info!(user = %user.id, revoked, "🔑 Password changed");

    Ok(StatusCode::NO_CONTENT)
}

/// Images left behind are reclaimed by the orphan sweeper
pub async fn delete_me(State(state): State<Arc<AppState>>, auth: AuthUser) -> AppResult<StatusCode> {
    let listings = state.store.listings_by_seller(auth.id()).await?;

    state.store.delete_user(auth.id()).await?;
    for listing in &listings {
        unsync_search(&state, listing.id).await;
    }

    info!(user = %auth.id(), listings = listings.len(), "👤 Account deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<PublicProfile> {
    let user = state
        .store
        .find_user(id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

    ok(PublicProfile::new(&user, state.storage.as_ref()))
}

/// Newest first
pub async fn user_listings(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Vec<ListingResponse>> {
    if state.store.find_user(id).await?.is_none() {
        return Err(AppError::not_found("User"));
    }

    let listings = state.store.listings_by_seller(id).await?;
    ok(listing_responses(&state, listings).await?)
}
