//! Registration, login and refresh token rotation

use axum::{extract::State, http::StatusCode};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use super::{created, ok, ApiResult, ApiStatusResult, AppState};
use crate::api::extract::ApiJson;
use crate::api::types::{AuthResponse, LoginRequest, RefreshRequest, RegisterRequest, UserResponse};
use crate::core::auth::{hash_password, hash_refresh_token, verify_password};
use crate::core::validation::{normalize_email, optional_text, validate_password, validate_username};
use crate::models::{AppError, AppResult, ErrorCode, NewUser, User};
use crate::utils::constants::DISPLAY_NAME_MAX_LEN;

/// Issue a token pair, persist the refresh half and build the response
async fn issue_tokens(state: &AppState, user: &User) -> AppResult<AuthResponse> {
    let issued = state.tokens.issue(user, Utc::now())?;
    state.store.insert_refresh_token(issued.refresh_record).await?;

    Ok(AuthResponse {
        user: UserResponse::new(user, state.storage.as_ref()),
        access_token: issued.access_token,
        refresh_token: issued.refresh_token,
        token_type: "Bearer",
        expires_in: issued.expires_in,
    })
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> ApiStatusResult<AuthResponse> {
    let email = normalize_email(&req.email)?;
    let username = validate_username(&req.username)?;
    validate_password(&req.password)?;
    let display_name = optional_text("Display name", req.display_name.as_deref(), DISPLAY_NAME_MAX_LEN)?;

    if state.store.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::conflict("Email is already registered"));
    }
    if state.store.find_user_by_username(&username).await?.is_some() {
        return Err(AppError::conflict("Username is already taken"));
    }

    let user = User::new(
        NewUser {
            email,
            username,
            password_hash: hash_password(&req.password)?,
            display_name,
        },
        Utc::now(),
    );
    let user = state.store.create_user(user).await?;
    info!(user = %user.id, "👤 User registered");

    created(issue_tokens(&state, &user).await?)
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<AuthResponse> {
    let login = req.login.trim();
    let user = if login.contains('@') {
        state.store.find_user_by_email(&login.to_lowercase()).await?
    } else {
        state.store.find_user_by_username(login).await?
    };

    let user = match user {
        Some(user) if verify_password(&req.password, &user.password_hash) => user,
        _ => return Err(AppError::invalid_credentials()),
    };

    ok(issue_tokens(&state, &user).await?)
}

/// Rotate a refresh token. Presenting a revoked token revokes the whole family.
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<RefreshRequest>,
) -> ApiResult<AuthResponse> {
    let now = Utc::now();
    let token_hash = hash_refresh_token(req.refresh_token.trim());

    let record = state
        .store
        .find_refresh_token(&token_hash)
        .await?
        .ok_or_else(AppError::invalid_token)?;

    if record.is_revoked() || !state.store.revoke_refresh_token(&token_hash, now).await? {
        let revoked = state.store.revoke_user_refresh_tokens(record.user_id, now).await?;
        warn!(user = %record.user_id, revoked, "Refresh token reuse detected");
        return Err(AppError::new(
            ErrorCode::AuthRefreshRevoked,
            "Refresh token was already used; please log in again",
        ));
    }

    if record.is_expired(now) {
        return Err(AppError::invalid_token());
    }

    let user = state
        .store
        .find_user(record.user_id)
        .await?
        .ok_or_else(AppError::invalid_token)?;

    ok(issue_tokens(&state, &user).await?)
}

/// Idempotent
pub async fn logout(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<RefreshRequest>,
) -> AppResult<StatusCode> {
    let token_hash = hash_refresh_token(req.refresh_token.trim());
    state.store.revoke_refresh_token(&token_hash, Utc::now()).await?;
    Ok(StatusCode::NO_CONTENT)
}
