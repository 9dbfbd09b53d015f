//! Chat rooms and message history over REST

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::{created, ok, ApiResult, ApiStatusResult, AppState};
use crate::api::extract::{ApiJson, ApiPath, ApiQuery, AuthUser};
use crate::api::types::{ApiResponse, CreateChatRoomRequest, MessagesParams, SendMessageRequest};
use crate::core::chat::{post_message, room_for_participant};
use crate::models::{AppError, ChatMessage, ChatRoom, ErrorCode};
use crate::utils::constants::{DEFAULT_MESSAGE_PAGE, MAX_MESSAGE_PAGE};

/// Returns the existing room for (listing, caller) with 200, or a new one with 201
pub async fn create_room(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiJson(req): ApiJson<CreateChatRoomRequest>,
) -> ApiStatusResult<ChatRoom> {
    let listing = state
        .store
        .find_listing(req.listing_id)
        .await?
        .ok_or_else(|| AppError::not_found("Listing"))?;

    if listing.seller_id == auth.id() {
        return Err(AppError::bad_request("You cannot open a chat on your own listing"));
    }

    if let Some(room) = state.store.find_chatroom_for(listing.id, auth.id()).await? {
        return Ok((StatusCode::OK, Json(ApiResponse::success(room))));
    }

    let room = ChatRoom {
        id: Uuid::new_v4(),
        listing_id: listing.id,
        buyer_id: auth.id(),
        seller_id: listing.seller_id,
        created_at: Utc::now(),
        last_message_at: None,
    };

    match state.store.insert_chatroom(room).await {
        Ok(room) => {
            info!(room = %room.id, listing = %room.listing_id, "💬 Chat room opened");
            created(room)
        }
        // Lost a race with a concurrent create
        Err(e) if e.code == ErrorCode::ApiConflict => {
            let room = state
                .store
                .find_chatroom_for(listing.id, auth.id())
                .await?
                .ok_or(e)?;
            Ok((StatusCode::OK, Json(ApiResponse::success(room))))
        }
        Err(e) => Err(e),
    }
}

/// Most recent activity first
pub async fn list_rooms(State(state): State<Arc<AppState>>, auth: AuthUser) -> ApiResult<Vec<ChatRoom>> {
    ok(state.store.chatrooms_for_user(auth.id()).await?)
}

pub async fn get_room(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<ChatRoom> {
    ok(room_for_participant(state.store.as_ref(), id, auth.id()).await?)
}

/// Latest page before the cursor, oldest first
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(params): ApiQuery<MessagesParams>,
) -> ApiResult<Vec<ChatMessage>> {
    room_for_participant(state.store.as_ref(), id, auth.id()).await?;

    let limit = params.limit.unwrap_or(DEFAULT_MESSAGE_PAGE).clamp(1, MAX_MESSAGE_PAGE);
    ok(state.store.messages(id, params.before, limit).await?)
}

pub async fn send_message(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<SendMessageRequest>,
) -> ApiStatusResult<ChatMessage> {
    let message = post_message(
        state.store.as_ref(),
        &state.hub,
        id,
        auth.id(),
        &req.content,
        Utc::now(),
    )
    .await?;

    created(message)
}
