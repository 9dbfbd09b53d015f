//! Chat operations shared by the REST handlers and the WebSocket session

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::chat_hub::ChatHub;
use super::validation::required_text;
use crate::models::{AppError, AppResult, ChatMessage, ChatRoom};
use crate::providers::Store;
use crate::utils::constants::MESSAGE_MAX_LEN;

/// Load a room the user takes part in
pub async fn room_for_participant(store: &dyn Store, room_id: Uuid, user_id: Uuid) -> AppResult<ChatRoom> {
    let room = store
        .find_chatroom(room_id)
        .await?
        .ok_or_else(|| AppError::not_found("Chat room"))?;

    if !room.is_participant(user_id) {
        return Err(AppError::forbidden("You are not a participant of this chat room"));
    }
    Ok(room)
}

/// Validate, persist and fan out a message
pub async fn post_message(
    store: &dyn Store,
    hub: &ChatHub,
    room_id: Uuid,
    sender_id: Uuid,
    content: &str,
    now: DateTime<Utc>,
) -> AppResult<ChatMessage> {
    let content = required_text("Message", content, MESSAGE_MAX_LEN)?;
    room_for_participant(store, room_id, sender_id).await?;

    let message = store
        .insert_message(ChatMessage {
            id: Uuid::new_v4(),
            chatroom_id: room_id,
            sender_id,
            content,
            sent_at: now,
        })
        .await?;

    hub.publish(&message);
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Condition, ErrorCode, Listing, ListingStatus, NewUser, User};
    use crate::providers::MemoryStore;

    async fn user(store: &MemoryStore, name: &str) -> User {
        store
            .create_user(User::new(
                NewUser {
                    email: format!("{}@example.com", name),
                    username: name.to_string(),
                    password_hash: "x".to_string(),
                    display_name: None,
                },
                Utc::now(),
            ))
            .await
            .unwrap()
    }

    async fn room(store: &MemoryStore, buyer: &User, seller: &User) -> ChatRoom {
        let now = Utc::now();
        let listing = store
            .insert_listing(Listing {
                id: Uuid::new_v4(),
                seller_id: seller.id,
                title: "Linen shirt".to_string(),
                description: String::new(),
                price_cents: 1500,
                category: "shirts".to_string(),
                size: "S".to_string(),
                condition: Condition::New,
                brand: None,
                image_keys: vec![],
                status: ListingStatus::Available,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();

        store
            .insert_chatroom(ChatRoom {
                id: Uuid::new_v4(),
                listing_id: listing.id,
                buyer_id: buyer.id,
                seller_id: seller.id,
                created_at: now,
                last_message_at: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_post_message_persists_and_publishes() {
        let store = MemoryStore::new();
        let hub = ChatHub::new();
        let buyer = user(&store, "buyer").await;
        let seller = user(&store, "seller").await;
        let room = room(&store, &buyer, &seller).await;
        let mut live = hub.subscribe(room.id);

        let message = post_message(&store, &hub, room.id, buyer.id, "  still available?  ", Utc::now())
            .await
            .unwrap();

        assert_eq!(message.content, "still available?");
        assert_eq!(live.recv().await.unwrap(), message);
        let stored = store.find_chatroom(room.id).await.unwrap().unwrap();
        assert_eq!(stored.last_message_at, Some(message.sent_at));
    }

    #[tokio::test]
    async fn test_post_message_rules() {
        let store = MemoryStore::new();
        let hub = ChatHub::new();
        let buyer = user(&store, "buyer").await;
        let seller = user(&store, "seller").await;
        let stranger = user(&store, "stranger").await;
        let room = room(&store, &buyer, &seller).await;

        let err = post_message(&store, &hub, room.id, buyer.id, "   ", Utc::now()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);

        let long = "a".repeat(MESSAGE_MAX_LEN + 1);
        let err = post_message(&store, &hub, room.id, buyer.id, &long, Utc::now()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);

        let err = post_message(&store, &hub, room.id, stranger.id, "hi", Utc::now()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ApiForbidden);

        let err = post_message(&store, &hub, Uuid::new_v4(), buyer.id, "hi", Utc::now()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ApiNotFound);
    }
}
