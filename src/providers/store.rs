//! Persistence abstraction
//!
//! The API only talks to `Store`. `PgStore` backs it with PostgreSQL,
//! `MemoryStore` with DashMaps for development and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use uuid::Uuid;

use crate::models::{
    AppResult, ChatMessage, ChatRoom, Listing, ListingQuery, RefreshTokenRecord, SearchHits,
    User, WishlistEntry,
};

#[async_trait]
pub trait Store: Send + Sync {
    /// Backend name for health output
    fn name(&self) -> &'static str;

    // ============================================
    // Users
    // ============================================

    /// Fails with `API_CONFLICT` when email or username (case-insensitive) is taken
    async fn create_user(&self, user: User) -> AppResult<User>;
    async fn find_user(&self, id: Uuid) -> AppResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>>;
    /// Case-insensitive
    async fn find_user_by_username(&self, username: &str) -> AppResult<Option<User>>;
    /// Overwrites profile fields and password hash
    async fn update_user(&self, user: &User) -> AppResult<()>;
    /// Removes the user with their listings, wishlist, chat rooms and tokens
    async fn delete_user(&self, id: Uuid) -> AppResult<bool>;

    // ============================================
    // Refresh tokens
    // ============================================

    async fn insert_refresh_token(&self, record: RefreshTokenRecord) -> AppResult<()>;
    async fn find_refresh_token(&self, token_hash: &str) -> AppResult<Option<RefreshTokenRecord>>;
    /// Marks one token revoked; returns false when it was unknown or already revoked
    async fn revoke_refresh_token(&self, token_hash: &str, at: DateTime<Utc>) -> AppResult<bool>;
    /// Revokes every live token of a user, returns how many
    async fn revoke_user_refresh_tokens(&self, user_id: Uuid, at: DateTime<Utc>) -> AppResult<u64>;

    // ============================================
    // Listings
    // ============================================

    async fn insert_listing(&self, listing: Listing) -> AppResult<Listing>;
    async fn find_listing(&self, id: Uuid) -> AppResult<Option<Listing>>;
    /// Listings for `ids`, in the same order, skipping unknown ids
    async fn find_listings(&self, ids: &[Uuid]) -> AppResult<Vec<Listing>>;
    async fn update_listing(&self, listing: &Listing) -> AppResult<()>;
    /// Removes the listing with its wishlist entries and chat rooms
    async fn delete_listing(&self, id: Uuid) -> AppResult<bool>;
    /// Newest first
    async fn listings_by_seller(&self, seller_id: Uuid) -> AppResult<Vec<Listing>>;
    /// Trigram search with filters, sorting and paging
    async fn search_listings(&self, query: &ListingQuery) -> AppResult<SearchHits>;

    /// Every object key referenced by a listing image or a user avatar
    async fn referenced_object_keys(&self) -> AppResult<HashSet<String>>;

    // ============================================
    // Wishlist
    // ============================================

    /// Returns false when the entry already existed (its `added_at` is kept)
    async fn add_wishlist(&self, entry: WishlistEntry) -> AppResult<bool>;
    async fn remove_wishlist(&self, user_id: Uuid, listing_id: Uuid) -> AppResult<bool>;
    /// Newest first
    async fn wishlist(&self, user_id: Uuid) -> AppResult<Vec<WishlistEntry>>;

    // ============================================
    // Chat
    // ============================================

    async fn find_chatroom_for(&self, listing_id: Uuid, buyer_id: Uuid) -> AppResult<Option<ChatRoom>>;
    /// Fails with `API_CONFLICT` when (listing, buyer) already has a room
    async fn insert_chatroom(&self, room: ChatRoom) -> AppResult<ChatRoom>;
    async fn find_chatroom(&self, id: Uuid) -> AppResult<Option<ChatRoom>>;
    /// Rooms where the user is buyer or seller, most recent activity first
    async fn chatrooms_for_user(&self, user_id: Uuid) -> AppResult<Vec<ChatRoom>>;
    /// Stores the message and bumps the room's `last_message_at`
    async fn insert_message(&self, message: ChatMessage) -> AppResult<ChatMessage>;
    /// Latest `limit` messages strictly before `before`, oldest first
    async fn messages(
        &self,
        chatroom_id: Uuid,
        before: Option<DateTime<Utc>>,
        limit: u32,
    ) -> AppResult<Vec<ChatMessage>>;
}
