//! PostgreSQL Store
//!
//! sqlx-backed implementation of `Store`. Schema lives in `migrations/` and is
//! applied at startup. Listing search uses pg_trgm: `title % q` plus
//! case-insensitive substring matches, ranked by `similarity(title, q)`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool, Postgres, QueryBuilder};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use super::store::Store;
use crate::models::{
    AppError, AppResult, ChatMessage, ChatRoom, Listing, ListingQuery, ListingSort,
    RefreshTokenRecord, SearchHits, User, WishlistEntry,
};

const LISTING_COLUMNS: &str = "id, seller_id, title, description, price_cents, category, size, \
     condition, brand, image_keys, status, created_at, updated_at";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect, then apply pending migrations
    pub async fn connect(database_url: &str, max_connections: u32) -> AppResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("🐘 PostgreSQL connected, migrations applied");

        Ok(Self { pool })
    }
}

// ============================================
// Row types
// ============================================

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    username: String,
    password_hash: String,
    display_name: Option<String>,
    bio: Option<String>,
    location: Option<String>,
    avatar_key: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            username: row.username,
            password_hash: row.password_hash,
            display_name: row.display_name,
            bio: row.bio,
            location: row.location,
            avatar_key: row.avatar_key,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct RefreshTokenRow {
    token_hash: String,
    user_id: Uuid,
    expires_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<RefreshTokenRow> for RefreshTokenRecord {
    fn from(row: RefreshTokenRow) -> Self {
        Self {
            token_hash: row.token_hash,
            user_id: row.user_id,
            expires_at: row.expires_at,
            revoked_at: row.revoked_at,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct ListingRow {
    id: Uuid,
    seller_id: Uuid,
    title: String,
    description: String,
    price_cents: i64,
    category: String,
    size: String,
    condition: String,
    brand: Option<String>,
    image_keys: Vec<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ListingRow> for Listing {
    type Error = AppError;

    fn try_from(row: ListingRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            seller_id: row.seller_id,
            title: row.title,
            description: row.description,
            price_cents: row.price_cents,
            category: row.category,
            size: row.size,
            condition: row.condition.parse().map_err(AppError::internal)?,
            brand: row.brand,
            image_keys: row.image_keys,
            status: row.status.parse().map_err(AppError::internal)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct WishlistRow {
    user_id: Uuid,
    listing_id: Uuid,
    added_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct ChatRoomRow {
    id: Uuid,
    listing_id: Uuid,
    buyer_id: Uuid,
    seller_id: Uuid,
    created_at: DateTime<Utc>,
    last_message_at: Option<DateTime<Utc>>,
}

impl From<ChatRoomRow> for ChatRoom {
    fn from(row: ChatRoomRow) -> Self {
        Self {
            id: row.id,
            listing_id: row.listing_id,
            buyer_id: row.buyer_id,
            seller_id: row.seller_id,
            created_at: row.created_at,
            last_message_at: row.last_message_at,
        }
    }
}

#[derive(FromRow)]
struct MessageRow {
    id: Uuid,
    chatroom_id: Uuid,
    sender_id: Uuid,
    content: String,
    sent_at: DateTime<Utc>,
}

impl From<MessageRow> for ChatMessage {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id,
            chatroom_id: row.chatroom_id,
            sender_id: row.sender_id,
            content: row.content,
            sent_at: row.sent_at,
        }
    }
}

// ============================================
// Search helpers
// ============================================

/// Escape LIKE wildcards so user text matches literally
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &ListingQuery) {
    if let Some(text) = &query.text {
        let pattern = escape_like(text);
        qb.push(" AND (title % ")
            .push_bind(text.clone())
            .push(" OR title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR COALESCE(brand, '') ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(category) = &query.category {
        qb.push(" AND category = ").push_bind(category.clone());
    }
    if let Some(size) = &query.size {
        qb.push(" AND lower(size) = lower(").push_bind(size.clone()).push(")");
    }
    if let Some(condition) = query.condition {
        qb.push(" AND condition = ").push_bind(condition.as_str());
    }
    if let Some(min) = query.min_price {
        qb.push(" AND price_cents >= ").push_bind(min);
    }
    if let Some(max) = query.max_price {
        qb.push(" AND price_cents <= ").push_bind(max);
    }
    if let Some(seller) = query.seller_id {
        qb.push(" AND seller_id = ").push_bind(seller);
    }
    if let Some(status) = query.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
}

#[async_trait]
impl Store for PgStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    // ============================================
    // Users
    // ============================================

    async fn create_user(&self, user: User) -> AppResult<User> {
        let result = sqlx::query(
            "INSERT INTO users (id, email, username, password_hash, display_name, bio, location, \
             avatar_key, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.display_name)
        .bind(&user.bio)
        .bind(&user.location)
        .bind(&user.avatar_key)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(user),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(match db.constraint() {
                    Some("users_email_key") => AppError::conflict("Email is already registered"),
                    _ => AppError::conflict("Username is already taken"),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_user(&self, id: Uuid) -> AppResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE email = lower($1)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn find_user_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE lower(username) = lower($1)")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn update_user(&self, user: &User) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = $2, display_name = $3, bio = $4, location = $5, \
             avatar_key = $6, updated_at = $7 WHERE id = $1",
        )
        .bind(user.id)
        .bind(&user.password_hash)
        .bind(&user.display_name)
        .bind(&user.bio)
        .bind(&user.location)
        .bind(&user.avatar_key)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("User"));
        }
        Ok(())
    }

    async fn delete_user(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ============================================
    // Refresh tokens
    // ============================================

    async fn insert_refresh_token(&self, record: RefreshTokenRecord) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO refresh_tokens (token_hash, user_id, expires_at, revoked_at, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&record.token_hash)
        .bind(record.user_id)
        .bind(record.expires_at)
        .bind(record.revoked_at)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_refresh_token(&self, token_hash: &str) -> AppResult<Option<RefreshTokenRecord>> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(
            "SELECT * FROM refresh_tokens WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(RefreshTokenRecord::from))
    }

    async fn revoke_refresh_token(&self, token_hash: &str, at: DateTime<Utc>) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = $2 WHERE token_hash = $1 AND revoked_at IS NULL",
        )
        .bind(token_hash)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_user_refresh_tokens(&self, user_id: Uuid, at: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = $2 WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    // ============================================
    // Listings
    // ============================================

    async fn insert_listing(&self, listing: Listing) -> AppResult<Listing> {
        sqlx::query(&format!(
            "INSERT INTO listings ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
            LISTING_COLUMNS
        ))
        .bind(listing.id)
        .bind(listing.seller_id)
        .bind(&listing.title)
        .bind(&listing.description)
        .bind(listing.price_cents)
        .bind(&listing.category)
        .bind(&listing.size)
        .bind(listing.condition.as_str())
        .bind(&listing.brand)
        .bind(&listing.image_keys)
        .bind(listing.status.as_str())
        .bind(listing.created_at)
        .bind(listing.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(listing)
    }

    async fn find_listing(&self, id: Uuid) -> AppResult<Option<Listing>> {
        let row = sqlx::query_as::<_, ListingRow>(&format!(
            "SELECT {} FROM listings WHERE id = $1",
            LISTING_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Listing::try_from).transpose()
    }

    async fn find_listings(&self, ids: &[Uuid]) -> AppResult<Vec<Listing>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, ListingRow>(&format!(
            "SELECT {} FROM listings WHERE id = ANY($1)",
            LISTING_COLUMNS
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_id = HashMap::with_capacity(rows.len());
        for row in rows {
            let listing = Listing::try_from(row)?;
            by_id.insert(listing.id, listing);
        }

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn update_listing(&self, listing: &Listing) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE listings SET title = $2, description = $3, price_cents = $4, category = $5, \
             size = $6, condition = $7, brand = $8, image_keys = $9, status = $10, updated_at = $11 \
             WHERE id = $1",
        )
        .bind(listing.id)
        .bind(&listing.title)
        .bind(&listing.description)
        .bind(listing.price_cents)
        .bind(&listing.category)
        .bind(&listing.size)
        .bind(listing.condition.as_str())
        .bind(&listing.brand)
        .bind(&listing.image_keys)
        .bind(listing.status.as_str())
        .bind(listing.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Listing"));
        }
        Ok(())
    }

    async fn delete_listing(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM listings WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn listings_by_seller(&self, seller_id: Uuid) -> AppResult<Vec<Listing>> {
        let rows = sqlx::query_as::<_, ListingRow>(&format!(
            "SELECT {} FROM listings WHERE seller_id = $1 ORDER BY created_at DESC, id DESC",
            LISTING_COLUMNS
        ))
        .bind(seller_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Listing::try_from).collect()
    }

    async fn search_listings(&self, query: &ListingQuery) -> AppResult<SearchHits> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM listings WHERE TRUE");
        push_filters(&mut count, query);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new("SELECT id FROM listings WHERE TRUE");
        push_filters(&mut select, query);

        match (query.sort, &query.text) {
            (ListingSort::Relevance, Some(text)) => {
                select
                    .push(" ORDER BY similarity(title, ")
                    .push_bind(text.clone())
                    .push(") DESC, created_at DESC, id DESC");
            }
            (ListingSort::PriceAsc, _) => {
                select.push(" ORDER BY price_cents ASC, created_at DESC, id DESC");
            }
            (ListingSort::PriceDesc, _) => {
                select.push(" ORDER BY price_cents DESC, created_at DESC, id DESC");
            }
            _ => {
                select.push(" ORDER BY created_at DESC, id DESC");
            }
        }

        select
            .push(" LIMIT ")
            .push_bind(query.limit as i64)
            .push(" OFFSET ")
            .push_bind(query.offset as i64);

        let ids: Vec<Uuid> = select.build_query_scalar::<Uuid>().fetch_all(&self.pool).await?;

        Ok(SearchHits {
            ids,
            total: total.max(0) as u64,
        })
    }

    async fn referenced_object_keys(&self) -> AppResult<HashSet<String>> {
        let keys: Vec<String> = sqlx::query_scalar(
            "SELECT unnest(image_keys) FROM listings \
             UNION SELECT avatar_key FROM users WHERE avatar_key IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(keys.into_iter().collect())
    }

    // ============================================
    // Wishlist
    // ============================================

    async fn add_wishlist(&self, entry: WishlistEntry) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM listings WHERE id = $1)")
            .bind(entry.listing_id)
            .fetch_one(&self.pool)
            .await?;
        if !exists {
            return Err(AppError::not_found("Listing"));
        }

        let result = sqlx::query(
            "INSERT INTO wishlist_items (user_id, listing_id, added_at) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, listing_id) DO NOTHING",
        )
        .bind(entry.user_id)
        .bind(entry.listing_id)
        .bind(entry.added_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_wishlist(&self, user_id: Uuid, listing_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM wishlist_items WHERE user_id = $1 AND listing_id = $2")
            .bind(user_id)
            .bind(listing_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn wishlist(&self, user_id: Uuid) -> AppResult<Vec<WishlistEntry>> {
        let rows = sqlx::query_as::<_, WishlistRow>(
            "SELECT user_id, listing_id, added_at FROM wishlist_items WHERE user_id = $1 \
             ORDER BY added_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| WishlistEntry {
                user_id: r.user_id,
                listing_id: r.listing_id,
                added_at: r.added_at,
            })
            .collect())
    }

    // ============================================
    // Chat
    // ============================================

    async fn find_chatroom_for(&self, listing_id: Uuid, buyer_id: Uuid) -> AppResult<Option<ChatRoom>> {
        let row = sqlx::query_as::<_, ChatRoomRow>(
            "SELECT * FROM chatrooms WHERE listing_id = $1 AND buyer_id = $2",
        )
        .bind(listing_id)
        .bind(buyer_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ChatRoom::from))
    }

    async fn insert_chatroom(&self, room: ChatRoom) -> AppResult<ChatRoom> {
        sqlx::query(
            "INSERT INTO chatrooms (id, listing_id, buyer_id, seller_id, created_at, last_message_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(room.id)
        .bind(room.listing_id)
        .bind(room.buyer_id)
        .bind(room.seller_id)
        .bind(room.created_at)
        .bind(room.last_message_at)
        .execute(&self.pool)
        .await?;
        Ok(room)
    }

    async fn find_chatroom(&self, id: Uuid) -> AppResult<Option<ChatRoom>> {
        let row = sqlx::query_as::<_, ChatRoomRow>("SELECT * FROM chatrooms WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(ChatRoom::from))
    }

    async fn chatrooms_for_user(&self, user_id: Uuid) -> AppResult<Vec<ChatRoom>> {
        let rows = sqlx::query_as::<_, ChatRoomRow>(
            "SELECT * FROM chatrooms WHERE buyer_id = $1 OR seller_id = $1 \
             ORDER BY COALESCE(last_message_at, created_at) DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ChatRoom::from).collect())
    }

    async fn insert_message(&self, message: ChatMessage) -> AppResult<ChatMessage> {
        let mut tx = self.pool.begin().await?;

        let bumped = sqlx::query("UPDATE chatrooms SET last_message_at = $2 WHERE id = $1")
            .bind(message.chatroom_id)
            .bind(message.sent_at)
            .execute(&mut *tx)
            .await?;
        if bumped.rows_affected() == 0 {
            return Err(AppError::not_found("Chat room"));
        }

        sqlx::query(
            "INSERT INTO messages (id, chatroom_id, sender_id, content, sent_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(message.id)
        .bind(message.chatroom_id)
        .bind(message.sender_id)
        .bind(&message.content)
        .bind(message.sent_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(message)
    }

    async fn messages(
        &self,
        chatroom_id: Uuid,
        before: Option<DateTime<Utc>>,
        limit: u32,
    ) -> AppResult<Vec<ChatMessage>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT * FROM (\
                SELECT id, chatroom_id, sender_id, content, sent_at FROM messages \
                WHERE chatroom_id = $1 AND ($2::timestamptz IS NULL OR sent_at < $2) \
                ORDER BY sent_at DESC, id DESC LIMIT $3\
             ) page ORDER BY sent_at ASC, id ASC",
        )
        .bind(chatroom_id)
        .bind(before)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ChatMessage::from).collect())
    }
}
