//! Domain types for the SwapStreet marketplace
//! Users, listings, wishlist entries and chat records as the stores see them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================
// Users
// ============================================

/// Registered account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    /// Trimmed and lowercased
    pub email: String,
    pub username: String,
    /// Argon2id PHC string
    pub password_hash: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub avatar_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to create an account
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub display_name: Option<String>,
}

impl User {
    pub fn new(input: NewUser, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: input.email,
            username: input.username,
            password_hash: input.password_hash,
            display_name: input.display_name,
            bio: None,
            location: None,
            avatar_key: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Stored refresh token; only the SHA-256 of the opaque token is kept
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenRecord {
    pub token_hash: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

// ============================================
// Listings
// ============================================

/// Garment condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    New,
    LikeNew,
    Good,
    Fair,
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::New => "new",
            Condition::LikeNew => "like_new",
            Condition::Good => "good",
            Condition::Fair => "fair",
        }
    }
}

impl FromStr for Condition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Condition::New),
            "like_new" => Ok(Condition::LikeNew),
            "good" => Ok(Condition::Good),
            "fair" => Ok(Condition::Fair),
            other => Err(format!("unknown condition '{}'", other)),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a listing can still be bought
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Available,
    Sold,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Available => "available",
            ListingStatus::Sold => "sold",
        }
    }
}

impl FromStr for ListingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(ListingStatus::Available),
            "sold" => Ok(ListingStatus::Sold),
            other => Err(format!("unknown listing status '{}'", other)),
        }
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Item offered for sale
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub title: String,
    pub description: String,
    pub price_cents: i64,
    /// Lowercased
    pub category: String,
    pub size: String,
    pub condition: Condition,
    pub brand: Option<String>,
    /// Object storage keys, first one is the cover image
    pub image_keys: Vec<String>,
    pub status: ListingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Sort order for listing searches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingSort {
    Relevance,
    Newest,
    PriceAsc,
    PriceDesc,
}

/// Normalized listing search, produced by the API layer from query parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingQuery {
    /// Trimmed free text; `None` when empty
    pub text: Option<String>,
    pub category: Option<String>,
    pub size: Option<String>,
    pub condition: Option<Condition>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub seller_id: Option<Uuid>,
    /// `None` means any status
    pub status: Option<ListingStatus>,
    pub sort: ListingSort,
    /// Zero-based offset
    pub offset: u32,
    pub limit: u32,
}

impl Default for ListingQuery {
    fn default() -> Self {
        Self {
            text: None,
            category: None,
            size: None,
            condition: None,
            min_price: None,
            max_price: None,
            seller_id: None,
            status: Some(ListingStatus::Available),
            sort: ListingSort::Newest,
            offset: 0,
            limit: crate::utils::constants::DEFAULT_PAGE_SIZE,
        }
    }
}

impl ListingQuery {
    /// Structured filters only; free text is handled by the search engine
    pub fn matches_filters(&self, listing: &Listing) -> bool {
        self.category.as_ref().map_or(true, |c| &listing.category == c)
            && self
                .size
                .as_ref()
                .map_or(true, |s| listing.size.eq_ignore_ascii_case(s))
            && self.condition.map_or(true, |c| listing.condition == c)
            && self.min_price.map_or(true, |p| listing.price_cents >= p)
            && self.max_price.map_or(true, |p| listing.price_cents <= p)
            && self.seller_id.map_or(true, |id| listing.seller_id == id)
            && self.status.map_or(true, |s| listing.status == s)
    }
}

/// Ordered ids returned by a search backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchHits {
    pub ids: Vec<Uuid>,
    pub total: u64,
}

// ============================================
// Wishlist
// ============================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WishlistEntry {
    pub user_id: Uuid,
    pub listing_id: Uuid,
    pub added_at: DateTime<Utc>,
}

// ============================================
// Chat
// ============================================

/// Conversation between a buyer and the seller of one listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRoom {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
}

impl ChatRoom {
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.buyer_id == user_id || self.seller_id == user_id
    }

    /// Ordering key for room lists
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_message_at.unwrap_or(self.created_at)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub chatroom_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

// ============================================
// Object storage
// ============================================

/// Listing entry from object storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}
