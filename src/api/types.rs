//! API Request/Response Types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Condition, Listing, ListingSort, ListingStatus, User};
use crate::providers::ObjectStorage;

/// API Response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiErrorBody>,
    pub timestamp: i64,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now().timestamp(),
        }
    }
}

impl ApiResponse<()> {
    pub fn error(error: ApiErrorBody) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            timestamp: Utc::now().timestamp(),
        }
    }
}

/// Error payload inside the envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

// ============================================
// Health
// ============================================

#[derive(Debug, Serialize)]
pub struct HealthData {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub store: &'static str,
    pub search: &'static str,
    pub storage: &'static str,
}

// ============================================
// Auth
// ============================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Email or username
    pub login: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
}

// ============================================
// Users
// ============================================

/// The caller's own account
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub avatar_key: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserResponse {
    pub fn new(user: &User, storage: &dyn ObjectStorage) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            bio: user.bio.clone(),
            location: user.location.clone(),
            avatar_key: user.avatar_key.clone(),
            avatar_url: user.avatar_key.as_deref().map(|k| storage.public_url(k)),
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// What other users may see
#[derive(Debug, Clone, Serialize)]
pub struct PublicProfile {
    pub id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PublicProfile {
    pub fn new(user: &User, storage: &dyn ObjectStorage) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            bio: user.bio.clone(),
            location: user.location.clone(),
            avatar_url: user.avatar_key.as_deref().map(|k| storage.public_url(k)),
            created_at: user.created_at,
        }
    }
}

/// Absent fields are left alone, empty strings clear
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub avatar_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

// ============================================
// Images
// ============================================

#[derive(Debug, Serialize)]
pub struct ImageUploadResponse {
    pub key: String,
    pub url: String,
}

// ============================================
// Listings
// ============================================

#[derive(Debug, Deserialize)]
pub struct CreateListingRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price_cents: i64,
    pub category: String,
    pub size: String,
    pub condition: Condition,
    #[serde(default)]
    pub brand: Option<String>,
    pub image_keys: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateListingRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    pub category: Option<String>,
    pub size: Option<String>,
    pub condition: Option<Condition>,
    /// Empty string clears the brand
    pub brand: Option<String>,
    pub image_keys: Option<Vec<String>>,
    pub status: Option<ListingStatus>,
}

/// Query string of `GET /api/listings`
#[derive(Debug, Default, Deserialize)]
pub struct ListingSearchParams {
    pub q: Option<String>,
    pub category: Option<String>,
    pub size: Option<String>,
    pub condition: Option<Condition>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub seller_id: Option<Uuid>,
    /// `available` (default), `sold` or `any`
    pub status: Option<String>,
    pub sort: Option<ListingSort>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ListingResponse {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub title: String,
    pub description: String,
    pub price_cents: i64,
    pub category: String,
    pub size: String,
    pub condition: Condition,
    pub brand: Option<String>,
    pub image_keys: Vec<String>,
    pub image_urls: Vec<String>,
    pub status: ListingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// `None` only if the seller vanished mid-request
    pub seller: Option<PublicProfile>,
}

impl ListingResponse {
    pub fn new(listing: Listing, seller: Option<PublicProfile>, storage: &dyn ObjectStorage) -> Self {
        let image_urls = listing.image_keys.iter().map(|k| storage.public_url(k)).collect();
        Self {
            id: listing.id,
            seller_id: listing.seller_id,
            title: listing.title,
            description: listing.description,
            price_cents: listing.price_cents,
            category: listing.category,
            size: listing.size,
            condition: listing.condition,
            brand: listing.brand,
            image_keys: listing.image_keys,
            image_urls,
            status: listing.status,
            created_at: listing.created_at,
            updated_at: listing.updated_at,
            seller,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T: Serialize> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
}

// ============================================
// Wishlist
// ============================================

#[derive(Debug, Serialize)]
pub struct WishlistItemResponse {
    pub listing: ListingResponse,
    pub added_at: DateTime<Utc>,
}

// ============================================
// Chat
// ============================================

#[derive(Debug, Deserialize)]
pub struct CreateChatRoomRequest {
    pub listing_id: Uuid,
}

#[derive(Debug, Default, Deserialize)]
pub struct MessagesParams {
    pub before: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

// ============================================
// Try-on
// ============================================

#[derive(Debug, Deserialize)]
pub struct TryOnRequest {
    pub listing_id: Uuid,
    /// Base64, optionally as a `data:` URL
    pub person_image: String,
    #[serde(default)]
    pub image_index: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct TryOnResponse {
    pub listing_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}
