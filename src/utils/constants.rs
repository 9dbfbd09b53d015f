//! Constants Module - Single Source of Truth
//!
//! Defaults, limits and names shared across the application.

// ============================================
// APPLICATION CONSTANTS
// ============================================

/// Application name
pub const APP_NAME: &str = "SwapStreet";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// User-Agent for outgoing HTTP requests
pub const USER_AGENT: &str = concat!("SwapStreet/", env!("CARGO_PKG_VERSION"));

// ============================================
// SERVER DEFAULTS
// ============================================

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";
pub const DEFAULT_RATE_LIMIT_PER_MINUTE: u32 = 120;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;

// ============================================
// AUTH
// ============================================

pub const DEFAULT_JWT_ISSUER: &str = "swapstreet";
/// 15 minutes
pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: u64 = 900;
/// 7 days
pub const DEFAULT_REFRESH_TOKEN_TTL_SECS: u64 = 604_800;
/// Random bytes in an opaque refresh token (hex encoded on the wire)
pub const REFRESH_TOKEN_BYTES: usize = 32;

pub const EMAIL_MAX_LEN: usize = 254;
pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 32;
pub const PASSWORD_MIN_LEN: usize = 8;
pub const PASSWORD_MAX_LEN: usize = 128;

// ============================================
// PROFILES
// ============================================

pub const DISPLAY_NAME_MAX_LEN: usize = 64;
pub const BIO_MAX_LEN: usize = 500;
pub const LOCATION_MAX_LEN: usize = 100;

// ============================================
// LISTINGS & SEARCH
// ============================================

pub const TITLE_MAX_LEN: usize = 100;
pub const DESCRIPTION_MAX_LEN: usize = 2000;
pub const CATEGORY_MAX_LEN: usize = 50;
pub const SIZE_MAX_LEN: usize = 20;
pub const BRAND_MAX_LEN: usize = 50;
/// $1,000,000.00
pub const MAX_PRICE_CENTS: i64 = 100_000_000;
pub const MAX_IMAGES_PER_LISTING: usize = 8;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Same default as pg_trgm's `similarity_threshold`
pub const TRIGRAM_SIMILARITY_THRESHOLD: f64 = 0.3;

pub const DEFAULT_MEILI_URL: &str = "http://localhost:7700";
pub const MEILI_LISTING_INDEX: &str = "listings";

// ============================================
// OBJECT STORAGE
// ============================================

pub const DEFAULT_BUCKET: &str = "swapstreet";
pub const DEFAULT_S3_REGION: &str = "us-east-1";
pub const DEFAULT_PUBLIC_ASSET_URL: &str = "http://localhost:9000/swapstreet";
/// 5 MiB
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;
/// Prefix under which user uploads live: `uploads/<user_id>/<uuid>.<ext>`
pub const UPLOAD_PREFIX: &str = "uploads/";
/// 24 hours
pub const DEFAULT_ORPHAN_GRACE_SECS: u64 = 86_400;
/// 1 hour
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 3_600;
/// Upper bound for any configured duration: 10 years
pub const MAX_DURATION_SECS: u64 = 10 * 365 * 86_400;

/// Accepted image content types and the extension they are stored under
pub const ALLOWED_IMAGE_TYPES: [(&str, &str); 3] = [
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/webp", "webp"),
];

// ============================================
// CHAT
// ============================================

pub const MESSAGE_MAX_LEN: usize = 2000;
pub const DEFAULT_MESSAGE_PAGE: u32 = 50;
pub const MAX_MESSAGE_PAGE: u32 = 100;
/// Buffered messages per live room before slow subscribers start lagging
pub const ROOM_CHANNEL_CAPACITY: usize = 256;

// ============================================
// TRY-ON
// ============================================

pub const DEFAULT_TRYON_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_TRYON_REQUESTS_PER_HOUR: u32 = 10;

/// Map an image content type to its storage extension
pub fn image_extension(content_type: &str) -> Option<&'static str> {
    let normalized = content_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    ALLOWED_IMAGE_TYPES
        .iter()
        .find(|(mime, _)| *mime == normalized)
        .map(|(_, ext)| *ext)
}

/// Upload prefix owned by a user
pub fn user_upload_prefix(user_id: &uuid::Uuid) -> String {
    format!("{}{}/", UPLOAD_PREFIX, user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_extension() {
        assert_eq!(image_extension("image/jpeg"), Some("jpg"));
        assert_eq!(image_extension("IMAGE/PNG"), Some("png"));
        assert_eq!(image_extension("image/webp; charset=binary"), Some("webp"));
        assert_eq!(image_extension("image/gif"), None);
        assert_eq!(image_extension(""), None);
    }

    #[test]
    fn test_user_upload_prefix() {
        let id = uuid::Uuid::nil();
        assert_eq!(
            user_upload_prefix(&id),
            "uploads/00000000-0000-0000-0000-000000000000/"
        );
    }
}
