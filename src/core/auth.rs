//! Authentication Module
//!
//! - Argon2id password hashing (PHC strings, random salt)
//! - HS256 JWT access tokens
//! - Opaque refresh tokens, stored only as SHA-256 hex

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use uuid::Uuid;

use crate::models::{AppConfig, AppError, AppResult, RefreshTokenRecord, User};
use crate::utils::constants::REFRESH_TOKEN_BYTES;

// ============================================
// Passwords
// ============================================

/// Hash a password with Argon2id and a fresh salt
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::internal(format!("Password hashing failed: {}", e)))
}

/// Check a password against a stored PHC string. A corrupt hash never verifies.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

// ============================================
// Access tokens
// ============================================

/// JWT claims carried by access tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub username: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn user_id(&self) -> AppResult<Uuid> {
        Uuid::parse_str(&self.sub).map_err(|_| AppError::invalid_token())
    }
}

/// Freshly issued token pair
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
    /// Record to persist for the refresh token
    pub refresh_record: RefreshTokenRecord,
}

/// Signs and verifies access tokens, mints refresh tokens
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, issuer: &str, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.to_string(),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            &config.jwt_secret,
            &config.jwt_issuer,
            config.access_token_ttl,
            config.refresh_token_ttl,
        )
    }

    /// Sign an access token for `user` valid from `now`
    pub fn sign_access_token(&self, user: &User, now: DateTime<Utc>) -> AppResult<String> {
        let claims = Claims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: expires_at(now, self.access_ttl)?.timestamp(),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::internal(format!("Token signing failed: {}", e)))
    }

    /// Verify signature, expiry (no leeway) and issuer
    pub fn verify_access_token(&self, token: &str) -> AppResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }

    /// Issue an access token plus a new refresh token for `user`
    pub fn issue(&self, user: &User, now: DateTime<Utc>) -> AppResult<IssuedTokens> {
        let access_token = self.sign_access_token(user, now)?;
        let refresh_token = generate_refresh_token();
        let expires_at = expires_at(now, self.refresh_ttl)?;

        Ok(IssuedTokens {
            access_token,
            refresh_record: RefreshTokenRecord {
                token_hash: hash_refresh_token(&refresh_token),
                user_id: user.id,
                expires_at,
                revoked_at: None,
                created_at: now,
            },
            refresh_token,
            expires_in: self.access_ttl.as_secs(),
        })
    }
}

/// `now + ttl`, or an error when the sum leaves chrono's range
fn expires_at(now: DateTime<Utc>, ttl: Duration) -> AppResult<DateTime<Utc>> {
    ChronoDuration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| AppError::internal(format!("Token lifetime of {}s is out of range", ttl.as_secs())))
}

// ============================================
// Refresh tokens
// ============================================

/// Random opaque token, hex encoded
pub fn generate_refresh_token() -> String {
    let bytes: [u8; REFRESH_TOKEN_BYTES] = rand::random();
    hex::encode(bytes)
}

/// Storage form of a refresh token
pub fn hash_refresh_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
