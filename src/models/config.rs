//! Configuration module for the SwapStreet API
//!
//! Every value is read from the environment once at startup and has a
//! development default, so a bare binary runs fully in memory.
//! Secrets are NEVER logged.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use crate::utils::constants::{
    DEFAULT_ACCESS_TOKEN_TTL_SECS, DEFAULT_BUCKET, DEFAULT_CLEANUP_INTERVAL_SECS,
    DEFAULT_CORS_ORIGIN, DEFAULT_DB_MAX_CONNECTIONS, DEFAULT_HOST, DEFAULT_JWT_ISSUER,
    DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_MEILI_URL, DEFAULT_ORPHAN_GRACE_SECS, DEFAULT_PORT,
    DEFAULT_PUBLIC_ASSET_URL, DEFAULT_RATE_LIMIT_PER_MINUTE, DEFAULT_REFRESH_TOKEN_TTL_SECS,
    DEFAULT_S3_REGION, DEFAULT_TRYON_REQUESTS_PER_HOUR, DEFAULT_TRYON_TIMEOUT_SECS,
    MAX_DURATION_SECS,
};

/// Which engine answers listing searches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchBackend {
    /// Trigram similarity inside the store (pg_trgm or its in-memory twin)
    Database,
    /// External Meilisearch index
    Meilisearch,
}

impl FromStr for SearchBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "database" | "db" | "postgres" | "trigram" => Ok(Self::Database),
            "meilisearch" | "meili" => Ok(Self::Meilisearch),
            other => Err(format!("unknown search backend '{}'", other)),
        }
    }
}

/// S3 / MinIO connection settings
#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub bucket: String,
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

/// Virtual try-on upstream settings
#[derive(Debug, Clone)]
pub struct TryOnConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

/// Full application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,

    /// PostgreSQL URL; `None` selects the in-memory store
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,

    pub search_backend: SearchBackend,
    pub meili_url: String,
    pub meili_api_key: Option<String>,

    /// `None` selects in-memory object storage
    pub s3: Option<S3Config>,
    pub public_asset_url: String,
    pub max_upload_bytes: usize,
    pub orphan_grace: Duration,
    /// Zero disables the orphan sweeper
    pub cleanup_interval: Duration,

    /// `None` disables the try-on endpoint
    pub tryon: Option<TryOnConfig>,
    pub tryon_requests_per_hour: u32,

    /// Zero disables rate limiting
    pub rate_limit_per_minute: u32,
    pub cors_origins: Vec<String>,
}

impl AppConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Self {
        let port = var("PORT")
            .or_else(|| var("SWAPSTREET_PORT"))
            .and_then(|p| parse_or_warn("PORT", &p))
            .unwrap_or(DEFAULT_PORT);

        let jwt_secret = match var("JWT_SECRET") {
            Some(secret) => {
                info!("🔑 JWT_SECRET configured (value hidden)");
                secret
            }
            None => {
                warn!("JWT_SECRET not set, generating an ephemeral secret; tokens will not survive a restart");
                random_secret()
            }
        };

        let s3 = var("S3_ENDPOINT").map(|endpoint| S3Config {
            endpoint,
            bucket: var("S3_BUCKET").unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
            region: var("S3_REGION").unwrap_or_else(|| DEFAULT_S3_REGION.to_string()),
            access_key: var("S3_ACCESS_KEY"),
            secret_key: var("S3_SECRET_KEY"),
        });

        let tryon = var("TRYON_API_URL").map(|api_url| TryOnConfig {
            api_url,
            api_key: var("TRYON_API_KEY"),
            timeout: load_duration("TRYON_TIMEOUT_SECS", DEFAULT_TRYON_TIMEOUT_SECS),
        });

        let cors_origins = var("CORS_ORIGINS")
            .unwrap_or_else(|| DEFAULT_CORS_ORIGIN.to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            host: var("SWAPSTREET_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            database_url: var("DATABASE_URL"),
            database_max_connections: try_load("DATABASE_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS),
            jwt_secret,
            jwt_issuer: var("JWT_ISSUER").unwrap_or_else(|| DEFAULT_JWT_ISSUER.to_string()),
            access_token_ttl: load_duration("ACCESS_TOKEN_TTL_SECS", DEFAULT_ACCESS_TOKEN_TTL_SECS),
            refresh_token_ttl: load_duration("REFRESH_TOKEN_TTL_SECS", DEFAULT_REFRESH_TOKEN_TTL_SECS),
            search_backend: try_load("SEARCH_BACKEND", SearchBackend::Database),
            meili_url: var("MEILI_URL").unwrap_or_else(|| DEFAULT_MEILI_URL.to_string()),
            meili_api_key: var("MEILI_API_KEY"),
            s3,
            public_asset_url: var("PUBLIC_ASSET_URL")
                .unwrap_or_else(|| DEFAULT_PUBLIC_ASSET_URL.to_string()),
            max_upload_bytes: try_load("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
            orphan_grace: load_duration("ORPHAN_GRACE_SECS", DEFAULT_ORPHAN_GRACE_SECS),
            cleanup_interval: load_duration("CLEANUP_INTERVAL_SECS", DEFAULT_CLEANUP_INTERVAL_SECS),
            tryon,
            tryon_requests_per_hour: try_load("TRYON_REQUESTS_PER_HOUR", DEFAULT_TRYON_REQUESTS_PER_HOUR),
            rate_limit_per_minute: try_load("RATE_LIMIT_PER_MINUTE", DEFAULT_RATE_LIMIT_PER_MINUTE),
            cors_origins,
        }
    }

    /// In-memory configuration with a fixed secret, used by tests and demos
    pub fn for_testing() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            database_url: None,
            database_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            jwt_secret: "test-secret-do-not-use-in-production".to_string(),
            jwt_issuer: DEFAULT_JWT_ISSUER.to_string(),
            access_token_ttl: Duration::from_secs(DEFAULT_ACCESS_TOKEN_TTL_SECS),
            refresh_token_ttl: Duration::from_secs(DEFAULT_REFRESH_TOKEN_TTL_SECS),
            search_backend: SearchBackend::Database,
            meili_url: DEFAULT_MEILI_URL.to_string(),
            meili_api_key: None,
            s3: None,
            public_asset_url: DEFAULT_PUBLIC_ASSET_URL.to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            orphan_grace: Duration::from_secs(DEFAULT_ORPHAN_GRACE_SECS),
            cleanup_interval: Duration::ZERO,
            tryon: None,
            tryon_requests_per_hour: DEFAULT_TRYON_REQUESTS_PER_HOUR,
            rate_limit_per_minute: 0,
            cors_origins: vec![DEFAULT_CORS_ORIGIN.to_string()],
        }
    }

    /// `host:port` string for binding
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Non-empty environment variable
fn var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or_warn<T: FromStr>(key: &str, raw: &str) -> Option<T>
where
    T::Err: Display,
{
    raw.parse()
        .map_err(|e| warn!("Invalid {key} value '{raw}': {e}, using default"))
        .ok()
}

/// Parse an environment variable, falling back to `default` when unset or invalid
fn try_load<T: FromStr>(key: &str, default: T) -> T
where
    T::Err: Display,
{
    var(key)
        .and_then(|raw| parse_or_warn(key, &raw))
        .unwrap_or(default)
}

/// Seconds at most `MAX_DURATION_SECS`; larger values fall back to `default`
fn bounded_secs(key: &str, secs: u64, default: u64) -> u64 {
    if secs > MAX_DURATION_SECS {
        warn!("{key} value {secs} exceeds {MAX_DURATION_SECS} seconds, using default");
        default
    } else {
        secs
    }
}

fn load_duration(key: &str, default_secs: u64) -> Duration {
    Duration::from_secs(bounded_secs(key, try_load(key, default_secs), default_secs))
}

fn random_secret() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}
