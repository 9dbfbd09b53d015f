//! SwapStreet Marketplace Backend
//!
//! REST and real-time chat API for a secondhand-clothing marketplace:
//! - Accounts with JWT access tokens and rotating refresh tokens
//! - Listings with trigram or Meilisearch search
//! - Image uploads to S3-compatible storage, with an orphan sweeper
//! - Wishlists, buyer/seller chat and a virtual try-on proxy

pub mod api;
pub mod core;
pub mod models;
pub mod providers;
pub mod utils;

pub use api::{create_router, AppState};
pub use models::{AppConfig, AppError, AppResult, ErrorCode};
