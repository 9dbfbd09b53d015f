//! API Route Configuration

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use super::handlers::{self, auth, chat, images, listings, tryon, users, wishlist, AppState};
use super::middleware::{logging_middleware, rate_limit_middleware};
use super::ws;

/// Headroom on top of the image limit for multipart framing and JSON
const BODY_LIMIT_HEADROOM: usize = 1024 * 1024;

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Ignoring invalid CORS origin '{}'", origin);
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Create the API router with all routes and middleware
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors_origins);
    let body_limit = state.config.max_upload_bytes + BODY_LIMIT_HEADROOM;

    let api = Router::new()
        // Health
        .route("/health", get(handlers::health_check))
        // Auth
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout))
        // Profiles
        .route(
            "/users/me",
            get(users::me).patch(users::update_me).delete(users::delete_me),
        )
        .route("/users/me/password", post(users::change_password))
        .route("/users/:id", get(users::get_user))
        .route("/users/:id/listings", get(users::user_listings))
        // Images
        .route("/images", post(images::upload_image))
        .route("/images/*key", delete(images::delete_image))
        // Listings
        .route(
            "/listings",
            get(listings::search_listings).post(listings::create_listing),
        )
        .route(
            "/listings/:id",
            get(listings::get_listing)
                .patch(listings::update_listing)
                .delete(listings::delete_listing),
        )
        // Wishlist
        .route("/wishlist", get(wishlist::get_wishlist))
        .route(
            "/wishlist/:listing_id",
            put(wishlist::add_to_wishlist).delete(wishlist::remove_from_wishlist),
        )
        // Chat
        .route("/chatrooms", get(chat::list_rooms).post(chat::create_room))
        .route("/chatrooms/:id", get(chat::get_room))
        .route(
            "/chatrooms/:id/messages",
            get(chat::list_messages).post(chat::send_message),
        )
        // Try-on
        .route("/tryon", post(tryon::try_on));

    // Build full router
    Router::new()
        .nest("/api", api)
        .route("/health", get(handlers::health_check))
        .route("/ws/chat", get(ws::chat_socket))
        .with_state(state.clone())
        // Middleware (order matters - bottom runs first)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(middleware::from_fn(logging_middleware))
        .layer(middleware::from_fn_with_state(state, rate_limit_middleware))
}
