//! SwapStreet REST + WebSocket API

pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod types;
pub mod ws;

pub use handlers::AppState;
pub use middleware::start_limiter_cleanup;
pub use routes::create_router;
pub use types::*;
