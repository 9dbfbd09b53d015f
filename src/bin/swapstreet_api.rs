//! SwapStreet API Server
//!
//! Usage:
//!   cargo run --bin swapstreet_api
//!
//! Environment:
//!   PORT / SWAPSTREET_PORT - Server port (default: 8080)
//!   SWAPSTREET_HOST        - Server host (default: 0.0.0.0)
//!   DATABASE_URL           - PostgreSQL (default: in-memory store)
//!   S3_ENDPOINT            - MinIO / S3 (default: in-memory storage)
//!   RUST_LOG               - Log filter (default: info)

use std::net::SocketAddr;
use std::sync::Arc;
use swapstreet::api::{create_router, start_limiter_cleanup, AppState};
use swapstreet::core::spawn_cleanup_task;
use swapstreet::utils::constants::{APP_NAME, APP_VERSION};
use swapstreet::AppConfig;
use tokio::net::TcpListener;
use tokio::signal::ctrl_c;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Initialize logging
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    print_banner();

    let config = AppConfig::from_env();
    let addr: SocketAddr = config.bind_address().parse()?;

    // Create app state
    let state = Arc::new(AppState::from_config(config).await?);

    // Background tasks
    let sweeper = spawn_cleanup_task(
        state.store.clone(),
        state.storage.clone(),
        state.config.cleanup_interval,
        state.config.orphan_grace,
    );
    let limiter_cleanup = start_limiter_cleanup(state.clone());
    info!("🧹 Background cleanup tasks started");

    let app = create_router(state);

    info!("🚀 {} API v{} starting on http://{}", APP_NAME, APP_VERSION, addr);
    info!("📋 Health check: http://{}/health", addr);
    info!("");
    info!("Endpoints:");
    info!("  POST /api/auth/{{register,login,refresh,logout}}");
    info!("  GET  /api/users/me          - Own profile");
    info!("  POST /api/images            - Upload an image");
    info!("  GET  /api/listings          - Search listings");
    info!("  GET  /api/wishlist          - Wishlist");
    info!("  GET  /api/chatrooms         - Chat rooms");
    info!("  GET  /ws/chat               - Live chat (WebSocket)");
    info!("  POST /api/tryon             - Virtual try-on");
    info!("");
    info!("Press Ctrl+C for graceful shutdown");

    let listener = TcpListener::bind(addr).await?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("🛑 Shutdown signal received, stopping background tasks...");
    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    limiter_cleanup.abort();

    info!("👋 {} API shutdown complete", APP_NAME);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                warn!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn print_banner() {
    println!(
        r#"
    ╔══════════════════════════════════════════════╗
    ║                                              ║
    ║     S W A P S T R E E T                      ║
    ║     secondhand clothing marketplace API      ║
    ║                                              ║
    ╚══════════════════════════════════════════════╝
    "#
    );
}
