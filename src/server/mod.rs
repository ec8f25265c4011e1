//! HTTP server: axum router exposing the sportsbook API under `/api`.
//!
//! CORS origins come from config and any method is allowed; `x-admin-token`
//! is allowed through so browser clients can call the privileged refresh
//! route.

pub mod extract;
pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderName, HeaderValue},
    routing::{delete, get, patch, post},
    Router,
};
use std::net::SocketAddr;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use routes::{AppState, ServiceState, ADMIN_TOKEN_HEADER};

/// Build the router with all routes and middleware.
pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    let api = Router::new()
        .route("/", get(routes::root))
        .route("/health", get(routes::health))
        // Sports & odds
        .route("/sports", get(routes::get_sports))
        .route("/sports/available", get(routes::get_available_sports))
        .route("/odds/all/preview", get(routes::get_odds_preview))
        .route("/odds/refresh/:sport_key", post(routes::refresh_odds))
        .route("/odds/:sport_key", get(routes::get_odds))
        .route("/cache/status", get(routes::get_cache_status))
        // Wallet
        .route("/wallet", get(routes::get_wallet))
        .route("/wallet/update", post(routes::update_wallet))
        // Bets
        .route("/bets", post(routes::place_bet).get(routes::list_bets))
        .route("/bets/active", get(routes::get_active_bets))
        .route("/bets/history", get(routes::get_bet_history))
        .route("/bets/:bet_id/settle", patch(routes::settle_bet))
        .route("/bets/:bet_id", delete(routes::cancel_bet))
        .route("/stats", get(routes::get_stats));

    Router::new()
        .nest("/api", api)
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(ADMIN_TOKEN_HEADER)]);

    if origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(allowed))
}

/// Serve until Ctrl+C.
pub async fn serve(router: Router, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "API server listening on http://{addr}/api");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received.");
        })
        .await
        .context("API server error")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
