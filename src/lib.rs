//! Documentation of the quiet-archive record store.
//!
//!
//!
//! # General Infrastructure
//! - The static site (gallery, weekly feed, canvas tools) is served elsewhere;
//!   this service is only the API the widgets talk to
//! - Two feeds, each one Redis key holding a JSON array: `quiet-archive:uploads`
//!   and `weekly-wonder:content`
//! - Handlers are stateless; the only persistent state lives in Redis
//! - One shared `ConnectionManager`, established at startup and cloned per call
//!
//!
//!
//! # Notes
//!
//! ## Why one key per feed
//! The feeds are small (uploads is capped at 100 records) and every page load
//! wants the whole list anyway, so a single GET/SET round-trip beats per-record
//! keys. The cost is that every mutation rewrites the full value and concurrent
//! writers race last-writer-wins. For a personal gallery that tradeoff is fine;
//! an optimistic revision counter on the value is the upgrade path if it ever
//! stops being fine.
//!
//! ## Image payloads
//! The canvas tools export PNG data URIs, which get enormous. Image posts are
//! recompressed (bounded to 1600px, JPEG quality 80) before the 500KB ceiling
//! is checked; text posts get a 4MB ceiling. The `clear-large-images` delete
//! action exists to purge oversized records written before the ceiling did.
//!
//!
//!
//! # Setup
//!
//! View current docs.
//! ```sh
//! cargo doc --open
//! ```
//!
//! Run against a local Redis.
//! ```sh
//! REDIS_URL=redis://127.0.0.1:6379 RUST_PORT=3000 cargo run
//! ```

use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{Method, header::CONTENT_TYPE},
    routing::get,
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod collection;
pub mod compress;
pub mod config;
pub mod database;
pub mod error;
pub mod routes;
pub mod state;

use routes::{append_handler, delete_handler, list_handler, method_not_allowed, options_handler};
use state::State;

/// Body limit above the largest accepted content ceiling, leaving headroom
/// for the JSON envelope around a 4MB text payload.
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

pub fn app(state: Arc<State>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route(
            "/api/{collection}",
            get(list_handler)
                .post(append_handler)
                .delete(delete_handler)
                .options(options_handler)
                .fallback(method_not_allowed),
        )
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .with_state(state)
}

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = State::new().await;

    info!("Starting server...");

    let app = app(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await.unwrap();
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    println!("Server shutting down...");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
