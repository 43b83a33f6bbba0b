//! HTTP surface: relay WebSockets and content on `/`, the NIP-96 API, and
//! health checks.

use std::net::SocketAddr;

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use http::header::AUTHORIZATION;
use http::Method;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tower_http::trace::{DefaultOnFailure, DefaultOnResponse};
use tower_http::LatencyUnit;

mod gateway;
mod handlers;
mod health;
mod nip96;
mod origin;

pub use handlers::not_found_handler;
pub use origin::{RequestOrigin, NIP96_PATH};

use crate::ServiceState;

const STATUS_PREFIX: &str = "/_status";
const NIP96_DISCOVERY: &str = "/.well-known/nostr/nip96.json";

/// Every route the service answers, without the tracing layer
pub fn router(state: ServiceState, max_upload_bytes: usize) -> Router {
    let cors_layer = CorsLayer::new()
        .allow_methods(vec![Method::GET, Method::POST, Method::DELETE])
        .allow_headers(vec![AUTHORIZATION])
        .allow_origin(Any)
        .allow_credentials(false);

    let nip96_item = format!("{}/:cid", NIP96_PATH);

    Router::new()
        .route("/", get(gateway::handler))
        .route(NIP96_DISCOVERY, get(nip96::capabilities::handler))
        .route(NIP96_PATH, axum::routing::post(nip96::upload::handler))
        .route(
            &nip96_item,
            get(nip96::redirect::handler).delete(nip96::delete::handler),
        )
        .nest(STATUS_PREFIX, health::router(state.clone()))
        .fallback(handlers::not_found_handler)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors_layer)
        .with_state(state)
}

/// Serve until `shutdown_rx` fires
pub async fn run(
    listen_addr: SocketAddr,
    log_level: tracing::Level,
    max_upload_bytes: usize,
    state: ServiceState,
    mut shutdown_rx: watch::Receiver<()>,
) -> Result<(), HttpServerError> {
    let trace_layer = TraceLayer::new_for_http()
        .on_response(
            DefaultOnResponse::new()
                .include_headers(false)
                .level(log_level)
                .latency_unit(LatencyUnit::Micros),
        )
        .on_failure(DefaultOnFailure::new().latency_unit(LatencyUnit::Micros));

    let router = router(state, max_upload_bytes).layer(trace_layer);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!(addr = ?listener.local_addr()?, "relay and gateway listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        })
        .await?;

    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    #[error("an error occurred running the HTTP server: {0}")]
    ServingFailed(#[from] std::io::Error),
}
