use axum::body::Body;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use common::prelude::Cid;

use crate::http::handlers::not_found;
use crate::http::origin::{vhost_cid, RequestOrigin};
use crate::relay::serve_socket;
use crate::ServiceState;

/// `GET /` does three jobs: on a `{cid}.{label}.` host it serves that
/// content, on any other host it upgrades relay WebSockets, and otherwise
/// it is a 404.
pub async fn handler(
    State(state): State<ServiceState>,
    origin: RequestOrigin,
    upgrade: Option<WebSocketUpgrade>,
    request: Request,
) -> Response {
    // Host names compare case-insensitively; CIDs are lowercase
    let hostname = origin.hostname().to_ascii_lowercase();
    let label = state.gateway_label().to_ascii_lowercase();
    if let Some(cid) = vhost_cid(&hostname, &label) {
        return serve_content(&state, cid, request).await;
    }

    match upgrade {
        Some(upgrade) => {
            let relay = state.relay().clone();
            upgrade.on_upgrade(move |socket| serve_socket(socket, relay))
        }
        None => not_found(),
    }
}

async fn serve_content(state: &ServiceState, cid: &str, request: Request) -> Response {
    let Ok(parsed) = cid.parse::<Cid>() else {
        tracing::warn!(cid, "not a content id");
        return not_found();
    };

    let record = match state.database().get_content(cid).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            tracing::warn!(cid, "content not found");
            return not_found();
        }
        Err(e) => {
            tracing::error!(cid, "failed to look up content: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mime = record
        .content_type
        .parse::<mime::Mime>()
        .unwrap_or(mime::APPLICATION_OCTET_STREAM);
    tracing::debug!(cid, content_type = %mime, "serving content");

    let service = ServeFile::new_with_mime(state.store().path_for(&parsed), &mime);
    match service.oneshot(request).await {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    }
}
