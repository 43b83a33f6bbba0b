use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde::Serialize;

use crate::http::origin::RequestOrigin;

/// `/.well-known/nostr/nip96.json`
#[derive(Debug, Serialize)]
pub struct Capabilities {
    pub api_url: String,
    /// uploads are addressed by CID and served from CID hosts
    pub ipfs: bool,
}

#[tracing::instrument]
pub async fn handler(origin: RequestOrigin) -> Response {
    let body = Capabilities {
        api_url: origin.api_url(),
        ipfs: true,
    };
    (StatusCode::OK, Json(body)).into_response()
}
