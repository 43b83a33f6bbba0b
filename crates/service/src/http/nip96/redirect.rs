use axum::extract::{Path, State};
use axum::response::Redirect;

use super::strip_extension;
use crate::http::origin::RequestOrigin;
use crate::ServiceState;

/// NIP-96 clients fetch `{api_url}/{cid}`; send them to the CID host
#[tracing::instrument(skip(state))]
pub async fn handler(
    State(state): State<ServiceState>,
    origin: RequestOrigin,
    Path(requested): Path<String>,
) -> Redirect {
    let cid = strip_extension(&requested);
    Redirect::permanent(&origin.content_url(state.gateway_label(), cid))
}
