use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::header::AUTHORIZATION;
use http::{HeaderMap, StatusCode};
use serde::Serialize;

use common::prelude::Cid;
use common::relay::{authorize, AuthError};

use super::strip_extension;
use crate::http::origin::RequestOrigin;
use crate::storage::StorageError;
use crate::ServiceState;

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub status: &'static str,
    pub message: &'static str,
}

/// Drop the caller's claim on a CID. The file and its metadata go once
/// nobody owns it any more.
pub async fn handler(
    State(state): State<ServiceState>,
    origin: RequestOrigin,
    Path(requested): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, DeleteError> {
    let authorization = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let url = format!("{}/{}", origin.api_url(), requested);
    let pubkey = authorize(
        authorization,
        "DELETE",
        &url,
        state.posters(),
        chrono::Utc::now().timestamp(),
    )?;

    // Nothing can be stored under a name that is not a CID
    match strip_extension(&requested).parse::<Cid>() {
        Ok(cid) => release(&state, &cid, &pubkey).await?,
        Err(e) => tracing::debug!(requested = %requested, "delete of non-CID: {}", e),
    }

    Ok((
        StatusCode::OK,
        Json(DeleteResponse {
            status: "success",
            message: "Resource deleted",
        }),
    ))
}

async fn release(state: &ServiceState, cid: &Cid, pubkey: &str) -> Result<(), DeleteError> {
    let key = cid.to_string();
    let remaining = state.database().remove_owner(&key, pubkey).await?;
    if remaining == 0 {
        tracing::info!(cid = %key, "no owners left, removing content");
        state.database().delete_content(&key).await?;
        state.store().remove(cid).await?;
    }
    tracing::info!(cid = %key, pubkey = %pubkey, "deleted");
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum DeleteError {
    #[error(transparent)]
    Unauthorized(#[from] AuthError),
    #[error("Could not delete resource.")]
    Database(#[from] sqlx::Error),
    #[error("Could not delete resource.")]
    Storage(#[from] StorageError),
}

impl IntoResponse for DeleteError {
    fn into_response(self) -> Response {
        match self {
            DeleteError::Unauthorized(e) => {
                tracing::warn!("401 for deletion: {}", e);
                let body = serde_json::json!({"error": e.to_string()});
                (StatusCode::UNAUTHORIZED, Json(body)).into_response()
            }
            DeleteError::Database(ref e) => {
                tracing::error!("delete database failure: {}", e);
                let body = serde_json::json!({"error": self.to_string()});
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
            DeleteError::Storage(ref e) => {
                tracing::error!("delete storage failure: {}", e);
                let body = serde_json::json!({"error": self.to_string()});
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
        }
    }
}
