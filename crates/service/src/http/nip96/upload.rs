use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::header::AUTHORIZATION;
use http::{HeaderMap, StatusCode};
use serde::Serialize;

use common::relay::{authorize, AuthError};

use crate::database::ContentRecord;
use crate::http::origin::RequestOrigin;
use crate::sniff::sniff;
use crate::storage::{StagedUpload, StorageError, StoredContent};
use crate::ServiceState;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub nip94_event: Nip94Event,
}

#[derive(Debug, Serialize)]
pub struct Nip94Event {
    pub tags: Vec<[String; 2]>,
}

/// Form fields other than the file itself
#[derive(Debug, Default)]
struct UploadFields {
    alt: Option<String>,
    content_type: Option<String>,
    media_type: Option<String>,
}

pub async fn handler(
    State(state): State<ServiceState>,
    origin: RequestOrigin,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, UploadError> {
    let authorization = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let pubkey = authorize(
        authorization,
        "POST",
        &origin.api_url(),
        state.posters(),
        chrono::Utc::now().timestamp(),
    )?;

    let mut fields = UploadFields::default();
    let mut upload: Option<(StoredContent, Option<String>)> = None;

    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" if upload.is_none() => {
                let file_name = field.file_name().map(str::to_string);
                let mut staged: StagedUpload = state.store().stage().await?;
                while let Some(chunk) = field.chunk().await? {
                    staged.write(&chunk).await?;
                }
                let stored = state.store().commit(staged).await?;
                upload = Some((stored, file_name));
            }
            "alt" => fields.alt = non_empty(field.text().await?),
            "content_type" => fields.content_type = non_empty(field.text().await?),
            "media_type" => fields.media_type = non_empty(field.text().await?),
            _ => {}
        }
    }

    let (stored, file_name) = upload.ok_or(UploadError::NoFile)?;
    let content_type = fields
        .content_type
        .clone()
        .or_else(|| sniff(&stored.head).map(str::to_string))
        .or_else(|| {
            file_name
                .as_deref()
                .and_then(|name| mime_guess::from_path(name).first_raw())
                .map(str::to_string)
        })
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

    let cid = stored.cid.to_string();
    let record = ContentRecord {
        cid: cid.clone(),
        content_type,
        alt: fields.alt,
        media_type: fields.media_type,
        sha256: stored.sha256.clone(),
        size: i64::try_from(stored.size).unwrap_or(i64::MAX),
        created_at: chrono::Utc::now().timestamp(),
    };
    if let Err(e) = record_upload(&state, &record, &pubkey).await {
        // A file nobody owns would never be collected
        if stored.created {
            if let Err(remove) = state.store().remove(&stored.cid).await {
                tracing::error!(cid = %cid, "failed to discard unrecorded upload: {}", remove);
            }
        }
        return Err(e.into());
    }

    tracing::info!(
        cid = %cid,
        pubkey = %pubkey,
        size = stored.size,
        content_type = %record.content_type,
        "uploaded"
    );

    let url = origin.content_url(state.gateway_label(), &cid);
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            status: "success",
            message: "created",
            nip94_event: Nip94Event {
                tags: vec![
                    ["url".to_string(), url],
                    ["ox".to_string(), stored.sha256],
                    ["cid".to_string(), cid],
                ],
            },
        }),
    ))
}

async fn record_upload(
    state: &ServiceState,
    record: &ContentRecord,
    pubkey: &str,
) -> Result<(), sqlx::Error> {
    state.database().insert_content(record).await?;
    state.database().add_owner(&record.cid, pubkey).await
}

fn non_empty(value: String) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error(transparent)]
    Unauthorized(#[from] AuthError),
    #[error("No file uploaded.")]
    NoFile,
    #[error("Malformed upload: {0}")]
    Multipart(#[from] MultipartError),
    #[error("Could not move file.")]
    Storage(#[from] StorageError),
    #[error("Could not record upload.")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let status = match &self {
            UploadError::Unauthorized(e) => {
                tracing::warn!("401 for upload: {}", e);
                StatusCode::UNAUTHORIZED
            }
            UploadError::NoFile | UploadError::Multipart(_) => {
                tracing::warn!("400 for upload: {}", self);
                StatusCode::BAD_REQUEST
            }
            UploadError::Storage(e) => {
                tracing::error!("upload storage failure: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            UploadError::Database(e) => {
                tracing::error!("upload database failure: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = serde_json::json!({"error": self.to_string()});
        (status, Json(body)).into_response()
    }
}
