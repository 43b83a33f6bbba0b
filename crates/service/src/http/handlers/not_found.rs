use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

/// The JSON body used for every unknown resource
pub fn not_found() -> Response {
    let body = serde_json::json!({"status": "failure", "message": "Not found!"});
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}

/// Router fallback: JSON for API clients, plain text otherwise
pub async fn not_found_handler(headers: HeaderMap) -> Response {
    let wants_json = headers
        .get(axum::http::header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("application/json"));

    if wants_json {
        not_found()
    } else {
        (
            StatusCode::NOT_FOUND,
            [(axum::http::header::CONTENT_TYPE, "text/plain")],
            "Not found!",
        )
            .into_response()
    }
}
