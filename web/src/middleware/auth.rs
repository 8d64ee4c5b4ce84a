use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use log::*;
use service::AppState;

/// Header carrying the shared secret for event ingestion.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Requires the configured ingest API key on the request.
///
/// Returns 401 Unauthorized when the key is missing or wrong. When no key is
/// configured the request passes through untouched.
pub async fn require_api_key(
    State(app_state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = app_state.config.ingest_api_key() else {
        return next.run(request).await;
    };

    let authorized = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        == Some(expected);

    if authorized {
        next.run(request).await
    } else {
        warn!("Rejected event ingestion with a missing or invalid API key");
        (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
    }
}
