use crate::controller::ApiResponse;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use events::DomainEvent;
use log::*;
use service::AppState;

/// POST ingest a domain event and relay it to every user it notifies.
///
/// Delivery is best effort. The request is accepted once the event has been
/// handed to the relay, whether or not any recipient is currently connected.
pub async fn create(
    State(app_state): State<AppState>,
    Json(event): Json<DomainEvent>,
) -> impl IntoResponse {
    debug!(
        "Ingesting {} event for {} user(s)",
        event.name(),
        event.notify_user_ids().len()
    );

    app_state.event_publisher.publish(event).await;

    (
        StatusCode::ACCEPTED,
        Json(ApiResponse::<()>::no_content(StatusCode::ACCEPTED.into())),
    )
}
