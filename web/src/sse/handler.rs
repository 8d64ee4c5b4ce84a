use crate::extractors::authenticated_user::AuthenticatedUser;
use async_stream::stream;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use log::*;
use service::AppState;
use sse::connection::{ChannelStream, ConnectionId, UserId};
use sse::Manager;
use std::convert::Infallible;
use std::sync::Arc;

/// Removes the connection from the relay once the response body is dropped,
/// which is how axum reports that the client went away.
struct ConnectionGuard {
    manager: Arc<Manager>,
    user_id: UserId,
    connection_id: ConnectionId,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        debug!(
            "SSE connection {} closed for user {}, cleaning up",
            self.connection_id.as_str(),
            self.user_id
        );
        self.manager
            .remove_connection(&self.user_id, &self.connection_id);
    }
}

/// SSE handler that establishes a long-lived notification stream.
/// One connection per authenticated user; a newer one supersedes the old.
pub(crate) async fn sse_handler(
    AuthenticatedUser(user_id): AuthenticatedUser,
    State(app_state): State<AppState>,
) -> Response {
    debug!("Establishing SSE connection for user {user_id}");

    let (handle, mut rx) = ChannelStream::channel();

    let connection_id = app_state.sse_manager.add_client(user_id.clone(), handle);

    let guard = ConnectionGuard {
        manager: Arc::clone(&app_state.sse_manager),
        user_id,
        connection_id,
    };

    // Frames arrive already encoded. The channel closes when the relay ends
    // the connection; the guard covers the client hanging up first.
    let body = stream! {
        let _guard = guard;
        while let Some(frame) = rx.recv().await {
            yield Ok::<Bytes, Infallible>(frame);
        }
    };

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Body::from_stream(body),
    )
        .into_response()
}
