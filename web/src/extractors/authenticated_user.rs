use crate::extractors::RejectionType;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use log::*;
use service::AppState;
use sse::connection::UserId;

/// Identity of the caller, as asserted by the upstream authentication layer.
pub(crate) struct AuthenticatedUser(pub UserId);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = RejectionType;

    // The gateway in front of the relay authenticates the request and forwards
    // the user id in the configured header. A missing or blank header means the
    // request never went through authentication.
    async fn from_request_parts(
        parts: &mut Parts,
        app_state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = app_state.config.auth_user_header();

        let user_id = parts
            .headers
            .get(header)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty());

        match user_id {
            Some(user_id) => Ok(AuthenticatedUser(user_id.to_string())),
            None => {
                trace!("Rejecting request without a {header} header");
                Err((StatusCode::UNAUTHORIZED, "Unauthorized".to_string()))
            }
        }
    }
}
