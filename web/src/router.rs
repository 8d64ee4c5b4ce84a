use crate::{
    controller::{health_check_controller, notification_controller},
    middleware::auth::{require_api_key, API_KEY_HEADER},
    sse,
};
use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use log::*;
use service::{config::Config, AppState};
use tower_http::cors::CorsLayer;

pub fn define_routes(app_state: AppState) -> Router {
    let cors = cors_layer(&app_state.config);

    Router::new()
        .merge(health_routes())
        .merge(notification_routes(app_state.clone()))
        .merge(sse_routes(app_state))
        .layer(cors)
}

/// CORS policy for browser clients served from `allowed_origins`.
pub fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {origin}");
                None
            }
        })
        .collect();

    let mut headers = vec![header::CONTENT_TYPE, HeaderName::from_static(API_KEY_HEADER)];
    match HeaderName::try_from(config.auth_user_header()) {
        Ok(name) => headers.push(name),
        Err(e) => warn!(
            "Invalid auth user header {}: {e}",
            config.auth_user_header()
        ),
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(headers)
        .allow_credentials(true)
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}

/// Event ingestion, guarded by the optional shared API key
fn notification_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/notifications", post(notification_controller::create))
        .route_layer(from_fn_with_state(app_state.clone(), require_api_key))
        .with_state(app_state)
}

/// Long-lived notification stream, one per authenticated user
fn sse_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/notifications/stream", get(sse::handler::sse_handler))
        .with_state(app_state)
}
