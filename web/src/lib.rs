use log::*;
use service::AppState;
use ::sse::Manager;
use std::sync::Arc;
use tokio::net::TcpListener;

mod controller;
mod extractors;
pub mod router;
pub(crate) mod sse;

pub(crate) mod middleware {
    pub(crate) mod auth;
}

/// Bind the configured interface and serve the relay's HTTP surface until
/// Ctrl-C is received.
pub async fn init_server(app_state: AppState) -> std::io::Result<()> {
    let server_url = format!(
        "{}:{}",
        app_state.config.interface(),
        app_state.config.port
    );
    let listener = TcpListener::bind(&server_url).await?;

    info!("Server starting... listening for connections on http://{server_url}");

    let sse_manager = Arc::clone(&app_state.sse_manager);
    let app = router::define_routes(app_state);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(sse_manager))
        .await
}

// Open streams never finish on their own, so they are closed here to let the
// graceful shutdown complete.
async fn shutdown_signal(sse_manager: Arc<Manager>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for the shutdown signal: {e}");
        // Never resolve so the server keeps running
        std::future::pending::<()>().await;
    }

    info!(
        "Shutdown requested, closing {} SSE connection(s)",
        sse_manager.connection_count()
    );
    sse_manager.close_all();
}
