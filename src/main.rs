use log::{error, info};
use service::{config::Config, logging::Logger};

#[tokio::main]
async fn main() {
    let config = Config::new();
    Logger::init_logger(&config as &Config);

    info!(
        "Starting Biltip notification relay [{}]...",
        config.runtime_env
    );

    let sse_manager = service::init_relay(&config).await;
    let app_state = service::AppState::new(config, &sse_manager);

    if let Err(e) = web::init_server(app_state).await {
        error!("Notification relay stopped with an error: {e}");
        std::process::exit(1);
    }

    info!("Notification relay shut down");
}
