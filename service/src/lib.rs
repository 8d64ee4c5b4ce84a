use config::Config;
use events::EventPublisher;
use log::{error, info, warn};
use sse::pubsub::RedisBroker;
use sse::{Manager, SseDomainEventHandler};
use std::sync::Arc;

pub mod config;
pub mod logging;

/// Build the notification relay described by `config`.
///
/// With a Redis URL the relay fans out through the shared pub/sub channel.
/// If Redis cannot be reached the relay falls back to local-only delivery
/// rather than failing startup.
pub async fn init_relay(config: &Config) -> Arc<Manager> {
    info!(
        "Relay config: heartbeat_interval={}s, pubsub_channel={}, pubsub_enabled={}",
        config.heartbeat_interval_secs,
        config.pubsub_channel(),
        config.redis_url().is_some(),
    );

    let Some(redis_url) = config.redis_url() else {
        return Arc::new(Manager::local(config.heartbeat_interval()));
    };

    let broker = match RedisBroker::connect(redis_url).await {
        Ok(broker) => Arc::new(broker),
        Err(e) => {
            error!("Failed to connect to Redis pub/sub backend: {e}");
            warn!("Continuing with local-only notification delivery");
            return Arc::new(Manager::local(config.heartbeat_interval()));
        }
    };

    match Manager::with_broker(broker, config.pubsub_channel(), config.heartbeat_interval()).await
    {
        Ok(manager) => Arc::new(manager),
        Err(e) => {
            error!(
                "Failed to subscribe to pub/sub channel {}: {e}",
                config.pubsub_channel()
            );
            warn!("Continuing with local-only notification delivery");
            Arc::new(Manager::local(config.heartbeat_interval()))
        }
    }
}

// Service-level state shared by every request handler.
// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub sse_manager: Arc<Manager>,
    pub event_publisher: EventPublisher,
}

impl AppState {
    /// Wires the relay into the event publisher so every published domain
    /// event reaches the notified users' streams.
    pub fn new(app_config: Config, sse_manager: &Arc<Manager>) -> Self {
        let event_publisher = EventPublisher::new()
            .with_handler(Arc::new(SseDomainEventHandler::new(Arc::clone(sse_manager))));

        Self {
            config: app_config,
            sse_manager: Arc::clone(sse_manager),
            event_publisher,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(args: &[&str]) -> Config {
        let mut argv = vec!["biltip_relay"];
        argv.extend_from_slice(args);
        Config::from_args(argv).unwrap()
    }

    #[tokio::test]
    async fn test_init_relay_without_redis_is_local_only() {
        let manager = init_relay(&config(&["--heartbeat-interval-secs", "15"])).await;
        assert!(!manager.is_distributed());
        assert_eq!(manager.heartbeat_interval().as_secs(), 15);
    }

    #[tokio::test]
    async fn test_init_relay_with_invalid_redis_url_falls_back_to_local() {
        let manager = init_relay(&config(&["--redis-url", "definitely not a url"])).await;
        assert!(!manager.is_distributed());
    }

    #[tokio::test]
    async fn test_app_state_registers_relay_handler() {
        let manager = Arc::new(Manager::new());
        let state = AppState::new(config(&[]), &manager);
        assert_eq!(state.event_publisher.handler_count(), 1);
        assert!(Arc::ptr_eq(&state.sse_manager, &manager));
    }
}
