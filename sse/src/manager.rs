use crate::connection::{ConnectionId, ConnectionRegistry, StreamHandle, UserId};
use crate::error::Error;
use crate::heartbeat::DEFAULT_HEARTBEAT_INTERVAL;
use crate::message::{Envelope, Frame};
use crate::pubsub::{Broker, PubSubBridge};
use log::*;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub struct Manager {
    registry: Arc<ConnectionRegistry>,
    bridge: Option<PubSubBridge>,
}

impl Manager {
    /// Local-only relay with the default heartbeat interval.
    pub fn new() -> Self {
        Self::local(DEFAULT_HEARTBEAT_INTERVAL)
    }

    /// Local-only relay: events are written straight to this process's connections.
    pub fn local(heartbeat_interval: Duration) -> Self {
        Self {
            registry: Arc::new(ConnectionRegistry::new(heartbeat_interval)),
            bridge: None,
        }
    }

    /// Relay fanned out through `broker`. Returns once the subscription on
    /// `channel` is active.
    pub async fn with_broker(
        broker: Arc<dyn Broker>,
        channel: impl Into<String>,
        heartbeat_interval: Duration,
    ) -> Result<Self, Error> {
        let registry = Arc::new(ConnectionRegistry::new(heartbeat_interval));
        let bridge = PubSubBridge::start(broker, channel, Arc::downgrade(&registry)).await?;

        Ok(Self {
            registry,
            bridge: Some(bridge),
        })
    }

    pub fn is_distributed(&self) -> bool {
        self.bridge.is_some()
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.registry.heartbeat_interval()
    }

    /// Register a new connection and return its unique ID
    pub fn add_client(&self, user_id: UserId, stream: Arc<dyn StreamHandle>) -> ConnectionId {
        let connection_id = self.registry.register(user_id.clone(), stream);
        info!(
            "Registered SSE connection {} for user {}",
            connection_id.as_str(),
            user_id
        );
        connection_id
    }

    /// Close and forget the user's current connection, if any.
    pub fn remove_client(&self, user_id: &str) {
        if self.registry.unregister_user(user_id) {
            info!("Removed SSE connection for user {user_id}");
        }
    }

    /// Close a specific connection, unless it has already been superseded.
    pub fn remove_connection(&self, user_id: &str, connection_id: &ConnectionId) {
        if self.registry.unregister(user_id, connection_id) {
            info!(
                "Unregistered SSE connection {} for user {}",
                connection_id.as_str(),
                user_id
            );
        }
    }

    /// End every open stream so HTTP responses can finish during shutdown.
    pub fn close_all(&self) {
        let closed = self.registry.unregister_all();
        info!("Closed {closed} SSE connection(s)");
    }

    /// Deliver `payload` to `user_id`, at most once and best-effort.
    ///
    /// Never fails: dead connections are torn down, missing subscribers are
    /// ignored and broker failures are logged. With a broker, delivery always
    /// goes through the shared channel, including to this process.
    pub async fn send_event(&self, user_id: &str, payload: Value) {
        if user_id.is_empty() {
            warn!("Dropping event addressed to an empty user id");
            return;
        }

        let Some(bridge) = &self.bridge else {
            self.deliver_local(user_id, payload);
            return;
        };

        // The subscriber is the only delivery path here. A failed publish may
        // still have reached the broker, so the event is not retried locally.
        let envelope = Envelope::new(user_id, payload);
        if let Err(e) = bridge.publish(&envelope).await {
            warn!(
                "Failed to publish event for user {} on channel {}: {}. Event dropped.",
                user_id,
                bridge.channel(),
                e
            );
        }
    }

    fn deliver_local(&self, user_id: &str, payload: Value) {
        if self.registry.send_to_user(user_id, &Frame::Data(payload)) {
            debug!("Delivered SSE event to user {user_id}");
        }
    }

    pub fn is_connected(&self, user_id: &str) -> bool {
        self.registry.is_connected(user_id)
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}
