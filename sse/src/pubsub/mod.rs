//! Pub/Sub bridge for running the relay across several server processes.
//!
//! Every outbound event is published to one shared channel. Each process
//! subscribes to that channel and delivers the events whose target user holds
//! a connection in its local registry, including events it published itself.
//!
//! Delivery is best-effort and at-most-once: no acknowledgement, no retry,
//! no replay.

mod memory;
mod redis_broker;

pub use self::memory::MemoryBroker;
pub use self::redis_broker::RedisBroker;

use crate::connection::ConnectionRegistry;
use crate::error::Error;
use crate::message::{Envelope, Frame};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use log::*;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Channel used for all relayed events unless configured otherwise.
pub const DEFAULT_CHANNEL: &str = "notifications";

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Stream of raw message payloads received on a subscribed channel.
pub type MessageStream = BoxStream<'static, String>;

/// A publish/subscribe facility shared by all relay instances.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(&self, channel: &str, payload: String) -> Result<(), Error>;

    /// Subscribe to `channel`. Once this returns, subsequent publishes on the
    /// channel are deliverable to the returned stream. The stream ends when the
    /// underlying connection is lost.
    async fn subscribe(&self, channel: &str) -> Result<MessageStream, Error>;
}

/// Publisher and subscriber roles bound to one channel.
pub struct PubSubBridge {
    broker: Arc<dyn Broker>,
    channel: String,
    subscriber: JoinHandle<()>,
}

impl PubSubBridge {
    /// Subscribe to `channel` and start delivering received events into
    /// `registry`. Returns only after the subscription is active, so events
    /// published afterwards are not lost to startup.
    pub async fn start(
        broker: Arc<dyn Broker>,
        channel: impl Into<String>,
        registry: Weak<ConnectionRegistry>,
    ) -> Result<Self, Error> {
        let channel = channel.into();
        let messages = broker.subscribe(&channel).await?;
        info!("Subscribed to pub/sub channel {channel}");

        let subscriber = tokio::spawn(run_subscriber(
            Arc::clone(&broker),
            channel.clone(),
            messages,
            registry,
        ));

        Ok(Self {
            broker,
            channel,
            subscriber,
        })
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub async fn publish(&self, envelope: &Envelope) -> Result<(), Error> {
        let payload = envelope.to_json()?;
        self.broker.publish(&self.channel, payload).await
    }
}

impl Drop for PubSubBridge {
    fn drop(&mut self) {
        self.subscriber.abort();
    }
}

/// Deliver a raw broker message to the local registry. Malformed messages are
/// dropped. Returns whether a local connection received it.
pub(crate) fn deliver_message(registry: &ConnectionRegistry, raw: &str) -> bool {
    match Envelope::parse(raw) {
        Ok(envelope) => registry.send_to_user(&envelope.user_id, &Frame::Data(envelope.data)),
        Err(e) => {
            warn!("Dropping malformed pub/sub message: {e}");
            false
        }
    }
}

async fn run_subscriber(
    broker: Arc<dyn Broker>,
    channel: String,
    mut messages: MessageStream,
    registry: Weak<ConnectionRegistry>,
) {
    loop {
        while let Some(raw) = messages.next().await {
            let Some(registry) = registry.upgrade() else {
                return;
            };
            if deliver_message(&registry, &raw) {
                debug!("Delivered pub/sub event from channel {channel}");
            }
        }

        error!("Pub/sub stream for channel {channel} ended, resubscribing");

        loop {
            tokio::time::sleep(RECONNECT_DELAY).await;
            if registry.strong_count() == 0 {
                return;
            }
            match broker.subscribe(&channel).await {
                Ok(stream) => {
                    info!("Resubscribed to pub/sub channel {channel}");
                    messages = stream;
                    break;
                }
                Err(e) => error!("Failed to resubscribe to channel {channel}: {e}"),
            }
        }
    }
}
