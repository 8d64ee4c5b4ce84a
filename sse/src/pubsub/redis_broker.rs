//! Redis Pub/Sub broker.
//!
//! Redis forbids regular commands on a connection in Pub/Sub mode, so two
//! kinds of connection are kept:
//!
//! - a `MultiplexedConnection`, cloned per call, used only for `PUBLISH`.
//!   A failed publish replaces it with a fresh connection, so publishing
//!   recovers once the backend is reachable again
//! - a dedicated `aio::PubSub` connection per subscription, consumed into a
//!   message stream that ends when the connection is lost

use super::{Broker, MessageStream};
use crate::error::{BrokerErrorKind, Error};
use async_trait::async_trait;
use futures::StreamExt;
use log::*;
use redis::aio::MultiplexedConnection;
use redis::Client;
use tokio::sync::RwLock;

pub struct RedisBroker {
    client: Client,
    publish_conn: RwLock<MultiplexedConnection>,
}

impl RedisBroker {
    /// Connect eagerly so a misconfigured or unreachable backend is detected
    /// at startup.
    pub async fn connect(url: &str) -> Result<Self, Error> {
        let client = Client::open(url)?;
        let publish_conn = client.get_multiplexed_async_connection().await?;

        info!("Connected to Redis pub/sub backend");

        Ok(Self {
            client,
            publish_conn: RwLock::new(publish_conn),
        })
    }

    async fn reconnect_publisher(&self) {
        match self.client.get_multiplexed_async_connection().await {
            Ok(conn) => {
                *self.publish_conn.write().await = conn;
                info!("Reconnected Redis publish connection");
            }
            Err(e) => warn!("Failed to reconnect Redis publish connection: {e}"),
        }
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn publish(&self, channel: &str, payload: String) -> Result<(), Error> {
        let mut conn = self.publish_conn.read().await.clone();

        match redis::cmd("PUBLISH")
            .arg(channel)
            .arg(&payload)
            .query_async::<i64>(&mut conn)
            .await
        {
            Ok(receivers) => {
                trace!("Published to {channel}, received by {receivers} subscriber(s)");
                Ok(())
            }
            Err(e) => {
                // The publish is not retried; only the next one uses the new connection.
                self.reconnect_publisher().await;
                Err(Error::broker(BrokerErrorKind::Publish, e))
            }
        }
    }

    async fn subscribe(&self, channel: &str) -> Result<MessageStream, Error> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| Error::broker(BrokerErrorKind::Subscribe, e))?;

        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| Error::broker(BrokerErrorKind::Subscribe, e))?;

        let messages = pubsub
            .into_on_message()
            .filter_map(|msg| async move {
                match msg.get_payload::<String>() {
                    Ok(payload) => Some(payload),
                    Err(e) => {
                        warn!(
                            "Dropping non-text message on channel {}: {e}",
                            msg.get_channel_name()
                        );
                        None
                    }
                }
            })
            .boxed();

        Ok(messages)
    }
}
