use super::{Broker, MessageStream};
use crate::error::Error;
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};

/// In-process broker.
///
/// Lets several relay instances share a channel without a network broker,
/// e.g. in tests or local development. Subscriptions are registered
/// immediately, delivery is fanout to every live subscriber of the channel,
/// and closed subscriber streams are pruned on the next publish.
#[derive(Default)]
pub struct MemoryBroker {
    subscriptions: RwLock<HashMap<String, Vec<mpsc::UnboundedSender<String>>>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscriber_count(&self, channel: &str) -> usize {
        self.subscriptions
            .read()
            .await
            .get(channel)
            .map_or(0, |senders| senders.iter().filter(|tx| !tx.is_closed()).count())
    }

    /// Ends every subscriber stream, simulating a lost broker connection.
    pub async fn disconnect_all(&self) {
        self.subscriptions.write().await.clear();
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, channel: &str, payload: String) -> Result<(), Error> {
        let mut subscriptions = self.subscriptions.write().await;
        if let Some(senders) = subscriptions.get_mut(channel) {
            senders.retain(|tx| tx.send(payload.clone()).is_ok());
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<MessageStream, Error> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscriptions
            .write()
            .await
            .entry(channel.to_string())
            .or_default()
            .push(tx);

        let messages = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|payload| (payload, rx))
        });
        Ok(messages.boxed())
    }
}
