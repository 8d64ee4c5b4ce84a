use crate::error::Error;
use crate::heartbeat::Heartbeat;
use crate::message::Frame;
use axum::body::Bytes;
use dashmap::DashMap;
use log::*;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

// Type alias for user IDs (identity comes from the upstream auth layer)
pub type UserId = String;

/// Unique identifier for a connection (server-generated)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Write-and-close capable output sink for one client's streaming connection.
///
/// A failed `write` means the connection is dead; the registry reacts by
/// tearing it down. `end` finishes the underlying response.
pub trait StreamHandle: Send + Sync {
    fn write(&self, frame: &Frame) -> Result<(), Error>;
    fn end(&self);
}

/// Stream handle backed by an unbounded channel. The receiving half is
/// drained by the HTTP response body; ending the handle drops the sender so
/// the body finishes.
pub struct ChannelStream {
    sender: Mutex<Option<UnboundedSender<Bytes>>>,
}

impl ChannelStream {
    pub fn channel() -> (Arc<Self>, UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let stream = Arc::new(Self {
            sender: Mutex::new(Some(tx)),
        });
        (stream, rx)
    }
}

impl StreamHandle for ChannelStream {
    fn write(&self, frame: &Frame) -> Result<(), Error> {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match sender.as_ref() {
            Some(tx) => tx
                .send(frame.to_bytes())
                .map_err(|_| Error::stream_closed()),
            None => Err(Error::stream_closed()),
        }
    }

    fn end(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// A live registry entry. Owns the heartbeat timer, which never outlives it.
struct Connection {
    id: ConnectionId,
    stream: Arc<dyn StreamHandle>,
    heartbeat: Heartbeat,
}

impl Connection {
    /// The single teardown path: cancel the timer, then end the stream.
    /// Consuming `self` guarantees it runs at most once per connection.
    fn close(self) {
        let Connection {
            id,
            stream,
            heartbeat,
        } = self;
        heartbeat.cancel();
        stream.end();
        debug!("Closed SSE connection {}", id.as_str());
    }
}

/// In-memory registry of live connections, at most one per user.
pub struct ConnectionRegistry {
    connections: DashMap<UserId, Connection>,
    heartbeat_interval: Duration,
}

impl ConnectionRegistry {
    pub fn new(heartbeat_interval: Duration) -> Self {
        Self {
            connections: DashMap::new(),
            heartbeat_interval,
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    /// Register a connection for `user_id`, superseding (and closing) any
    /// previous one. Writes the initial frame and starts heartbeating.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn register(
        self: &Arc<Self>,
        user_id: UserId,
        stream: Arc<dyn StreamHandle>,
    ) -> ConnectionId {
        let connection_id = ConnectionId::new();

        let heartbeat = Heartbeat::spawn(
            Arc::downgrade(self),
            user_id.clone(),
            connection_id.clone(),
            Arc::clone(&stream),
            self.heartbeat_interval,
        );

        let connection = Connection {
            id: connection_id.clone(),
            stream: Arc::clone(&stream),
            heartbeat,
        };

        if let Some(previous) = self.connections.insert(user_id.clone(), connection) {
            info!(
                "Connection {} for user {} superseded by {}",
                previous.id.as_str(),
                user_id,
                connection_id.as_str()
            );
            previous.close();
        }

        if let Err(e) = stream.write(&Frame::connected()) {
            warn!(
                "Failed to write initial frame to connection {}: {}. Removing it.",
                connection_id.as_str(),
                e
            );
            self.unregister(&user_id, &connection_id);
        }

        connection_id
    }

    /// Remove whatever connection `user_id` currently holds. Idempotent.
    pub fn unregister_user(&self, user_id: &str) -> bool {
        match self.connections.remove(user_id) {
            Some((_, connection)) => {
                connection.close();
                true
            }
            None => false,
        }
    }

    /// Remove the connection only if it is still the current one for `user_id`.
    /// Teardown triggered by a specific transport must not evict a newer connection.
    pub fn unregister(&self, user_id: &str, connection_id: &ConnectionId) -> bool {
        match self
            .connections
            .remove_if(user_id, |_, connection| &connection.id == connection_id)
        {
            Some((_, connection)) => {
                connection.close();
                true
            }
            None => false,
        }
    }

    /// Close every connection, e.g. on shutdown. Returns how many were closed.
    pub fn unregister_all(&self) -> usize {
        let user_ids: Vec<UserId> = self
            .connections
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        user_ids
            .iter()
            .filter(|user_id| self.unregister_user(user_id))
            .count()
    }

    /// Write a frame to the user's connection. Returns whether it was written.
    /// A failed write tears the connection down; the error is not propagated.
    pub fn send_to_user(&self, user_id: &str, frame: &Frame) -> bool {
        let (connection_id, stream) = match self.connections.get(user_id) {
            Some(entry) => (entry.id.clone(), Arc::clone(&entry.stream)),
            None => {
                trace!("No local connection for user {user_id}");
                return false;
            }
        };

        match stream.write(frame) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "Failed to send event to connection {}: {}. Connection will be cleaned up.",
                    connection_id.as_str(),
                    e
                );
                self.unregister(user_id, &connection_id);
                false
            }
        }
    }

    pub fn is_connected(&self, user_id: &str) -> bool {
        self.connections.contains_key(user_id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heartbeat::DEFAULT_HEARTBEAT_INTERVAL;
    use crate::test_support::RecordingStream;
    use serde_json::json;

    fn registry() -> Arc<ConnectionRegistry> {
        Arc::new(ConnectionRegistry::new(DEFAULT_HEARTBEAT_INTERVAL))
    }

    #[tokio::test]
    async fn test_register_writes_initial_frame() {
        let registry = registry();
        let stream = RecordingStream::new();

        registry.register("u1".to_string(), stream.clone());

        assert!(registry.is_connected("u1"));
        assert_eq!(stream.frames(), vec![Frame::connected()]);
        assert_eq!(stream.end_count(), 0);
    }

    #[tokio::test]
    async fn test_send_to_user_without_connection_is_noop() {
        let registry = registry();
        assert!(!registry.send_to_user("nobody", &Frame::Data(json!({"a": 1}))));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_send_to_user_writes_exactly_one_frame() {
        let registry = registry();
        let stream = RecordingStream::new();
        registry.register("u1".to_string(), stream.clone());

        let frame = Frame::Data(json!({"msg": "hi"}));
        assert!(registry.send_to_user("u1", &frame));

        assert_eq!(stream.data_frames(), vec![Frame::connected(), frame]);
    }

    #[tokio::test]
    async fn test_failed_write_tears_down_connection() {
        let registry = registry();
        let stream = RecordingStream::new();
        registry.register("u1".to_string(), stream.clone());
        stream.fail_writes();

        assert!(!registry.send_to_user("u1", &Frame::Data(json!(1))));
        assert!(!registry.is_connected("u1"));
        assert_eq!(stream.end_count(), 1);

        let writes_before = stream.write_attempts();
        assert!(!registry.send_to_user("u1", &Frame::Data(json!(2))));
        assert_eq!(stream.write_attempts(), writes_before);
    }

    #[tokio::test]
    async fn test_unregister_user_is_idempotent() {
        let registry = registry();
        let stream = RecordingStream::new();
        registry.register("u1".to_string(), stream.clone());

        assert!(registry.unregister_user("u1"));
        assert!(!registry.unregister_user("u1"));
        assert_eq!(stream.end_count(), 1);
        assert!(!registry.is_connected("u1"));
    }

    #[tokio::test]
    async fn test_register_supersedes_and_closes_previous_connection() {
        let registry = registry();
        let first = RecordingStream::new();
        let second = RecordingStream::new();

        let first_id = registry.register("u1".to_string(), first.clone());
        registry.register("u1".to_string(), second.clone());

        assert_eq!(first.end_count(), 1);
        assert_eq!(registry.len(), 1);

        // A late disconnect from the first connection must not evict the second.
        assert!(!registry.unregister("u1", &first_id));
        assert!(registry.is_connected("u1"));

        registry.send_to_user("u1", &Frame::Data(json!("x")));
        assert_eq!(first.data_frames(), vec![Frame::connected()]);
        assert_eq!(second.data_frames().len(), 2);
    }

    #[tokio::test]
    async fn test_register_with_dead_stream_is_removed_on_first_write() {
        let registry = registry();
        let stream = RecordingStream::new();
        stream.fail_writes();

        registry.register("u1".to_string(), stream.clone());

        assert!(!registry.is_connected("u1"));
        assert_eq!(stream.end_count(), 1);
    }

    #[tokio::test]
    async fn test_unregister_all_closes_every_connection() {
        let registry = registry();
        let streams: Vec<_> = (0..3).map(|_| RecordingStream::new()).collect();
        for (i, stream) in streams.iter().enumerate() {
            registry.register(format!("u{i}"), stream.clone());
        }

        assert_eq!(registry.unregister_all(), 3);
        assert!(registry.is_empty());
        assert!(streams.iter().all(|stream| stream.end_count() == 1));
        assert_eq!(registry.unregister_all(), 0);
    }

    #[tokio::test]
    async fn test_channel_stream_write_after_end_fails() {
        let (stream, mut rx) = ChannelStream::channel();

        stream.write(&Frame::Data(json!({"n": 1}))).unwrap();
        stream.end();

        assert_eq!(rx.recv().await.unwrap(), Bytes::from("data: {\"n\":1}\n\n"));
        assert!(rx.recv().await.is_none());
        assert!(stream.write(&Frame::Heartbeat).is_err());
    }

    #[tokio::test]
    async fn test_channel_stream_write_fails_when_receiver_dropped() {
        let (stream, rx) = ChannelStream::channel();
        drop(rx);
        assert!(stream.write(&Frame::Heartbeat).is_err());
    }
}
