//! Test doubles shared by the relay's unit tests.
use crate::connection::StreamHandle;
use crate::error::{BrokerErrorKind, Error, ErrorKind};
use crate::message::Frame;
use crate::pubsub::{Broker, MemoryBroker, MessageStream};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Stream handle that records every frame written and every `end` call.
#[derive(Default)]
pub(crate) struct RecordingStream {
    frames: Mutex<Vec<Frame>>,
    attempts: AtomicUsize,
    ends: AtomicUsize,
    failing: AtomicBool,
}

impl RecordingStream {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every subsequent write fails as if the client had gone away.
    pub(crate) fn fail_writes(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub(crate) fn frames(&self) -> Vec<Frame> {
        self.frames.lock().unwrap().clone()
    }

    pub(crate) fn data_frames(&self) -> Vec<Frame> {
        self.frames()
            .into_iter()
            .filter(|frame| !frame.is_heartbeat())
            .collect()
    }

    pub(crate) fn heartbeat_count(&self) -> usize {
        self.frames()
            .iter()
            .filter(|frame| frame.is_heartbeat())
            .count()
    }

    /// Writes attempted, successful or not.
    pub(crate) fn write_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn end_count(&self) -> usize {
        self.ends.load(Ordering::SeqCst)
    }
}

impl StreamHandle for RecordingStream {
    fn write(&self, frame: &Frame) -> Result<(), Error> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::stream_closed());
        }
        self.frames.lock().unwrap().push(frame.clone());
        Ok(())
    }

    fn end(&self) {
        self.ends.fetch_add(1, Ordering::SeqCst);
    }
}

/// In-memory broker that also records every publish call.
#[derive(Default)]
pub(crate) struct RecordingBroker {
    inner: MemoryBroker,
    published: Mutex<Vec<(String, String)>>,
    failing: AtomicBool,
    losing_replies: AtomicBool,
}

impl RecordingBroker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every subsequent publish fails as if the backend were unreachable.
    pub(crate) fn fail_publishes(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// Every subsequent publish reaches subscribers but still reports an
    /// error, as when the broker's reply is lost.
    pub(crate) fn lose_replies(&self) {
        self.losing_replies.store(true, Ordering::SeqCst);
    }

    /// `(channel, payload)` for every publish that reached the broker, in call order.
    pub(crate) fn published(&self) -> Vec<(String, String)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl Broker for RecordingBroker {
    async fn publish(&self, channel: &str, payload: String) -> Result<(), Error> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(publish_error());
        }
        self.published
            .lock()
            .unwrap()
            .push((channel.to_string(), payload.clone()));
        self.inner.publish(channel, payload).await?;

        if self.losing_replies.load(Ordering::SeqCst) {
            return Err(publish_error());
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<MessageStream, Error> {
        self.inner.subscribe(channel).await
    }
}

fn publish_error() -> Error {
    Error {
        source: None,
        error_kind: ErrorKind::Broker(BrokerErrorKind::Publish),
    }
}
