//! Real-time notification relay for Biltip.
//!
//! Pushes JSON events to users over long-lived Server-Sent-Events
//! connections, optionally fanned out across several server processes through
//! a publish/subscribe backend.
//!
//! # Architecture
//!
//! - **One connection per user**: the registry holds at most one live
//!   connection per user. A new connection supersedes (and closes) the old one.
//! - **Heartbeats**: every connection owns a timer writing an
//!   `event: heartbeat` frame every 30 seconds (configurable) so proxies do not
//!   drop idle connections. The timer dies with its registry entry.
//! - **Ephemeral, at-most-once delivery**: offline users miss events. There is
//!   no acknowledgement, retry or replay.
//! - **Optional pub/sub fan-out**: with a broker configured, every event is
//!   published to one shared channel, and every instance delivers what it
//!   receives to its own local connections.
//!
//! # Message Flow
//!
//! 1. A client opens `GET /notifications/stream`; the web layer authenticates
//!    it and calls `Manager::add_client` with a [`connection::ChannelStream`]
//! 2. The registry writes `{"type":"connected"}` and starts heartbeating
//! 3. Business logic publishes a `DomainEvent`; [`SseDomainEventHandler`]
//!    turns it into a payload and calls `Manager::send_event` per user
//! 4. Locally, the payload is written as `data: <json>\n\n`; with a broker it
//!    is published as `{"userId": ..., "data": ...}` and written by whichever
//!    instance holds the user's connection
//! 5. A failed write, a client disconnect or `remove_client` tears the
//!    connection down: timer cancelled, stream ended, entry removed
//!
//! # Example: Sending an event
//!
//! ```rust,ignore
//! app_state
//!     .sse_manager
//!     .send_event(&recipient_id, json!({"type": "reminder_sent", "data": {...}}))
//!     .await;
//! ```
//!
//! # Modules
//!
//! - `connection`: ConnectionRegistry, stream handles and type-safe ConnectionId
//! - `heartbeat`: per-connection keep-alive timer
//! - `manager`: event dispatch over local delivery or the pub/sub bridge
//! - `message`: streaming frames, typed event payloads and the pub/sub envelope
//! - `pubsub`: Broker trait with Redis and in-memory implementations
//! - `domain_event_handler`: bridges `events::DomainEvent` into the relay

pub mod connection;
pub mod domain_event_handler;
pub mod error;
pub mod heartbeat;
pub mod manager;
pub mod message;
pub mod pubsub;

#[cfg(test)]
pub(crate) mod test_support;

pub use domain_event_handler::SseDomainEventHandler;
pub use manager::Manager;
