//! SSE HTTP handler for the web layer.
//!
//! This module contains only the Axum handler for the notification stream.
//! The relay itself (Manager, ConnectionRegistry, heartbeats, pub/sub)
//! lives in the `sse` crate.

pub mod handler;
