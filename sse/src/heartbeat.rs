use crate::connection::{ConnectionId, ConnectionRegistry, StreamHandle, UserId};
use crate::message::Frame;
use log::*;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Keeps idle connections open through proxies and load balancers.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Per-connection keep-alive timer. Dropping it cancels the timer, so the
/// owning connection entry decides its lifetime.
pub(crate) struct Heartbeat {
    handle: AbortHandle,
}

impl Heartbeat {
    /// Spawn a timer writing a heartbeat frame every `period`, starting one
    /// full period from now. A failed write tears the connection down.
    pub(crate) fn spawn(
        registry: Weak<ConnectionRegistry>,
        user_id: UserId,
        connection_id: ConnectionId,
        stream: Arc<dyn StreamHandle>,
        period: Duration,
    ) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                if let Err(e) = stream.write(&Frame::Heartbeat) {
                    warn!(
                        "Heartbeat failed for connection {}: {}. Connection will be cleaned up.",
                        connection_id.as_str(),
                        e
                    );
                    if let Some(registry) = registry.upgrade() {
                        registry.unregister(&user_id, &connection_id);
                    }
                    break;
                }

                trace!("Heartbeat sent to connection {}", connection_id.as_str());
            }
        });

        Self {
            handle: task.abort_handle(),
        }
    }

    pub(crate) fn cancel(self) {
        // Dropping aborts the task.
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
