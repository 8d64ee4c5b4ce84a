//! Event system infrastructure for Biltip.
//!
//! This crate provides the event system that decouples business logic
//! (bills, payments, reminders) from delivery concerns like the real-time
//! notification relay.
//!
//! # Architecture
//!
//! - **DomainEvent**: Enum representing all notification-worthy business events
//! - **EventHandler**: Trait for implementing event handlers
//! - **EventPublisher**: Publishes events to registered handlers
//!
//! This crate has no dependencies on internal crates, avoiding circular
//! dependencies. Entity data is carried as serialized JSON values.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// Identifier of bills and other persisted Biltip entities.
pub type Id = Uuid;

/// Identifier of a user as issued by the authentication layer.
pub type UserId = String;

/// Business events that should reach users in near real time.
///
/// Each event names the users to notify; the business layer decides who
/// they are. Entity data is carried as `serde_json::Value` and is not
/// interpreted by the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A bill was created and split among participants.
    BillCreated {
        bill_id: Id,
        /// Complete serialized bill, so clients can render it without refetching.
        bill: Value,
        notify_user_ids: Vec<UserId>,
    },
    /// A participant paid their share of a bill.
    PaymentReceived {
        bill_id: Id,
        payment: Value,
        notify_user_ids: Vec<UserId>,
    },
    /// A payment reminder was sent to one or more participants.
    ReminderSent {
        bill_id: Id,
        reminder: Value,
        notify_user_ids: Vec<UserId>,
    },
    /// Every share of a bill has been paid.
    BillSettled {
        bill_id: Id,
        notify_user_ids: Vec<UserId>,
    },
    /// Free-form notification; the payload is forwarded untouched.
    Notification {
        payload: Value,
        notify_user_ids: Vec<UserId>,
    },
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::BillCreated { .. } => "bill_created",
            DomainEvent::PaymentReceived { .. } => "payment_received",
            DomainEvent::ReminderSent { .. } => "reminder_sent",
            DomainEvent::BillSettled { .. } => "bill_settled",
            DomainEvent::Notification { .. } => "notification",
        }
    }

    pub fn notify_user_ids(&self) -> &[UserId] {
        match self {
            DomainEvent::BillCreated {
                notify_user_ids, ..
            }
            | DomainEvent::PaymentReceived {
                notify_user_ids, ..
            }
            | DomainEvent::ReminderSent {
                notify_user_ids, ..
            }
            | DomainEvent::BillSettled {
                notify_user_ids, ..
            }
            | DomainEvent::Notification {
                notify_user_ids, ..
            } => notify_user_ids,
        }
    }
}

/// Trait for handling domain events.
/// Implementations can perform side effects like sending notifications,
/// updating caches, logging, etc.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent);
}

/// Publishes domain events to registered handlers.
/// Handlers are called sequentially in registration order.
#[derive(Clone)]
pub struct EventPublisher {
    handlers: Arc<Vec<Arc<dyn EventHandler>>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Vec::new()),
        }
    }

    /// Register a new event handler.
    /// Note: This creates a new publisher instance with the additional handler.
    /// Store the returned publisher in your application state.
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        let mut handlers = (*self.handlers).clone();
        handlers.push(handler);
        self.handlers = Arc::new(handlers);
        self
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Publish an event to all registered handlers, sequentially.
    pub async fn publish(&self, event: DomainEvent) {
        for handler in self.handlers.iter() {
            handler.handle(&event).await;
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    struct RecordingHandler {
        label: &'static str,
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl EventHandler for RecordingHandler {
        async fn handle(&self, event: &DomainEvent) {
            self.seen
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.label, event.name()));
        }
    }

    #[tokio::test]
    async fn test_publish_calls_handlers_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let publisher = EventPublisher::new()
            .with_handler(Arc::new(RecordingHandler {
                label: "first",
                seen: Arc::clone(&seen),
            }))
            .with_handler(Arc::new(RecordingHandler {
                label: "second",
                seen: Arc::clone(&seen),
            }));

        publisher
            .publish(DomainEvent::BillSettled {
                bill_id: Id::new_v4(),
                notify_user_ids: vec!["u1".to_string()],
            })
            .await;

        assert_eq!(publisher.handler_count(), 2);
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["first:bill_settled", "second:bill_settled"]
        );
    }

    #[tokio::test]
    async fn test_publish_without_handlers_is_noop() {
        EventPublisher::default()
            .publish(DomainEvent::Notification {
                payload: json!({}),
                notify_user_ids: vec![],
            })
            .await;
    }

    #[test]
    fn test_domain_event_deserializes_from_tagged_json() {
        let bill_id = Id::new_v4();
        let raw = json!({
            "type": "payment_received",
            "bill_id": bill_id,
            "payment": {"amount_cents": 1250, "from": "u2"},
            "notify_user_ids": ["u1", "u3"]
        });

        let event: DomainEvent = serde_json::from_value(raw).unwrap();

        assert_eq!(event.name(), "payment_received");
        assert_eq!(event.notify_user_ids(), ["u1", "u3"]);
        match event {
            DomainEvent::PaymentReceived { payment, .. } => {
                assert_eq!(payment["amount_cents"], 1250)
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_event_type_is_rejected() {
        let raw = json!({"type": "bill_exploded", "notify_user_ids": []});
        assert!(serde_json::from_value::<DomainEvent>(raw).is_err());
    }
}
