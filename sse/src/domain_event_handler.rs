use crate::message::Event as SseEvent;
use crate::Manager;
use async_trait::async_trait;
use events::{DomainEvent, EventHandler, UserId};
use log::*;
use serde_json::Value;
use std::sync::Arc;

/// Handles domain events by converting them to relay payloads and sending
/// them to the users named in the event.
///
/// The business layer determines which users should be notified; this
/// handler only routes.
pub struct SseDomainEventHandler {
    sse_manager: Arc<Manager>,
}

impl SseDomainEventHandler {
    pub fn new(sse_manager: Arc<Manager>) -> Self {
        Self { sse_manager }
    }

    async fn send_to_users(&self, payload: Value, user_ids: &[UserId]) {
        for user_id in user_ids {
            self.sse_manager.send_event(user_id, payload.clone()).await;
        }

        debug!(
            "Sent SSE event to {} user(s): {:?}",
            user_ids.len(),
            user_ids
        );
    }

    fn to_payload(event: &DomainEvent) -> Option<Value> {
        let sse_event = match event {
            DomainEvent::BillCreated { bill_id, bill, .. } => SseEvent::BillCreated {
                bill_id: bill_id.to_string(),
                bill: bill.clone(),
            },
            DomainEvent::PaymentReceived {
                bill_id, payment, ..
            } => SseEvent::PaymentReceived {
                bill_id: bill_id.to_string(),
                payment: payment.clone(),
            },
            DomainEvent::ReminderSent {
                bill_id, reminder, ..
            } => SseEvent::ReminderSent {
                bill_id: bill_id.to_string(),
                reminder: reminder.clone(),
            },
            DomainEvent::BillSettled { bill_id, .. } => SseEvent::BillSettled {
                bill_id: bill_id.to_string(),
            },
            DomainEvent::Notification { payload, .. } => return Some(payload.clone()),
        };

        match sse_event.to_payload() {
            Ok(payload) => Some(payload),
            Err(e) => {
                error!("Failed to serialize SSE event: {e}");
                None
            }
        }
    }
}

#[async_trait]
impl EventHandler for SseDomainEventHandler {
    async fn handle(&self, event: &DomainEvent) {
        debug!("Handling {} domain event", event.name());

        if let Some(payload) = Self::to_payload(event) {
            self.send_to_users(payload, event.notify_user_ids()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Frame;
    use crate::test_support::RecordingStream;
    use events::{EventPublisher, Id};
    use serde_json::json;

    #[tokio::test]
    async fn test_payment_received_reaches_every_notified_user() {
        let manager = Arc::new(Manager::new());
        let payer = RecordingStream::new();
        let owner = RecordingStream::new();
        let bystander = RecordingStream::new();
        manager.add_client("payer".to_string(), payer.clone());
        manager.add_client("owner".to_string(), owner.clone());
        manager.add_client("bystander".to_string(), bystander.clone());

        let publisher = EventPublisher::new()
            .with_handler(Arc::new(SseDomainEventHandler::new(Arc::clone(&manager))));
        let bill_id = Id::new_v4();

        publisher
            .publish(DomainEvent::PaymentReceived {
                bill_id,
                payment: json!({"amount_cents": 1250}),
                notify_user_ids: vec!["payer".to_string(), "owner".to_string()],
            })
            .await;

        let expected = Frame::Data(json!({
            "type": "payment_received",
            "data": {"bill_id": bill_id.to_string(), "payment": {"amount_cents": 1250}}
        }));
        assert_eq!(payer.data_frames().last(), Some(&expected));
        assert_eq!(owner.data_frames().last(), Some(&expected));
        assert_eq!(bystander.data_frames(), vec![Frame::connected()]);
    }

    #[tokio::test]
    async fn test_notification_payload_is_forwarded_untouched() {
        let manager = Arc::new(Manager::new());
        let stream = RecordingStream::new();
        manager.add_client("u1".to_string(), stream.clone());
        let handler = SseDomainEventHandler::new(Arc::clone(&manager));

        let payload = json!({"kind": "friend_request", "from": "u9"});
        handler
            .handle(&DomainEvent::Notification {
                payload: payload.clone(),
                notify_user_ids: vec!["u1".to_string(), "offline".to_string()],
            })
            .await;

        assert_eq!(stream.data_frames().last(), Some(&Frame::Data(payload)));
    }
}
