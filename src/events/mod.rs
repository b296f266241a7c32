use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::gateway::PaymentProvider;
use crate::webhooks::automation::AutomationForwarder;

/// Events emitted by the checkout and reconciliation flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// An order row was created for a captured payment.
    OrderPlaced {
        order_id: Uuid,
        order_number: String,
    },
    /// A payment was captured and reconciled; carries the enriched payload
    /// forwarded to the automation hook.
    PaymentCaptured {
        provider: PaymentProvider,
        payment_id: String,
        order_id: Uuid,
        payload: Value,
    },
    /// An inbound provider webhook passed validation.
    WebhookReceived {
        provider: PaymentProvider,
        event_type: String,
    },
}

/// Non-blocking event handle. Dropping an event because the channel is full
/// is logged but never fails the request that produced it.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    pub fn send(&self, event: Event) {
        if let Err(e) = self.sender.try_send(event) {
            warn!("Failed to enqueue event: {}", e);
        }
    }
}

/// Creates the event channel used to decouple request handling from the
/// automation forwarder.
pub fn create_event_channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

/// Drains the event channel, logging every event and driving the optional
/// automation forwarder. Runs until all senders are dropped.
pub async fn process_events(
    mut receiver: mpsc::Receiver<Event>,
    forwarder: Option<Arc<AutomationForwarder>>,
) {
    info!("Event processor started");

    while let Some(event) = receiver.recv().await {
        debug!("Processing event: {:?}", event);

        match &event {
            Event::OrderPlaced {
                order_id,
                order_number,
            } => {
                info!(%order_id, %order_number, "Order placed");
                if let Some(forwarder) = &forwarder {
                    forwarder.forward_order_event(&event);
                }
            }
            Event::PaymentCaptured {
                provider,
                payment_id,
                order_id,
                ..
            } => {
                info!(%provider, %payment_id, %order_id, "Payment captured");
                if let Some(forwarder) = &forwarder {
                    forwarder.forward_payment_event(&event);
                }
            }
            Event::WebhookReceived {
                provider,
                event_type,
            } => {
                debug!(%provider, %event_type, "Webhook received");
            }
        }
    }

    info!("Event processor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_flow_through_channel() {
        let (sender, mut receiver) = create_event_channel(8);

        sender.send(Event::WebhookReceived {
            provider: PaymentProvider::PayPal,
            event_type: "PAYMENT.CAPTURE.COMPLETED".into(),
        });

        let event = receiver.recv().await.unwrap();
        assert!(matches!(event, Event::WebhookReceived { .. }));
    }

    #[test]
    fn full_channel_drops_without_panicking() {
        let (sender, _receiver) = create_event_channel(1);
        for _ in 0..5 {
            sender.send(Event::OrderPlaced {
                order_id: Uuid::new_v4(),
                order_number: "PP-20250826-1000".into(),
            });
        }
    }

    #[test]
    fn events_serialize_with_snake_case_tag() {
        let event = Event::OrderPlaced {
            order_id: Uuid::nil(),
            order_number: "MP-20250826-2000".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "order_placed");
    }
}
