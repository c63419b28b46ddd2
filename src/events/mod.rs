use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Audit trail of money-affecting steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    CheckoutSessionCreated {
        session_id: String,
        user_id: Uuid,
        total_minor_units: i64,
        coupon_code: Option<String>,
    },
    LoyaltyCouponIssued {
        user_id: Uuid,
        code: String,
        discount_percent: u8,
    },
    CouponRedeemed {
        user_id: Uuid,
        code: String,
        session_id: String,
    },
    OrderCreated {
        order_id: Uuid,
        user_id: Uuid,
        session_id: String,
        total_minor_units: i64,
    },
    /// A confirmation arrived for a session that already has an order.
    DuplicateConfirmation { order_id: Uuid, session_id: String },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::CheckoutSessionCreated { .. } => "checkout_session_created",
            Event::LoyaltyCouponIssued { .. } => "loyalty_coupon_issued",
            Event::CouponRedeemed { .. } => "coupon_redeemed",
            Event::OrderCreated { .. } => "order_created",
            Event::DuplicateConfirmation { .. } => "duplicate_confirmation",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Best-effort publish. A full or closed channel is logged and otherwise ignored.
    pub fn publish(&self, event: Event) {
        let name = event.name();
        if let Err(e) = self.sender.try_send(event) {
            warn!(event = name, error = %e, "dropping audit event");
        }
    }
}

/// Channel pair sized by `capacity`.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSender::new(tx), rx)
}

/// Logs every event until all senders are dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::CheckoutSessionCreated {
                session_id,
                user_id,
                total_minor_units,
                coupon_code,
            } => info!(
                event = event.name(),
                %session_id,
                %user_id,
                total_minor_units,
                coupon_code = coupon_code.as_deref().unwrap_or(""),
                "audit"
            ),
            Event::LoyaltyCouponIssued {
                user_id,
                code,
                discount_percent,
            } => info!(event = event.name(), %user_id, %code, discount_percent, "audit"),
            Event::CouponRedeemed {
                user_id,
                code,
                session_id,
            } => info!(event = event.name(), %user_id, %code, %session_id, "audit"),
            Event::OrderCreated {
                order_id,
                user_id,
                session_id,
                total_minor_units,
            } => info!(
                event = event.name(),
                %order_id,
                %user_id,
                %session_id,
                total_minor_units,
                "audit"
            ),
            Event::DuplicateConfirmation {
                order_id,
                session_id,
            } => info!(event = event.name(), %order_id, %session_id, "audit"),
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_delivers_to_receiver() {
        let (sender, mut rx) = channel(4);
        sender.publish(Event::DuplicateConfirmation {
            order_id: Uuid::nil(),
            session_id: "cs_1".into(),
        });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "duplicate_confirmation");
    }

    #[tokio::test]
    async fn publish_on_full_channel_does_not_block() {
        let (sender, _rx) = channel(1);
        for _ in 0..3 {
            sender.publish(Event::LoyaltyCouponIssued {
                user_id: Uuid::nil(),
                code: "GIFTABC123".into(),
                discount_percent: 10,
            });
        }
    }

    #[tokio::test]
    async fn publish_on_closed_channel_is_ignored() {
        let (sender, rx) = channel(1);
        drop(rx);
        sender.publish(Event::CouponRedeemed {
            user_id: Uuid::nil(),
            code: "SAVE".into(),
            session_id: "cs_2".into(),
        });
        assert!(sender
            .send(Event::DuplicateConfirmation {
                order_id: Uuid::nil(),
                session_id: "cs_2".into()
            })
            .await
            .is_err());
    }

    #[tokio::test]
    async fn processor_drains_until_senders_drop() {
        let (sender, rx) = channel(8);
        let handle = tokio::spawn(process_events(rx));
        sender.publish(Event::OrderCreated {
            order_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            session_id: "cs_3".into(),
            total_minor_units: 2000,
        });
        drop(sender);
        handle.await.unwrap();
    }
}
