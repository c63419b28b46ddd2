//! Turns a paid gateway session into exactly one order.
//!
//! Every step is safe to re-run: the existing-order check short-circuits
//! repeats, coupon deactivation is a conditional update, and the unique
//! payment reference stops a racing second insert.

use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::gateway::PaymentGateway;
use crate::models::{NewOrder, Order, OrderLine};
use crate::repositories::{CouponStore, OrderStore};

#[derive(Clone)]
pub struct OrderReconciler {
    gateway: Arc<dyn PaymentGateway>,
    coupons: Arc<dyn CouponStore>,
    orders: Arc<dyn OrderStore>,
    currency: String,
    events: EventSender,
}

impl OrderReconciler {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        coupons: Arc<dyn CouponStore>,
        orders: Arc<dyn OrderStore>,
        currency: impl Into<String>,
        events: EventSender,
    ) -> Self {
        Self {
            gateway,
            coupons,
            orders,
            currency: currency.into(),
            events,
        }
    }

    #[instrument(skip(self))]
    pub async fn confirm_session(&self, session_id: &str) -> Result<Order, ServiceError> {
        let session = self.gateway.get_session_status(session_id).await?;
        if !session.status.is_paid() {
            info!(status = %session.status, "session not paid yet");
            return Err(ServiceError::PaymentNotCompleted {
                session_id: session_id.to_string(),
                status: session.status.to_string(),
            });
        }

        if let Some(existing) = self.orders.find_by_payment_reference(session_id).await? {
            return Ok(self.already_confirmed(existing, session_id));
        }

        let metadata = session.metadata;
        if let Some(code) = metadata.coupon_code.as_deref() {
            if self.coupons.deactivate(code, metadata.user_id).await? {
                info!(%code, "coupon redeemed");
                self.events.publish(Event::CouponRedeemed {
                    user_id: metadata.user_id,
                    code: code.to_string(),
                    session_id: session_id.to_string(),
                });
            } else {
                info!(%code, "coupon already inactive");
            }
        }

        let new_order = NewOrder {
            user_id: metadata.user_id,
            lines: metadata
                .cart_snapshot
                .into_iter()
                .map(OrderLine::from)
                .collect(),
            total_minor_units: session.amount_paid_minor_units,
            currency: session
                .currency
                .map(|c| c.to_ascii_lowercase())
                .unwrap_or_else(|| self.currency.clone()),
            payment_reference: session_id.to_string(),
            coupon_code: metadata.coupon_code,
        };

        match self.orders.insert(new_order).await {
            Ok(order) => {
                info!(order_id = %order.id, total = order.total_minor_units, "order created");
                self.events.publish(Event::OrderCreated {
                    order_id: order.id,
                    user_id: order.user_id,
                    session_id: session_id.to_string(),
                    total_minor_units: order.total_minor_units,
                });
                Ok(order)
            }
            Err(ServiceError::DuplicateConfirmation(_)) => {
                // lost the race against a concurrent confirmation
                let existing = self
                    .orders
                    .find_by_payment_reference(session_id)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::Internal(format!(
                            "order for session {} vanished after duplicate insert",
                            session_id
                        ))
                    })?;
                Ok(self.already_confirmed(existing, session_id))
            }
            Err(e) => {
                warn!(error = %e, "order persistence failed; confirmation can be retried");
                Err(e)
            }
        }
    }

    fn already_confirmed(&self, order: Order, session_id: &str) -> Order {
        info!(order_id = %order.id, "session already confirmed");
        self.events.publish(Event::DuplicateConfirmation {
            order_id: order.id,
            session_id: session_id.to_string(),
        });
        order
    }
}
