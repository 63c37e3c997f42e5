//! Notification fan-out.
//!
//! The engine fires an event after each settlement, reversal or payout resolution commits. The
//! hooks installed here turn those events into user-facing notifications. Delivery is handed off
//! to the platform's push/messaging service; the stubs below log the hand-off, and failures to
//! deliver never affect the ledger, which has already committed by the time these run.

use log::*;
use pesa_ledger_engine::events::{EventHooks, PaymentReversal};

pub fn create_notification_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks.on_topup_settled(|event| {
        Box::pin(async move {
            let s = &event.settlement;
            info!("📣️ Notify {}: top-up {} credited {} coins (balance {})", s.user_id, s.reference, s.coins, s.balance);
        })
    });
    hooks.on_order_settled(|event| {
        Box::pin(async move {
            let s = &event.settlement;
            info!("📣️ Notify shop {}: order payment {} settled {} (balance {})", s.shop_id, s.reference, s.amount, s.balance);
            if let Some(order) = &s.order {
                info!("📣️ Notify buyer {}: order {} is now {}", order.buyer_id, order.order_id, order.status);
            }
        })
    });
    hooks.on_payment_reversed(|event| {
        Box::pin(async move {
            match &event.reversal {
                PaymentReversal::Topup(r) => {
                    warn!("📣️ Notify {}: top-up {} was reversed, {} coins removed", r.user_id, r.reference, r.coins);
                },
                PaymentReversal::Order(r) => {
                    warn!("📣️ Notify shop {}: payment {} was reversed, {} clawed back", r.shop_id, r.reference, r.amount);
                    if let Some(order) = &r.order {
                        warn!("📣️ Notify buyer {}: payment for order {} was reversed, order is now {}", order.buyer_id, order.order_id, order.status);
                    }
                },
            }
        })
    });
    hooks.on_payout_resolved(|event| {
        Box::pin(async move {
            let r = &event.resolution;
            info!("📣️ Notify {}: payout {} is {} ({})", r.owner_id, r.reference, r.status, r.net_amount);
        })
    });
    hooks
}
