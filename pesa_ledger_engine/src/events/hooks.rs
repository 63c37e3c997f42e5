use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    EventHandler,
    EventProducer,
    Handler,
    OrderSettledEvent,
    PaymentReversedEvent,
    PayoutResolvedEvent,
    TopupSettledEvent,
};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub topup_settled_producer: Vec<EventProducer<TopupSettledEvent>>,
    pub order_settled_producer: Vec<EventProducer<OrderSettledEvent>>,
    pub payment_reversed_producer: Vec<EventProducer<PaymentReversedEvent>>,
    pub payout_resolved_producer: Vec<EventProducer<PayoutResolvedEvent>>,
}

pub struct EventHandlers {
    pub on_topup_settled: Option<EventHandler<TopupSettledEvent>>,
    pub on_order_settled: Option<EventHandler<OrderSettledEvent>>,
    pub on_payment_reversed: Option<EventHandler<PaymentReversedEvent>>,
    pub on_payout_resolved: Option<EventHandler<PayoutResolvedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_topup_settled = hooks.on_topup_settled.map(|f| EventHandler::new(buffer_size, f));
        let on_order_settled = hooks.on_order_settled.map(|f| EventHandler::new(buffer_size, f));
        let on_payment_reversed = hooks.on_payment_reversed.map(|f| EventHandler::new(buffer_size, f));
        let on_payout_resolved = hooks.on_payout_resolved.map(|f| EventHandler::new(buffer_size, f));
        Self { on_topup_settled, on_order_settled, on_payment_reversed, on_payout_resolved }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_topup_settled {
            result.topup_settled_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_settled {
            result.order_settled_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_payment_reversed {
            result.payment_reversed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_payout_resolved {
            result.payout_resolved_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_topup_settled {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_order_settled {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_payment_reversed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_payout_resolved {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_topup_settled: Option<Handler<TopupSettledEvent>>,
    pub on_order_settled: Option<Handler<OrderSettledEvent>>,
    pub on_payment_reversed: Option<Handler<PaymentReversedEvent>>,
    pub on_payout_resolved: Option<Handler<PayoutResolvedEvent>>,
}

impl EventHooks {
    pub fn on_topup_settled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(TopupSettledEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_topup_settled = Some(Arc::new(f));
        self
    }

    pub fn on_order_settled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderSettledEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_settled = Some(Arc::new(f));
        self
    }

    pub fn on_payment_reversed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PaymentReversedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_payment_reversed = Some(Arc::new(f));
        self
    }

    pub fn on_payout_resolved<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PayoutResolvedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_payout_resolved = Some(Arc::new(f));
        self
    }
}
