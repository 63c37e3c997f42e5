//! Fan-out channel for settlement events.
//!
//! Each event type gets one [`EventHandler`] owning the receive side of an mpsc channel and one
//! async callback. The settlement paths publish through cloned [`EventProducer`]s and never wait
//! for delivery, so a slow notification hook can lag behind the ledger but never block it.
//! Handlers see only the event payload, never engine state.
use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
};

use log::*;
use tokio::sync::mpsc;

/// An async callback invoked once per published event.
pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    inbox: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    callback: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, callback: Handler<E>) -> Self {
        let (sender, inbox) = mpsc::channel(buffer_size);
        Self { inbox, sender, callback }
    }

    /// Hands out a new publishing handle. Producers are cheap clones of the channel sender.
    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    /// Consumes events until every producer has been dropped, then drains the in-flight
    /// callbacks before returning.
    pub async fn start_handler(mut self) {
        debug!("📬️ Event handler running");
        // Our own sender copy would keep the channel open forever
        drop(self.sender);
        let in_flight = Arc::new(AtomicI64::new(0));
        while let Some(event) = self.inbox.recv().await {
            trace!("📬️ Dispatching event");
            let callback = Arc::clone(&self.callback);
            in_flight.fetch_add(1, Ordering::SeqCst);
            let counter = Arc::clone(&in_flight);
            tokio::spawn(async move {
                (callback)(event).await;
                counter.fetch_sub(1, Ordering::SeqCst);
            });
        }
        while in_flight.load(Ordering::SeqCst) > 0 {
            debug!("📬️ Channel closed, waiting for {} callbacks to finish", in_flight.load(Ordering::SeqCst));
            tokio::time::sleep(tokio::time::Duration::from_millis(250)).await;
        }
        debug!("📬️ Event handler has shut down");
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    /// Queues an event for the handler. Delivery failures are logged and swallowed; the ledger
    /// write this event describes has already committed.
    pub async fn publish_event(&self, event: E) {
        if let Err(e) = self.sender.send(event).await {
            error!("📬️ Could not publish event. {e}");
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::AtomicU64;

    use super::*;

    #[tokio::test]
    async fn events_from_every_producer_reach_the_callback() {
        let _ = env_logger::try_init();
        let total = Arc::new(AtomicU64::new(0));
        let tally = total.clone();
        let callback = Arc::new(move |credited: u64| {
            let total = total.clone();
            Box::pin(async move {
                debug!("Callback received a credit of {credited}");
                total.fetch_add(credited, Ordering::SeqCst);
                tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        let handler = EventHandler::new(2, callback);
        // The webhook path and the sweep path each hold their own producer
        let webhook_side = handler.subscribe();
        let sweep_side = handler.subscribe();
        tokio::spawn(async move {
            for credited in [100, 250, 400] {
                webhook_side.publish_event(credited).await;
            }
        });
        tokio::spawn(async move {
            for credited in [50, 200] {
                sweep_side.publish_event(credited).await;
            }
        });

        handler.start_handler().await;
        assert_eq!(tally.load(Ordering::SeqCst), 1_000);
    }
}
