//! Background delivery worker.
//!
//! Consumes the publisher's broadcast channel and dispatches each event on
//! its own task, so one slow destination batch never holds up the queue.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::dispatcher::WebhookDispatcher;
use crate::event::WebhookEvent;

/// Consumes published events and drives the dispatcher.
pub struct DeliveryWorker {
    dispatcher: Arc<WebhookDispatcher>,
}

impl DeliveryWorker {
    #[must_use]
    pub fn new(dispatcher: Arc<WebhookDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Spawn the worker loop on the current runtime.
    #[must_use]
    pub fn spawn(self, receiver: broadcast::Receiver<WebhookEvent>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(receiver).await })
    }

    /// Run until the publisher side is dropped.
    pub async fn run(&self, mut receiver: broadcast::Receiver<WebhookEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let dispatcher = Arc::clone(&self.dispatcher);
                    // Per-event task: dispatch is internally bounded, and
                    // the receive loop must keep draining the channel.
                    tokio::spawn(async move {
                        dispatcher.dispatch(&event).await;
                    });
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(
                        target: "webhook_delivery",
                        missed,
                        "Delivery worker lagged, events were dropped"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!(
                        target: "webhook_delivery",
                        "Event channel closed, delivery worker stopping"
                    );
                    break;
                }
            }
        }
    }
}
