//! Live views of the queue and the last-called board.
//!
//! A [`QueueObserver`] turns the store's snapshot streams into either plain
//! streams ([`QueueObserver::queue_updates`]) or callback subscriptions
//! ([`QueueObserver::subscribe_to_queue`]). Listener errors are logged and
//! skipped; the subscription stays attached until it is cancelled.

use driver_queue_core::error::{QueueError, QueueStoreError};
use driver_queue_core::queue_store::QueueStore;
use driver_queue_core::ticket::{LastCalledRecord, Ticket};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Stream of queue snapshots with listener errors filtered out.
pub type QueueUpdates = Pin<Box<dyn Stream<Item = Vec<Ticket>> + Send>>;

/// Stream of last-called values with listener errors filtered out.
pub type LastCalledUpdates = Pin<Box<dyn Stream<Item = Option<LastCalledRecord>> + Send>>;

/// Handle to a running callback subscription.
///
/// Dropping the handle leaves the subscription running; call
/// [`Subscription::cancel`] to stop deliveries.
#[derive(Debug)]
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    /// Stop delivering updates.
    pub fn cancel(self) {
        self.task.abort();
    }

    /// Whether updates may still be delivered.
    ///
    /// A subscription ends on its own only if the listener could not be attached
    /// or the store closed the stream.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

/// Republishes store changes to subscribers.
#[derive(Clone)]
pub struct QueueObserver {
    store: Arc<dyn QueueStore>,
}

impl QueueObserver {
    /// Observe `store`.
    #[must_use]
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self { store }
    }

    /// Every snapshot of the ticket collection, starting with the current one.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::StoreUnavailable`] if the listener cannot be attached.
    pub async fn queue_updates(&self) -> Result<QueueUpdates, QueueError> {
        let stream = self.store.watch_tickets().await?;
        Ok(Box::pin(stream.filter_map(|item| {
            futures::future::ready(skip_listener_error("queue", item))
        })))
    }

    /// Every value of the last-called record, starting with the current one.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::StoreUnavailable`] if the listener cannot be attached.
    pub async fn last_called_updates(&self) -> Result<LastCalledUpdates, QueueError> {
        let stream = self.store.watch_last_called().await?;
        Ok(Box::pin(stream.filter_map(|item| {
            futures::future::ready(skip_listener_error("last_called", item))
        })))
    }

    /// Invoke `on_update` with every queue snapshot until cancelled.
    ///
    /// Must be called within a Tokio runtime.
    pub fn subscribe_to_queue<F>(&self, on_update: F) -> Subscription
    where
        F: Fn(Vec<Ticket>) + Send + Sync + 'static,
    {
        let observer = self.clone();
        let task = tokio::spawn(async move {
            match observer.queue_updates().await {
                Ok(mut updates) => {
                    while let Some(tickets) = updates.next().await {
                        tracing::debug!(tickets = tickets.len(), "Delivering queue snapshot");
                        on_update(tickets);
                    }
                }
                Err(error) => tracing::error!(%error, "Could not attach queue listener"),
            }
        });
        Subscription { task }
    }

    /// Invoke `on_update` with every last-called value until cancelled.
    ///
    /// Must be called within a Tokio runtime.
    pub fn subscribe_to_last_called<F>(&self, on_update: F) -> Subscription
    where
        F: Fn(Option<LastCalledRecord>) + Send + Sync + 'static,
    {
        let observer = self.clone();
        let task = tokio::spawn(async move {
            match observer.last_called_updates().await {
                Ok(mut updates) => {
                    while let Some(record) = updates.next().await {
                        tracing::debug!(present = record.is_some(), "Delivering last-called record");
                        on_update(record);
                    }
                }
                Err(error) => tracing::error!(%error, "Could not attach last-called listener"),
            }
        });
        Subscription { task }
    }
}

fn skip_listener_error<T>(listener: &'static str, item: Result<T, QueueStoreError>) -> Option<T> {
    match item {
        Ok(value) => Some(value),
        Err(error) => {
            tracing::warn!(listener, %error, "Listener error; waiting for next snapshot");
            None
        }
    }
}
