//! In-memory queue store testing utilities
//!
//! Provides fast, deterministic testing infrastructure for the queue service:
//! - [`InMemoryQueueStore`]: document store with atomic allocation, batch calls and live snapshots
//! - [`InMemoryHubSettings`]: reference-point storage
//! - [`StoreOperation`]: names operations for fault injection

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Test utilities document panics where critical

use driver_queue_core::error::QueueStoreError;
use driver_queue_core::hub_settings::{HubSettingsStore, ReferencePoint};
use driver_queue_core::queue_store::{
    LastCalledStream, QueueStore, StoreFuture, TicketQuery, TicketSnapshotStream,
};
use driver_queue_core::sequence::SequenceCounter;
use driver_queue_core::ticket::{
    BoxSlot, DriverId, LastCalledRecord, Ticket, TicketDraft, TicketId, TicketStatus,
};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::watch;

/// Store operations that can be made to fail on demand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    /// [`QueueStore::find_tickets`]
    FindTickets,
    /// [`QueueStore::allocate_ticket`]
    AllocateTicket,
    /// [`QueueStore::mark_called`]
    MarkCalled,
    /// [`QueueStore::publish_last_called`]
    PublishLastCalled,
    /// [`QueueStore::load_last_called`]
    LoadLastCalled,
    /// [`QueueStore::clear_last_called`]
    ClearLastCalled,
    /// [`QueueStore::delete_tickets`]
    DeleteTickets,
    /// [`QueueStore::delete_all_tickets`]
    DeleteAllTickets,
    /// [`QueueStore::load_counter`]
    LoadCounter,
    /// [`QueueStore::reset_counter`]
    ResetCounter,
    /// [`QueueStore::update_box`]
    UpdateBox,
    /// [`QueueStore::watch_tickets`]
    WatchTickets,
    /// [`QueueStore::watch_last_called`]
    WatchLastCalled,
}

#[derive(Debug, Default)]
struct QueueDocuments {
    /// Ticket collection in insertion order
    tickets: Vec<Ticket>,
    counter: SequenceCounter,
    last_called: Option<LastCalledRecord>,
}

#[derive(Debug)]
struct Shared {
    documents: Mutex<QueueDocuments>,
    faults: Mutex<HashMap<StoreOperation, VecDeque<QueueStoreError>>>,
    calls: Mutex<HashMap<StoreOperation, usize>>,
    latency: RwLock<Option<Duration>>,
    tickets_tx: watch::Sender<Result<Vec<Ticket>, QueueStoreError>>,
    last_called_tx: watch::Sender<Result<Option<LastCalledRecord>, QueueStoreError>>,
}

/// In-memory queue store for fast, deterministic testing.
///
/// Every mutation runs in one critical section, so allocation and batch calls are
/// atomic exactly as the trait requires. Listeners are fed from `watch` channels
/// after each committed mutation, which means a slow listener sees the latest
/// snapshot rather than every intermediate one.
///
/// Cloning is cheap and clones share state, so one clone can be handed to the
/// service while the test keeps another for assertions.
///
/// # Example
///
/// ```
/// use driver_queue_testing::InMemoryQueueStore;
/// use driver_queue_core::queue_store::{QueueStore, TicketQuery};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryQueueStore::new();
/// let tickets = store.find_tickets(TicketQuery::all()).await?;
/// assert!(tickets.is_empty());
/// assert_eq!(store.counter().last_number(), 0);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryQueueStore {
    shared: Arc<Shared>,
}

impl InMemoryQueueStore {
    /// Create a new empty store with the counter reset
    #[must_use]
    pub fn new() -> Self {
        let (tickets_tx, _) = watch::channel(Ok(Vec::new()));
        let (last_called_tx, _) = watch::channel(Ok(None));
        Self {
            shared: Arc::new(Shared {
                documents: Mutex::new(QueueDocuments::default()),
                faults: Mutex::new(HashMap::new()),
                calls: Mutex::new(HashMap::new()),
                latency: RwLock::new(None),
                tickets_tx,
                last_called_tx,
            }),
        }
    }

    /// Create a store whose counter already holds `last_number`.
    #[must_use]
    pub fn with_counter(last_number: u32) -> Self {
        let store = Self::new();
        store.shared.documents.lock().unwrap().counter = SequenceCounter::new(last_number);
        store
    }

    /// Delay every operation by `latency` before it touches state.
    ///
    /// Lets concurrent tests interleave the non-transactional pre-checks of
    /// several callers.
    pub fn set_latency(&self, latency: Duration) {
        *self.shared.latency.write().unwrap() = Some(latency);
    }

    /// Make the next call of `operation` fail with `error` without touching state.
    ///
    /// Calls queue up: failing the same operation twice fails its next two calls.
    pub fn fail_next(&self, operation: StoreOperation, error: QueueStoreError) {
        self.shared
            .faults
            .lock()
            .unwrap()
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Push an error to every ticket listener, as a dropped backend connection would.
    pub fn emit_listener_error(&self, error: QueueStoreError) {
        let _previous = self.shared.tickets_tx.send_replace(Err(error));
    }

    /// How many times `operation` has been invoked (including injected failures).
    #[must_use]
    pub fn call_count(&self, operation: StoreOperation) -> usize {
        self.shared
            .calls
            .lock()
            .unwrap()
            .get(&operation)
            .copied()
            .unwrap_or(0)
    }

    /// Insert a ticket directly, bypassing the counter (test setup).
    pub fn insert_ticket(&self, ticket: Ticket) {
        let mut documents = self.shared.documents.lock().unwrap();
        documents.tickets.push(ticket);
        self.publish_tickets(&documents);
    }

    /// Current tickets in insertion order.
    #[must_use]
    pub fn tickets(&self) -> Vec<Ticket> {
        self.shared.documents.lock().unwrap().tickets.clone()
    }

    /// Number of stored tickets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.documents.lock().unwrap().tickets.len()
    }

    /// Whether the ticket collection is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.documents.lock().unwrap().tickets.is_empty()
    }

    /// Current counter value.
    #[must_use]
    pub fn counter(&self) -> SequenceCounter {
        self.shared.documents.lock().unwrap().counter
    }

    /// Current last-called record.
    #[must_use]
    pub fn last_called(&self) -> Option<LastCalledRecord> {
        self.shared.documents.lock().unwrap().last_called.clone()
    }

    async fn enter(&self, operation: StoreOperation) -> Result<(), QueueStoreError> {
        *self
            .shared
            .calls
            .lock()
            .unwrap()
            .entry(operation)
            .or_insert(0) += 1;

        let latency = *self.shared.latency.read().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let injected = self
            .shared
            .faults
            .lock()
            .unwrap()
            .get_mut(&operation)
            .and_then(VecDeque::pop_front);
        injected.map_or(Ok(()), Err)
    }

    fn publish_tickets(&self, documents: &QueueDocuments) {
        let _previous = self
            .shared
            .tickets_tx
            .send_replace(Ok(documents.tickets.clone()));
    }

    fn publish_last_called_record(&self, documents: &QueueDocuments) {
        let _previous = self
            .shared
            .last_called_tx
            .send_replace(Ok(documents.last_called.clone()));
    }

    fn has_active_ticket(documents: &QueueDocuments, driver_id: &DriverId) -> bool {
        documents
            .tickets
            .iter()
            .any(|ticket| &ticket.driver_id == driver_id && ticket.is_active())
    }
}

impl Default for InMemoryQueueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueStore for InMemoryQueueStore {
    fn find_tickets(&self, query: TicketQuery) -> StoreFuture<'_, Vec<Ticket>> {
        Box::pin(async move {
            self.enter(StoreOperation::FindTickets).await?;
            let documents = self.shared.documents.lock().unwrap();
            Ok(query.apply(&documents.tickets))
        })
    }

    fn allocate_ticket(&self, draft: TicketDraft, ceiling: u32) -> StoreFuture<'_, Ticket> {
        Box::pin(async move {
            self.enter(StoreOperation::AllocateTicket).await?;
            let mut documents = self.shared.documents.lock().unwrap();

            if Self::has_active_ticket(&documents, &draft.driver_id) {
                return Err(QueueStoreError::ActiveTicketExists(draft.driver_id));
            }

            let counter = documents.counter.advance(ceiling);
            let ticket = Ticket::issue(TicketId::new(), draft, counter.ticket_number());
            documents.counter = counter;
            documents.tickets.push(ticket.clone());
            self.publish_tickets(&documents);
            Ok(ticket)
        })
    }

    fn mark_called(
        &self,
        ids: Vec<TicketId>,
        called_at: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<Ticket>> {
        Box::pin(async move {
            self.enter(StoreOperation::MarkCalled).await?;
            let mut documents = self.shared.documents.lock().unwrap();

            // Validate the whole batch before touching anything.
            let mut positions = Vec::with_capacity(ids.len());
            for id in &ids {
                let position = documents
                    .tickets
                    .iter()
                    .position(|ticket| &ticket.id == id)
                    .ok_or(QueueStoreError::DocumentMissing(*id))?;
                if documents.tickets[position].status != TicketStatus::Waiting {
                    return Err(QueueStoreError::TransactionConflict(format!(
                        "ticket {} is no longer waiting",
                        documents.tickets[position].ticket_number
                    )));
                }
                positions.push(position);
            }

            let mut called = Vec::with_capacity(positions.len());
            for position in positions {
                let ticket = &mut documents.tickets[position];
                ticket.mark_called(called_at);
                called.push(ticket.clone());
            }
            self.publish_tickets(&documents);
            Ok(called)
        })
    }

    fn publish_last_called(&self, record: LastCalledRecord) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.enter(StoreOperation::PublishLastCalled).await?;
            let mut documents = self.shared.documents.lock().unwrap();
            documents.last_called = Some(record);
            self.publish_last_called_record(&documents);
            Ok(())
        })
    }

    fn load_last_called(&self) -> StoreFuture<'_, Option<LastCalledRecord>> {
        Box::pin(async move {
            self.enter(StoreOperation::LoadLastCalled).await?;
            Ok(self.shared.documents.lock().unwrap().last_called.clone())
        })
    }

    fn clear_last_called(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.enter(StoreOperation::ClearLastCalled).await?;
            let mut documents = self.shared.documents.lock().unwrap();
            documents.last_called = None;
            self.publish_last_called_record(&documents);
            Ok(())
        })
    }

    fn delete_tickets(&self, ids: Vec<TicketId>) -> StoreFuture<'_, usize> {
        Box::pin(async move {
            self.enter(StoreOperation::DeleteTickets).await?;
            let ids: HashSet<TicketId> = ids.into_iter().collect();
            let mut documents = self.shared.documents.lock().unwrap();
            let before = documents.tickets.len();
            documents.tickets.retain(|ticket| !ids.contains(&ticket.id));
            let removed = before - documents.tickets.len();
            if removed > 0 {
                self.publish_tickets(&documents);
            }
            Ok(removed)
        })
    }

    fn delete_all_tickets(&self) -> StoreFuture<'_, usize> {
        Box::pin(async move {
            self.enter(StoreOperation::DeleteAllTickets).await?;
            let mut documents = self.shared.documents.lock().unwrap();
            let removed = documents.tickets.len();
            documents.tickets.clear();
            self.publish_tickets(&documents);
            Ok(removed)
        })
    }

    fn load_counter(&self) -> StoreFuture<'_, SequenceCounter> {
        Box::pin(async move {
            self.enter(StoreOperation::LoadCounter).await?;
            Ok(self.shared.documents.lock().unwrap().counter)
        })
    }

    fn reset_counter(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.enter(StoreOperation::ResetCounter).await?;
            self.shared.documents.lock().unwrap().counter = SequenceCounter::RESET;
            Ok(())
        })
    }

    fn update_box(&self, id: TicketId, box_slot: BoxSlot) -> StoreFuture<'_, Ticket> {
        Box::pin(async move {
            self.enter(StoreOperation::UpdateBox).await?;
            let mut documents = self.shared.documents.lock().unwrap();
            let ticket = documents
                .tickets
                .iter_mut()
                .find(|ticket| ticket.id == id)
                .ok_or(QueueStoreError::DocumentMissing(id))?;
            ticket.box_slot = box_slot;
            let updated = ticket.clone();
            self.publish_tickets(&documents);
            Ok(updated)
        })
    }

    fn watch_tickets(&self) -> StoreFuture<'_, TicketSnapshotStream> {
        Box::pin(async move {
            self.enter(StoreOperation::WatchTickets).await?;
            let mut rx = self.shared.tickets_tx.subscribe();
            let stream = async_stream::stream! {
                let current = rx.borrow_and_update().clone();
                yield current;
                while rx.changed().await.is_ok() {
                    let current = rx.borrow_and_update().clone();
                    yield current;
                }
            };
            Ok(Box::pin(stream) as TicketSnapshotStream)
        })
    }

    fn watch_last_called(&self) -> StoreFuture<'_, LastCalledStream> {
        Box::pin(async move {
            self.enter(StoreOperation::WatchLastCalled).await?;
            let mut rx = self.shared.last_called_tx.subscribe();
            let stream = async_stream::stream! {
                let current = rx.borrow_and_update().clone();
                yield current;
                while rx.changed().await.is_ok() {
                    let current = rx.borrow_and_update().clone();
                    yield current;
                }
            };
            Ok(Box::pin(stream) as LastCalledStream)
        })
    }
}

/// In-memory hub settings for testing reference-point handling.
///
/// # Example
///
/// ```
/// use driver_queue_testing::InMemoryHubSettings;
/// use driver_queue_core::hub_settings::HubSettingsStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let settings = InMemoryHubSettings::new();
/// assert!(settings.load_reference_point().await?.is_none());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryHubSettings {
    reference_point: Arc<RwLock<Option<ReferencePoint>>>,
    unavailable: Arc<RwLock<Option<String>>>,
}

impl InMemoryHubSettings {
    /// Create settings with no reference point
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create settings already holding `point`
    #[must_use]
    pub fn with_reference_point(point: ReferencePoint) -> Self {
        let settings = Self::new();
        *settings.reference_point.write().unwrap() = Some(point);
        settings
    }

    /// Make every call fail with `Unavailable(reason)` until [`Self::recover`] is called.
    pub fn go_offline(&self, reason: impl Into<String>) {
        *self.unavailable.write().unwrap() = Some(reason.into());
    }

    /// Undo [`Self::go_offline`].
    pub fn recover(&self) {
        *self.unavailable.write().unwrap() = None;
    }

    /// Current reference point.
    #[must_use]
    pub fn reference_point(&self) -> Option<ReferencePoint> {
        self.reference_point.read().unwrap().clone()
    }

    fn check_online(&self) -> Result<(), QueueStoreError> {
        match self.unavailable.read().unwrap().as_ref() {
            Some(reason) => Err(QueueStoreError::Unavailable(reason.clone())),
            None => Ok(()),
        }
    }
}

impl HubSettingsStore for InMemoryHubSettings {
    fn load_reference_point(&self) -> StoreFuture<'_, Option<ReferencePoint>> {
        Box::pin(async move {
            self.check_online()?;
            Ok(self.reference_point.read().unwrap().clone())
        })
    }

    fn save_reference_point(&self, point: ReferencePoint) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.check_online()?;
            *self.reference_point.write().unwrap() = Some(point);
            Ok(())
        })
    }
}
