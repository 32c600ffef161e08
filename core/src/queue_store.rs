//! Queue store trait: the document-store seam the queue service runs against.
//!
//! The store owns every piece of shared state: the ticket collection, the sequence
//! counter and the last-called record. Any number of service instances (one per
//! device) may read and mutate them concurrently; correctness rests on the two atomic
//! primitives below.
//!
//! - [`QueueStore::allocate_ticket`]: serialisable transaction that re-validates the
//!   driver, advances the counter and inserts the ticket.
//! - [`QueueStore::mark_called`]: all-or-nothing batch status transition.
//!
//! Everything else is a plain single-step read or write.
//!
//! # Implementations
//!
//! - `InMemoryQueueStore` (in `driver-queue-testing`): fast, deterministic testing
//! - `PostgresQueueStore` (in `driver-queue-postgres`): production backend
//!
//! # Dyn Compatibility
//!
//! Methods return `Pin<Box<dyn Future>>` instead of using `async fn` so the service
//! can hold an `Arc<dyn QueueStore>`.

use crate::error::QueueStoreError;
use crate::sequence::SequenceCounter;
use crate::ticket::{
    BoxSlot, CallOrdering, DriverId, LastCalledRecord, Ticket, TicketDraft, TicketId,
    TicketNumber, TicketStatus,
};
use chrono::{DateTime, Utc};
use futures::Stream;
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, QueueStoreError>> + Send + 'a>>;

/// Live stream of full ticket-collection snapshots.
///
/// The first item is the state at subscription time; later items follow each
/// committed change. Errors do not end the stream.
pub type TicketSnapshotStream =
    Pin<Box<dyn Stream<Item = Result<Vec<Ticket>, QueueStoreError>> + Send>>;

/// Live stream of the last-called record (`None` while the board is empty).
pub type LastCalledStream =
    Pin<Box<dyn Stream<Item = Result<Option<LastCalledRecord>, QueueStoreError>> + Send>>;

/// Filter, order and limit for ticket queries.
///
/// # Examples
///
/// ```
/// use driver_queue_core::queue_store::TicketQuery;
/// use driver_queue_core::ticket::CallOrdering;
///
/// // Oldest five waiting tickets
/// let query = TicketQuery::waiting().ordered_by(CallOrdering::Lexicographic).limit(5);
/// assert_eq!(query.limit, Some(5));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TicketQuery {
    /// Only tickets owned by this driver
    pub driver_id: Option<DriverId>,
    /// Only tickets with this number
    pub ticket_number: Option<TicketNumber>,
    /// Only tickets in one of these statuses (empty means any)
    pub statuses: Vec<TicketStatus>,
    /// Sort by ticket number
    pub order: Option<CallOrdering>,
    /// Maximum number of results
    pub limit: Option<usize>,
}

impl TicketQuery {
    /// Every ticket in the queue.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Tickets still waiting to be called.
    #[must_use]
    pub fn waiting() -> Self {
        Self {
            statuses: vec![TicketStatus::Waiting],
            ..Self::default()
        }
    }

    /// Waiting or called tickets owned by `driver_id`.
    #[must_use]
    pub fn active_for_driver(driver_id: DriverId) -> Self {
        Self {
            driver_id: Some(driver_id),
            statuses: TicketStatus::ACTIVE.to_vec(),
            ..Self::default()
        }
    }

    /// Tickets carrying `ticket_number`.
    #[must_use]
    pub fn with_number(ticket_number: TicketNumber) -> Self {
        Self {
            ticket_number: Some(ticket_number),
            ..Self::default()
        }
    }

    /// Sort results by ticket number.
    #[must_use]
    pub const fn ordered_by(mut self, order: CallOrdering) -> Self {
        self.order = Some(order);
        self
    }

    /// Cap the number of results.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `ticket` passes the filters (ordering and limit aside).
    #[must_use]
    pub fn matches(&self, ticket: &Ticket) -> bool {
        self.driver_id
            .as_ref()
            .is_none_or(|driver| &ticket.driver_id == driver)
            && self
                .ticket_number
                .as_ref()
                .is_none_or(|number| &ticket.ticket_number == number)
            && (self.statuses.is_empty() || self.statuses.contains(&ticket.status))
    }

    /// Run the query over an in-memory collection.
    ///
    /// Backends without native querying use this; it filters, sorts, then truncates.
    #[must_use]
    pub fn apply<'a>(&self, tickets: impl IntoIterator<Item = &'a Ticket>) -> Vec<Ticket> {
        let mut selected: Vec<Ticket> = tickets
            .into_iter()
            .filter(|ticket| self.matches(ticket))
            .cloned()
            .collect();
        if let Some(order) = self.order {
            order.sort(&mut selected);
        }
        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }
        selected
    }
}

/// Document-store abstraction for the ticket queue.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; a single store is shared by every
/// operation and every observer.
pub trait QueueStore: Send + Sync {
    /// Query tickets. Not transactional: results may be stale by the time they are used.
    ///
    /// # Errors
    ///
    /// - `Unavailable`: backend unreachable
    /// - `Serialization`: a stored document could not be decoded
    fn find_tickets(&self, query: TicketQuery) -> StoreFuture<'_, Vec<Ticket>>;

    /// Allocate the next ticket number and insert the ticket, atomically.
    ///
    /// Inside one transaction the store:
    ///
    /// 1. rejects the draft if its driver already has a waiting or called ticket,
    /// 2. reads the counter and advances it with [`SequenceCounter::advance`] using `ceiling`,
    /// 3. writes the counter back,
    /// 4. inserts a `Waiting` ticket numbered with the new counter value and box `"00"`.
    ///
    /// No two concurrent calls may receive the same number.
    ///
    /// # Errors
    ///
    /// - `ActiveTicketExists`: the driver already holds an active ticket
    /// - `TransactionConflict`: a concurrent writer won; retryable
    /// - `Unavailable`: backend unreachable
    fn allocate_ticket(&self, draft: TicketDraft, ceiling: u32) -> StoreFuture<'_, Ticket>;

    /// Transition every listed ticket to `Called`, all or nothing.
    ///
    /// Returns the post-update snapshots in the order of `ids`.
    ///
    /// # Errors
    ///
    /// - `DocumentMissing`: one of the tickets was deleted; nothing is applied
    /// - `TransactionConflict`: one of the tickets is no longer waiting; nothing is applied
    /// - `Unavailable`: backend unreachable
    fn mark_called(
        &self,
        ids: Vec<TicketId>,
        called_at: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<Ticket>>;

    /// Overwrite the last-called record.
    ///
    /// # Errors
    ///
    /// - `Unavailable`: backend unreachable
    fn publish_last_called(&self, record: LastCalledRecord) -> StoreFuture<'_, ()>;

    /// Read the last-called record.
    ///
    /// # Errors
    ///
    /// - `Unavailable`: backend unreachable
    fn load_last_called(&self) -> StoreFuture<'_, Option<LastCalledRecord>>;

    /// Remove the last-called record.
    ///
    /// # Errors
    ///
    /// - `Unavailable`: backend unreachable
    fn clear_last_called(&self) -> StoreFuture<'_, ()>;

    /// Delete the listed tickets as one atomic batch; ids that no longer exist are
    /// skipped. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// - `Unavailable`: backend unreachable
    fn delete_tickets(&self, ids: Vec<TicketId>) -> StoreFuture<'_, usize>;

    /// Delete every ticket as one batch. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// - `Unavailable`: backend unreachable
    fn delete_all_tickets(&self) -> StoreFuture<'_, usize>;

    /// Read the sequence counter.
    ///
    /// # Errors
    ///
    /// - `Unavailable`: backend unreachable
    fn load_counter(&self) -> StoreFuture<'_, SequenceCounter>;

    /// Reset the sequence counter to [`SequenceCounter::RESET`].
    ///
    /// # Errors
    ///
    /// - `Unavailable`: backend unreachable
    fn reset_counter(&self) -> StoreFuture<'_, ()>;

    /// Set the display slot of one ticket and return its new snapshot.
    ///
    /// # Errors
    ///
    /// - `DocumentMissing`: the ticket no longer exists
    /// - `Unavailable`: backend unreachable
    fn update_box(&self, id: TicketId, box_slot: BoxSlot) -> StoreFuture<'_, Ticket>;

    /// Subscribe to the ticket collection.
    ///
    /// # Errors
    ///
    /// - `Unavailable`: the listener could not be attached
    fn watch_tickets(&self) -> StoreFuture<'_, TicketSnapshotStream>;

    /// Subscribe to the last-called record.
    ///
    /// # Errors
    ///
    /// - `Unavailable`: the listener could not be attached
    fn watch_last_called(&self) -> StoreFuture<'_, LastCalledStream>;
}
