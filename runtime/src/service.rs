//! Queue service: the operations drivers and administrators invoke.
//!
//! [`QueueService`] holds no queue state of its own. Every operation is a short
//! sequence of calls against the injected [`QueueStore`]; any number of services
//! (one per device) can share a store, and the store's transactional primitives
//! are what keep them consistent.
//!
//! # Example
//!
//! ```ignore
//! let service = QueueService::new(store, settings, environment, QueueConfig::default());
//!
//! let ticket = service.issue_ticket(request).await?;
//! let result = service.call_batch(5).await?;
//! ```

use crate::config::QueueConfig;
use crate::metrics::QueueMetrics;
use driver_queue_core::environment::{Clock, IdentityContext, LocationProvider};
use driver_queue_core::error::{ClearStage, QueueError, QueueStoreError};
use driver_queue_core::hub_settings::HubSettingsStore;
use driver_queue_core::queue_store::{QueueStore, TicketQuery};
use driver_queue_core::ticket::{
    BoxSlot, DriverId, LastCalledRecord, RouteCode, Ticket, TicketDraft, TicketNumber,
    TicketStatus,
};
use std::sync::Arc;
use std::time::Instant;

/// Injected collaborators of the queue service.
#[derive(Clone)]
pub struct QueueEnvironment {
    /// Source of issuance and call timestamps
    pub clock: Arc<dyn Clock>,
    /// Position of the requesting device
    pub location: Arc<dyn LocationProvider>,
    /// Signed-in user of the requesting device
    pub identity: Arc<dyn IdentityContext>,
}

/// Everything needed to issue a ticket to a driver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssueTicketRequest {
    /// Requesting driver
    pub driver_id: DriverId,
    /// Driver's registered name
    pub driver_name: String,
    /// Vehicle plate
    pub plate: String,
    /// Route code as typed, validated before anything else happens
    pub route: String,
    /// Contact e-mail copied onto the ticket
    pub email: Option<String>,
}

/// Outcome of publishing the last-called record after a batch call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LastCalledPublication {
    /// The board now shows the record.
    Published(LastCalledRecord),
    /// The tickets were called but the board still shows the previous record.
    Failed {
        /// Record that should have been published
        record: LastCalledRecord,
        /// Why the write failed
        error: QueueStoreError,
    },
}

impl LastCalledPublication {
    /// Whether the board was updated.
    #[must_use]
    pub const fn is_published(&self) -> bool {
        matches!(self, Self::Published(_))
    }

    /// The record computed from the batch, whether or not it was written.
    #[must_use]
    pub const fn record(&self) -> &LastCalledRecord {
        match self {
            Self::Published(record) | Self::Failed { record, .. } => record,
        }
    }
}

/// Result of a successful batch call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallResult {
    /// Tickets moved to `Called`, in call order
    pub called: Vec<Ticket>,
    /// What happened to the last-called board
    pub last_called: LastCalledPublication,
}

/// Ticket issuance, batch calls and queue maintenance.
#[derive(Clone)]
pub struct QueueService {
    store: Arc<dyn QueueStore>,
    settings: Arc<dyn HubSettingsStore>,
    environment: QueueEnvironment,
    config: QueueConfig,
}

impl QueueService {
    /// Create a service over `store` and `settings`.
    #[must_use]
    pub fn new(
        store: Arc<dyn QueueStore>,
        settings: Arc<dyn HubSettingsStore>,
        environment: QueueEnvironment,
        config: QueueConfig,
    ) -> Self {
        Self {
            store,
            settings,
            environment,
            config,
        }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Issue a ticket to a driver standing at the hub.
    ///
    /// Validates the route, the device position against the hub reference point and
    /// the one-active-ticket rule, then allocates the next number atomically. The
    /// position check happens before the allocation and is not repeated inside it.
    ///
    /// # Errors
    ///
    /// - [`QueueError::InvalidRoute`]: malformed route code
    /// - [`QueueError::LocationUnavailable`]: no device position, or one off the globe
    /// - [`QueueError::ReferencePointUnset`]: the hub has no reference point yet
    /// - [`QueueError::OutOfRange`]: farther than the eligibility radius
    /// - [`QueueError::DuplicateActiveTicket`]: the driver already holds a ticket
    /// - [`QueueError::TransactionConflict`]: lost a race; the caller may retry
    /// - [`QueueError::StoreUnavailable`]: backend failure
    #[tracing::instrument(skip(self, request), fields(driver_id = %request.driver_id))]
    pub async fn issue_ticket(&self, request: IssueTicketRequest) -> Result<Ticket, QueueError> {
        let started = Instant::now();
        let result = self.try_issue_ticket(request).await;
        match &result {
            Ok(ticket) => {
                QueueMetrics::record_issued(started.elapsed());
                tracing::info!(ticket_number = %ticket.ticket_number, "Ticket issued");
            }
            Err(error) => {
                QueueMetrics::record_rejection(error.kind());
                tracing::info!(reason = error.kind(), %error, "Ticket request rejected");
            }
        }
        result
    }

    async fn try_issue_ticket(&self, request: IssueTicketRequest) -> Result<Ticket, QueueError> {
        let route: RouteCode = request.route.parse()?;

        let position = self
            .environment
            .location
            .current_position()
            .await
            .map_err(|e| QueueError::LocationUnavailable(e.to_string()))?;
        if !position.is_valid() {
            return Err(QueueError::LocationUnavailable(format!(
                "device reported an invalid position {position}"
            )));
        }
        let reference = self
            .settings
            .load_reference_point()
            .await?
            .ok_or(QueueError::ReferencePointUnset)?;

        let distance_meters = position.distance_to(&reference.coordinates);
        tracing::debug!(distance_meters, "Distance to hub");
        if distance_meters.is_nan() || distance_meters > self.config.eligibility_radius_m {
            return Err(QueueError::OutOfRange {
                distance_meters,
                radius_meters: self.config.eligibility_radius_m,
            });
        }

        // Fast path; allocate_ticket re-checks inside its transaction.
        if let Some(existing) = self.active_ticket(&request.driver_id).await? {
            return Err(QueueError::DuplicateActiveTicket {
                driver_id: request.driver_id,
                ticket_number: Some(existing.ticket_number),
            });
        }

        let draft = TicketDraft {
            driver_id: request.driver_id,
            driver_name: request.driver_name,
            plate: request.plate,
            route,
            email: request.email,
            issued_at: self.environment.clock.now(),
        };
        Ok(self.store.allocate_ticket(draft, self.config.ceiling).await?)
    }

    /// Issue a ticket to the signed-in driver for the route as typed on the device.
    ///
    /// The route input is normalized first (upper-cased, stray characters removed).
    ///
    /// # Errors
    ///
    /// [`QueueError::NotAuthenticated`] when no driver is signed in; otherwise as
    /// [`QueueService::issue_ticket`].
    pub async fn request_ticket(&self, route_input: &str) -> Result<Ticket, QueueError> {
        let driver = self
            .environment
            .identity
            .current_driver()
            .ok_or(QueueError::NotAuthenticated)?;
        let route = RouteCode::normalize(route_input)?;

        self.issue_ticket(IssueTicketRequest {
            driver_id: driver.driver_id,
            driver_name: driver.name,
            plate: driver.plate,
            route: route.to_string(),
            email: driver.email,
        })
        .await
    }

    /// Call the next `quantity` waiting drivers.
    ///
    /// Selected tickets move to `Called` together. The first of them is then written
    /// as the last-called record in a separate step; if that write fails the call
    /// still stands and the failure is reported in [`CallResult::last_called`].
    ///
    /// # Errors
    ///
    /// - [`QueueError::InvalidQuantity`]: `quantity` outside `1..=max_batch_size`
    /// - [`QueueError::NoWaitingTickets`]: nobody is waiting; nothing changes
    /// - [`QueueError::TransactionConflict`]: a selected ticket changed concurrently; nothing changes
    /// - [`QueueError::StoreUnavailable`]: backend failure
    #[tracing::instrument(skip(self))]
    pub async fn call_batch(&self, quantity: i64) -> Result<CallResult, QueueError> {
        let started = Instant::now();
        let max = self.config.max_batch_size;
        let limit = usize::try_from(quantity)
            .ok()
            .filter(|&q| q >= 1 && i64::from(max) >= quantity)
            .ok_or(QueueError::InvalidQuantity {
                requested: quantity,
                max,
            })?;

        let waiting = self
            .store
            .find_tickets(
                TicketQuery::waiting()
                    .ordered_by(self.config.call_ordering)
                    .limit(limit),
            )
            .await?;
        if waiting.is_empty() {
            tracing::debug!("No waiting tickets to call");
            return Err(QueueError::NoWaitingTickets);
        }

        let ids = waiting.iter().map(|ticket| ticket.id).collect();
        let called = self
            .store
            .mark_called(ids, self.environment.clock.now())
            .await?;
        let first = called.first().ok_or(QueueError::NoWaitingTickets)?;
        let record = LastCalledRecord::from(first);

        let last_called = match self.store.publish_last_called(record.clone()).await {
            Ok(()) => LastCalledPublication::Published(record),
            Err(error) => {
                QueueMetrics::record_partial_failure("call_batch");
                tracing::warn!(
                    ticket_number = %record.ticket_number,
                    %error,
                    "Tickets called but last-called record not updated"
                );
                LastCalledPublication::Failed { record, error }
            }
        };

        QueueMetrics::record_batch_call(called.len(), started.elapsed());
        tracing::info!(
            called = called.len(),
            first = %last_called.record().ticket_number,
            "Batch called"
        );
        Ok(CallResult {
            called,
            last_called,
        })
    }

    /// Empty the queue, reset the counter and clear the last-called board.
    ///
    /// The three steps run in order and each only if the previous one succeeded.
    /// The counter is reset even when the queue was already empty.
    ///
    /// # Errors
    ///
    /// - [`QueueError::StoreUnavailable`]: the tickets could not be deleted; nothing changed
    /// - [`QueueError::PartiallyCleared`]: a later step failed; `completed` names the
    ///   last step that took effect
    #[tracing::instrument(skip(self))]
    pub async fn clear_queue(&self) -> Result<(), QueueError> {
        let started = Instant::now();
        let removed = self.store.delete_all_tickets().await?;
        tracing::debug!(removed, "Tickets deleted");

        self.store
            .reset_counter()
            .await
            .map_err(|source| Self::partially_cleared(ClearStage::TicketsDeleted, source))?;
        self.store
            .clear_last_called()
            .await
            .map_err(|source| Self::partially_cleared(ClearStage::CounterReset, source))?;

        QueueMetrics::record_clear(started.elapsed());
        tracing::info!(removed, "Queue cleared");
        Ok(())
    }

    fn partially_cleared(completed: ClearStage, source: QueueStoreError) -> QueueError {
        QueueMetrics::record_partial_failure("clear_queue");
        tracing::warn!(%completed, error = %source, "Queue clear stopped partway");
        QueueError::PartiallyCleared { completed, source }
    }

    /// Remove every ticket carrying `ticket_number` in one batch.
    ///
    /// Returns how many tickets were removed.
    ///
    /// # Errors
    ///
    /// - [`QueueError::NotFound`]: no ticket carries the number
    /// - [`QueueError::StoreUnavailable`]: backend failure
    #[tracing::instrument(skip(self, ticket_number), fields(ticket_number = %ticket_number))]
    pub async fn delete_ticket(&self, ticket_number: TicketNumber) -> Result<usize, QueueError> {
        let matches = self
            .store
            .find_tickets(TicketQuery::with_number(ticket_number.clone()))
            .await?;
        if matches.is_empty() {
            return Err(QueueError::NotFound(ticket_number));
        }

        let ids = matches.iter().map(|ticket| ticket.id).collect();
        let removed = self.store.delete_tickets(ids).await?;
        if removed == 0 {
            // Deleted by someone else between the query and the batch.
            return Err(QueueError::NotFound(ticket_number));
        }
        tracing::info!(removed, "Ticket deleted");
        Ok(removed)
    }

    /// The driver's waiting or called ticket, if any.
    ///
    /// # Errors
    ///
    /// [`QueueError::StoreUnavailable`] on backend failure.
    pub async fn active_ticket(&self, driver_id: &DriverId) -> Result<Option<Ticket>, QueueError> {
        let mut tickets = self
            .store
            .find_tickets(TicketQuery::active_for_driver(driver_id.clone()).limit(1))
            .await?;
        Ok(tickets.pop())
    }

    /// Assign a display slot to an active ticket.
    ///
    /// The last-called record keeps the slot it was published with.
    ///
    /// # Errors
    ///
    /// - [`QueueError::NotFound`]: no active ticket carries the number
    /// - [`QueueError::TransactionConflict`]: the ticket was deleted concurrently
    /// - [`QueueError::StoreUnavailable`]: backend failure
    #[tracing::instrument(
        skip(self, ticket_number, box_slot),
        fields(ticket_number = %ticket_number, box_slot = %box_slot)
    )]
    pub async fn assign_box(
        &self,
        ticket_number: TicketNumber,
        box_slot: BoxSlot,
    ) -> Result<Ticket, QueueError> {
        let query = TicketQuery {
            statuses: TicketStatus::ACTIVE.to_vec(),
            ..TicketQuery::with_number(ticket_number.clone())
        };
        let ticket = self
            .store
            .find_tickets(query.limit(1))
            .await?
            .pop()
            .ok_or(QueueError::NotFound(ticket_number))?;

        let updated = self.store.update_box(ticket.id, box_slot).await?;
        tracing::info!("Box assigned");
        Ok(updated)
    }
}
