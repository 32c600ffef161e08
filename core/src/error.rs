//! Error taxonomy for queue operations.
//!
//! Two layers, mirroring the split between the service and its store:
//!
//! - [`QueueStoreError`]: what a [`QueueStore`](crate::queue_store::QueueStore) backend
//!   reports (transaction conflicts, connectivity, invariant rejections).
//! - [`QueueError`]: what the service reports to its caller (the UI layer), which turns
//!   each variant into user-facing messaging.

use crate::ticket::{DriverId, ParseRouteCodeError, TicketId, TicketNumber};
use thiserror::Error;

/// Errors reported by a queue store backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueStoreError {
    /// A concurrent writer touched the same documents; the operation may be retried.
    #[error("Transaction conflict: {0}")]
    TransactionConflict(String),

    /// Network or backend failure.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The one-active-ticket invariant rejected an insert.
    #[error("Driver {0} already has an active ticket")]
    ActiveTicketExists(DriverId),

    /// A document addressed by a batch no longer exists.
    #[error("Ticket document missing: {0}")]
    DocumentMissing(TicketId),

    /// Stored data could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// How far a queue clear got before failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearStage {
    /// All tickets were deleted; the counter was not reset.
    TicketsDeleted,
    /// Tickets deleted and counter reset; the last-called record was not removed.
    CounterReset,
}

impl ClearStage {
    /// Short label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TicketsDeleted => "tickets_deleted",
            Self::CounterReset => "counter_reset",
        }
    }
}

impl std::fmt::Display for ClearStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors reported by queue service operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueueError {
    /// The driver already holds a waiting or called ticket.
    #[error("Driver {driver_id} already has an active ticket")]
    DuplicateActiveTicket {
        /// The driver that asked for a second ticket
        driver_id: DriverId,
        /// The ticket already held, when the pre-check saw it
        ticket_number: Option<TicketNumber>,
    },

    /// The driver is farther from the hub than the admission radius.
    #[error("Driver is {distance_meters:.1} m from the hub (limit {radius_meters:.0} m)")]
    OutOfRange {
        /// Measured distance to the reference point
        distance_meters: f64,
        /// Configured admission radius
        radius_meters: f64,
    },

    /// The device position could not be obtained.
    #[error("Location unavailable: {0}")]
    LocationUnavailable(String),

    /// A batch call found nobody waiting.
    #[error("No waiting tickets")]
    NoWaitingTickets,

    /// No ticket carries the given number.
    #[error("Ticket {0} not found")]
    NotFound(TicketNumber),

    /// A concurrent writer won; retrying may succeed.
    #[error("Transaction conflict: {0}")]
    TransactionConflict(String),

    /// Backend or network failure.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The route code is malformed.
    #[error(transparent)]
    InvalidRoute(#[from] ParseRouteCodeError),

    /// Batch size outside `1..=max`.
    #[error("Invalid batch quantity {requested}: must be between 1 and {max}")]
    InvalidQuantity {
        /// Quantity asked for
        requested: i64,
        /// Configured upper bound
        max: u32,
    },

    /// A latitude/longitude pair that is not a position on the globe.
    #[error("Invalid coordinates ({latitude}, {longitude})")]
    InvalidCoordinates {
        /// Latitude as given
        latitude: f64,
        /// Longitude as given
        longitude: f64,
    },

    /// No hub reference point has been configured yet.
    #[error("Hub reference point is not configured")]
    ReferencePointUnset,

    /// No signed-in user is available for the operation.
    #[error("No authenticated user")]
    NotAuthenticated,

    /// The acting user lacks the role the operation needs.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// A queue clear stopped partway; the earlier stages are already applied.
    #[error("Queue clear stopped after {completed}: {source}")]
    PartiallyCleared {
        /// Last stage that succeeded
        completed: ClearStage,
        /// Failure of the following stage
        source: QueueStoreError,
    },
}

impl QueueError {
    /// Whether the caller may reasonably retry the same operation.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransactionConflict(_) | Self::StoreUnavailable(_) | Self::LocationUnavailable(_)
        )
    }

    /// Short label used as a metrics dimension.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::DuplicateActiveTicket { .. } => "duplicate_active_ticket",
            Self::OutOfRange { .. } => "out_of_range",
            Self::LocationUnavailable(_) => "location_unavailable",
            Self::NoWaitingTickets => "no_waiting_tickets",
            Self::NotFound(_) => "not_found",
            Self::TransactionConflict(_) => "transaction_conflict",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::InvalidRoute(_) => "invalid_route",
            Self::InvalidQuantity { .. } => "invalid_quantity",
            Self::InvalidCoordinates { .. } => "invalid_coordinates",
            Self::ReferencePointUnset => "reference_point_unset",
            Self::NotAuthenticated => "not_authenticated",
            Self::PermissionDenied(_) => "permission_denied",
            Self::PartiallyCleared { .. } => "partially_cleared",
        }
    }
}

impl From<QueueStoreError> for QueueError {
    fn from(error: QueueStoreError) -> Self {
        match error {
            QueueStoreError::TransactionConflict(reason) => Self::TransactionConflict(reason),
            QueueStoreError::Unavailable(reason) => Self::StoreUnavailable(reason),
            QueueStoreError::ActiveTicketExists(driver_id) => Self::DuplicateActiveTicket {
                driver_id,
                ticket_number: None,
            },
            QueueStoreError::DocumentMissing(id) => {
                Self::TransactionConflict(format!("ticket {id} was removed concurrently"))
            }
            QueueStoreError::Serialization(reason) => Self::StoreUnavailable(reason),
        }
    }
}
