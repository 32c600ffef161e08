//! # Driver Queue Core
//!
//! Core types and traits for the hub driver queue.
//!
//! Drivers request a ticket ("senha") while standing at the hub, an administrator
//! calls waiting drivers in batches, and every screen watches the queue and the
//! last-called board live. This crate holds the pieces every other crate shares:
//!
//! - [`ticket`]: tickets, identifiers, route codes, the last-called record
//! - [`sequence`]: the wrap-around ticket counter
//! - [`geo`]: haversine distance for the hub eligibility check
//! - [`queue_store`]: the document-store trait the service runs against
//! - [`hub_settings`]: the hub reference point and administrator roles
//! - [`error`]: store-level and service-level error taxonomies
//! - [`environment`]: injected collaborators (clock, location, identity)
//!
//! The service itself lives in `driver-queue-runtime`; in-memory implementations of
//! the traits live in `driver-queue-testing`.

pub mod error;
pub mod geo;
pub mod hub_settings;
pub mod queue_store;
pub mod sequence;
pub mod ticket;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use error::{ClearStage, QueueError, QueueStoreError};
pub use geo::{Coordinates, ELIGIBILITY_RADIUS_METERS, haversine_distance};
pub use hub_settings::{AdminProfile, AdminRole, HubSettingsStore, ReferencePoint};
pub use queue_store::{QueueStore, TicketQuery};
pub use sequence::{DEFAULT_CEILING, SequenceCounter};
pub use ticket::{
    BoxSlot, CallOrdering, DriverId, LastCalledRecord, RouteCode, Ticket, TicketDraft, TicketId,
    TicketNumber, TicketStatus,
};

/// Environment module - Dependency injection traits
///
/// Everything the queue service needs from the device or the platform is
/// abstracted behind these traits and injected:
///
/// - [`Clock`](environment::Clock): issuance and call timestamps
/// - [`LocationProvider`](environment::LocationProvider): the device position
/// - [`IdentityContext`](environment::IdentityContext): the signed-in driver or administrator
pub mod environment {
    use crate::geo::Coordinates;
    use crate::hub_settings::AdminProfile;
    use crate::ticket::DriverId;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use std::future::Future;
    use std::pin::Pin;
    use thiserror::Error;

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Test - fixed time for deterministic tests
    /// struct FixedClock { time: DateTime<Utc> }
    /// impl Clock for FixedClock {
    ///     fn now(&self) -> DateTime<Utc> {
    ///         self.time
    ///     }
    /// }
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Why the device position could not be obtained.
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum LocationError {
        /// The user has not granted location access.
        #[error("Location permission denied")]
        PermissionDenied,

        /// The provider has no fix yet.
        #[error("No location fix available")]
        NoFix,

        /// Any other provider failure.
        #[error("Location provider error: {0}")]
        Provider(String),
    }

    /// Boxed future returned by [`LocationProvider::current_position`].
    pub type LocationFuture<'a> =
        Pin<Box<dyn Future<Output = Result<Coordinates, LocationError>> + Send + 'a>>;

    /// Source of the device's current position.
    pub trait LocationProvider: Send + Sync {
        /// Resolve the current position.
        ///
        /// # Errors
        ///
        /// Returns [`LocationError`] when no position can be obtained.
        fn current_position(&self) -> LocationFuture<'_>;
    }

    /// Registered driver as known to the identity provider and the driver profile.
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct DriverProfile {
        /// Identity-provider uid
        pub driver_id: DriverId,
        /// Registered name
        pub name: String,
        /// Registered vehicle plate
        pub plate: String,
        /// Account e-mail
        pub email: Option<String>,
    }

    /// The signed-in user of the current device.
    pub trait IdentityContext: Send + Sync {
        /// The signed-in driver, if the session belongs to one.
        fn current_driver(&self) -> Option<DriverProfile>;

        /// The signed-in administrator, if the session belongs to one.
        fn current_admin(&self) -> Option<AdminProfile>;
    }
}
