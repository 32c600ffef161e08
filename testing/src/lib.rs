//! # Driver Queue Testing
//!
//! Testing utilities and helpers for the driver queue.
//!
//! This crate provides:
//! - In-memory implementations of the store traits
//! - Mock implementations of the environment traits
//! - Fixture helpers for hubs, drivers and tickets
//! - Property-based testing strategies
//!
//! ## Example
//!
//! ```
//! use driver_queue_testing::{InMemoryQueueStore, helpers, test_clock};
//! use driver_queue_core::environment::Clock;
//! use driver_queue_core::queue_store::QueueStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = InMemoryQueueStore::new();
//! let draft = helpers::draft("driver-1", test_clock().now());
//!
//! let ticket = store.allocate_ticket(draft, 1000).await?;
//! assert_eq!(ticket.ticket_number.as_str(), "1");
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use driver_queue_core::environment::Clock;

mod queue_store_mocks;

pub use queue_store_mocks::{InMemoryHubSettings, InMemoryQueueStore, StoreOperation};

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use driver_queue_core::environment::{
        DriverProfile, IdentityContext, LocationError, LocationFuture, LocationProvider,
    };
    use driver_queue_core::geo::Coordinates;
    use driver_queue_core::hub_settings::AdminProfile;
    use std::sync::{Arc, RwLock};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use driver_queue_testing::mocks::FixedClock;
    /// use driver_queue_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Location provider returning a position the test controls.
    ///
    /// Clones share the position, so a test can move the "device" after handing
    /// the provider to a service.
    ///
    /// # Example
    ///
    /// ```
    /// use driver_queue_testing::mocks::FixedLocation;
    /// use driver_queue_core::environment::{LocationError, LocationProvider};
    /// use driver_queue_core::geo::Coordinates;
    ///
    /// # async fn example() {
    /// let location = FixedLocation::at(Coordinates::new(1.0, 2.0));
    /// assert_eq!(location.current_position().await, Ok(Coordinates::new(1.0, 2.0)));
    ///
    /// location.fail_with(LocationError::NoFix);
    /// assert!(location.current_position().await.is_err());
    /// # }
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedLocation {
        position: Arc<RwLock<Result<Coordinates, LocationError>>>,
    }

    impl FixedLocation {
        /// Provider reporting `coordinates`
        #[must_use]
        pub fn at(coordinates: Coordinates) -> Self {
            Self {
                position: Arc::new(RwLock::new(Ok(coordinates))),
            }
        }

        /// Provider that cannot resolve a position
        #[must_use]
        pub fn unavailable(error: LocationError) -> Self {
            Self {
                position: Arc::new(RwLock::new(Err(error))),
            }
        }

        /// Move the device to `coordinates`
        #[allow(clippy::unwrap_used)]
        pub fn move_to(&self, coordinates: Coordinates) {
            *self.position.write().unwrap() = Ok(coordinates);
        }

        /// Make subsequent lookups fail with `error`
        #[allow(clippy::unwrap_used)]
        pub fn fail_with(&self, error: LocationError) {
            *self.position.write().unwrap() = Err(error);
        }
    }

    impl LocationProvider for FixedLocation {
        #[allow(clippy::unwrap_used)]
        fn current_position(&self) -> LocationFuture<'_> {
            let position = self.position.read().unwrap().clone();
            Box::pin(async move { position })
        }
    }

    /// Identity context with a fixed signed-in driver and/or administrator.
    #[derive(Debug, Clone, Default)]
    pub struct StaticIdentity {
        driver: Option<DriverProfile>,
        admin: Option<AdminProfile>,
    }

    impl StaticIdentity {
        /// Session with no signed-in user
        #[must_use]
        pub fn anonymous() -> Self {
            Self::default()
        }

        /// Session belonging to `driver`
        #[must_use]
        pub fn driver(driver: DriverProfile) -> Self {
            Self {
                driver: Some(driver),
                admin: None,
            }
        }

        /// Session belonging to `admin`
        #[must_use]
        pub fn admin(admin: AdminProfile) -> Self {
            Self {
                driver: None,
                admin: Some(admin),
            }
        }
    }

    impl IdentityContext for StaticIdentity {
        fn current_driver(&self) -> Option<DriverProfile> {
            self.driver.clone()
        }

        fn current_admin(&self) -> Option<AdminProfile> {
            self.admin.clone()
        }
    }
}

/// Fixture helpers for hubs, drivers and tickets.
pub mod helpers {
    use super::{DateTime, Utc};
    use driver_queue_core::environment::DriverProfile;
    use driver_queue_core::geo::Coordinates;
    use driver_queue_core::hub_settings::{AdminProfile, AdminRole, ReferencePoint};
    use driver_queue_core::ticket::{
        DriverId, RouteCode, Ticket, TicketDraft, TicketId, TicketNumber,
    };

    /// Reference hub used across tests (São Paulo, Praça da Sé).
    pub const HUB: Coordinates = Coordinates::new(-23.550_5, -46.633_3);

    /// Meters per degree of latitude, close enough for fixture offsets.
    const METERS_PER_DEGREE: f64 = 111_195.0;

    /// A point `meters` due north of [`HUB`].
    #[must_use]
    pub fn north_of_hub(meters: f64) -> Coordinates {
        Coordinates::new(HUB.latitude + meters / METERS_PER_DEGREE, HUB.longitude)
    }

    /// [`HUB`] as a stored reference point.
    #[must_use]
    pub fn hub_reference(updated_at: DateTime<Utc>) -> ReferencePoint {
        ReferencePoint {
            coordinates: HUB,
            updated_at,
            updated_by: "Master".to_string(),
        }
    }

    /// Route `A-1`.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn route() -> RouteCode {
        "A-1".parse().unwrap()
    }

    /// Profile for `driver_id` with a plate derived from it.
    #[must_use]
    pub fn driver_profile(driver_id: &str) -> DriverProfile {
        DriverProfile {
            driver_id: DriverId::from(driver_id),
            name: format!("Driver {driver_id}"),
            plate: "ABC1D23".to_string(),
            email: Some(format!("{driver_id}@example.com")),
        }
    }

    /// Draft for `driver_id` on route `A-1`.
    #[must_use]
    pub fn draft(driver_id: &str, issued_at: DateTime<Utc>) -> TicketDraft {
        let profile = driver_profile(driver_id);
        TicketDraft {
            driver_id: profile.driver_id,
            driver_name: profile.name,
            plate: profile.plate,
            route: route(),
            email: profile.email,
            issued_at,
        }
    }

    /// A waiting ticket with an explicit number, for seeding stores directly.
    #[must_use]
    pub fn waiting_ticket(driver_id: &str, number: &str, issued_at: DateTime<Utc>) -> Ticket {
        Ticket::issue(
            TicketId::new(),
            draft(driver_id, issued_at),
            TicketNumber::from(number),
        )
    }

    /// Administrator with the given role.
    #[must_use]
    pub fn admin(name: &str, role: AdminRole) -> AdminProfile {
        AdminProfile {
            admin_id: format!("uid-{}", name.to_lowercase()),
            name: name.to_string(),
            role,
        }
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use driver_queue_core::geo::Coordinates;
    use driver_queue_core::ticket::{DriverId, RouteCode};
    use proptest::prelude::*;

    /// Strategy for valid route codes (`A-1` through `Z-999`).
    pub fn route_code_strategy() -> impl Strategy<Value = RouteCode> {
        "[A-Z]-[0-9]{1,3}".prop_filter_map("route codes always parse", |s| s.parse().ok())
    }

    /// Strategy for strings that are not route codes.
    pub fn invalid_route_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            "[a-z]-[0-9]{1,3}",
            "[A-Z]{2}-[0-9]{1,3}",
            "[A-Z]-[0-9]{4,6}",
            "[A-Z][0-9]{1,3}",
            Just(String::new()),
        ]
    }

    /// Strategy for driver identifiers.
    pub fn driver_id_strategy() -> impl Strategy<Value = DriverId> {
        "[a-zA-Z0-9]{8,28}".prop_map(DriverId::from)
    }

    /// Strategy for valid positions on the globe.
    pub fn coordinates_strategy() -> impl Strategy<Value = Coordinates> {
        (-90.0f64..=90.0, -180.0f64..=180.0).prop_map(|(lat, lon)| Coordinates::new(lat, lon))
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, FixedLocation, StaticIdentity, test_clock};
