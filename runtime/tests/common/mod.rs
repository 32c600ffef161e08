//! Shared fixtures for queue service integration tests

#![allow(dead_code)] // Not every test binary uses every fixture
#![allow(clippy::expect_used)] // Tests can expect

use driver_queue_core::environment::Clock;
use driver_queue_core::hub_settings::{AdminProfile, AdminRole};
use driver_queue_runtime::{
    IssueTicketRequest, QueueConfig, QueueEnvironment, QueueObserver, QueueService,
};
use driver_queue_testing::{
    FixedLocation, InMemoryHubSettings, InMemoryQueueStore, StaticIdentity, helpers, test_clock,
};
use std::sync::Arc;

/// A service wired to in-memory collaborators, with handles kept for assertions.
pub struct Harness {
    pub store: InMemoryQueueStore,
    pub settings: InMemoryHubSettings,
    pub location: FixedLocation,
    pub service: QueueService,
    pub observer: QueueObserver,
}

/// Harness with the default configuration, a configured hub, and the device 10 m away.
pub fn harness() -> Harness {
    harness_with(QueueConfig::default(), InMemoryQueueStore::new())
}

/// Harness over a given store and configuration.
pub fn harness_with(config: QueueConfig, store: InMemoryQueueStore) -> Harness {
    harness_for(config, store, StaticIdentity::anonymous())
}

/// Route service logs to the test output; `RUST_LOG=debug` shows them on failure.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Harness whose device is signed in as `identity`.
pub fn harness_for(
    config: QueueConfig,
    store: InMemoryQueueStore,
    identity: StaticIdentity,
) -> Harness {
    init_tracing();
    let settings = InMemoryHubSettings::with_reference_point(helpers::hub_reference(
        test_clock().now(),
    ));
    let location = FixedLocation::at(helpers::north_of_hub(10.0));
    let environment = QueueEnvironment {
        clock: Arc::new(test_clock()),
        location: Arc::new(location.clone()),
        identity: Arc::new(identity),
    };
    let service = QueueService::new(
        Arc::new(store.clone()),
        Arc::new(settings.clone()),
        environment,
        config,
    );
    let observer = QueueObserver::new(Arc::new(store.clone()));
    Harness {
        store,
        settings,
        location,
        service,
        observer,
    }
}

/// Ticket request for `driver_id` on route `A-1`.
pub fn request(driver_id: &str) -> IssueTicketRequest {
    let profile = helpers::driver_profile(driver_id);
    IssueTicketRequest {
        driver_id: profile.driver_id,
        driver_name: profile.name,
        plate: profile.plate,
        route: "A-1".to_string(),
        email: profile.email,
    }
}

/// Issue tickets to `driver-0` .. `driver-{count-1}`, in order.
pub async fn issue_many(service: &QueueService, count: usize) {
    for i in 0..count {
        service
            .issue_ticket(request(&format!("driver-{i}")))
            .await
            .expect("issuance should succeed");
    }
}

/// A master administrator profile.
pub fn master() -> AdminProfile {
    helpers::admin("Master", AdminRole::Master)
}
