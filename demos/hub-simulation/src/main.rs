//! Hub Simulation - a day at the driver queue
//!
//! Simulates drivers arriving at a hub, requesting tickets from their phones, and an
//! operator calling them to the loading boxes in batches.
//!
//! # Running the Example
//!
//! ```bash
//! cargo run -p hub-simulation
//! ```
//!
//! Set `DATABASE_URL` to run against `PostgreSQL` instead of the in-memory store.
//! `DRIVER_QUEUE_*` variables tune the queue (see `QueueConfig::from_env`).

#![allow(missing_docs)]

use driver_queue_core::environment::{DriverProfile, SystemClock};
use driver_queue_core::geo::Coordinates;
use driver_queue_core::hub_settings::{AdminProfile, AdminRole, HubSettingsStore};
use driver_queue_core::queue_store::QueueStore;
use driver_queue_core::ticket::{BoxSlot, DriverId};
use driver_queue_postgres::{PostgresHubSettings, PostgresQueueStore};
use driver_queue_runtime::metrics::MetricsServer;
use driver_queue_runtime::{
    HubSettingsService, QueueConfig, QueueEnvironment, QueueObserver, QueueService,
    StorageConfig,
};
use driver_queue_testing::{FixedLocation, InMemoryHubSettings, InMemoryQueueStore, StaticIdentity};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const HUB: Coordinates = Coordinates::new(-23.550_5, -46.633_3);
const METERS_PER_DEGREE: f64 = 111_195.0;
const ROUTES: [&str; 4] = ["a-1", "B-12", " c-300 ", "D-7"];
const DRIVERS: usize = 12;

async fn open_stores(
    storage: &StorageConfig,
) -> anyhow::Result<(Arc<dyn QueueStore>, Arc<dyn HubSettingsStore>)> {
    if let Some(url) = &storage.database_url {
        let store = PostgresQueueStore::connect(url, storage.max_connections).await?;
        store.migrate().await?;
        tracing::info!("✓ Connected to PostgreSQL");
        let settings = PostgresHubSettings::from_pool(store.pool().clone());
        return Ok((Arc::new(store), Arc::new(settings)));
    }

    tracing::info!("✓ Using in-memory queue store");
    Ok((Arc::new(InMemoryQueueStore::new()), Arc::new(InMemoryHubSettings::new())))
}

/// A driver standing somewhere near the hub with the app open.
fn driver_at(index: usize, offset_m: f64) -> (DriverProfile, Coordinates) {
    let profile = DriverProfile {
        driver_id: DriverId::new(format!("driver-{index}")),
        name: format!("Driver {index}"),
        plate: format!("SIM{index:04}"),
        email: None,
    };
    let position = Coordinates::new(HUB.latitude + offset_m / METERS_PER_DEGREE, HUB.longitude);
    (profile, position)
}

#[tokio::main]
#[allow(clippy::too_many_lines)] // Demo walkthrough
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,hub_simulation=info,driver_queue_runtime=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting hub simulation");

    let config = QueueConfig::from_env()?;
    let storage = StorageConfig::from_env()?;

    let mut metrics = MetricsServer::new(storage.metrics_addr.parse()?);
    metrics.start()?;

    let (store, settings) = open_stores(&storage).await?;

    // The master administrator pins the hub position from the office.
    let master = AdminProfile {
        admin_id: "uid-master".to_string(),
        name: "Master".to_string(),
        role: AdminRole::Master,
    };
    let hub = HubSettingsService::new(
        Arc::clone(&settings),
        Arc::new(SystemClock),
        Arc::new(FixedLocation::at(HUB)),
        Arc::new(StaticIdentity::admin(master)),
    );
    let reference = hub.set_reference_point_here().await?;
    tracing::info!(
        latitude = reference.coordinates.latitude,
        longitude = reference.coordinates.longitude,
        "✓ Reference point set"
    );

    let observer = QueueObserver::new(Arc::clone(&store));
    let queue_subscription = observer.subscribe_to_queue(|tickets| {
        tracing::info!(tickets = tickets.len(), "Queue board updated");
    });
    let panel_subscription = observer.subscribe_to_last_called(|record| match record {
        Some(record) => tracing::info!(
            ticket = record.ticket_number.as_str(),
            driver = record.driver_name.as_str(),
            "Calling panel"
        ),
        None => tracing::info!("Calling panel cleared"),
    });

    // Some drivers are still on the access road, outside the eligibility radius.
    let arrivals: Vec<_> = {
        let mut rng = rand::thread_rng();
        (0..DRIVERS)
            .map(|i| driver_at(i, rng.gen_range(-160.0..160.0)))
            .collect()
    };

    let mut handles = Vec::with_capacity(DRIVERS);
    for (i, (profile, position)) in arrivals.into_iter().enumerate() {
        let phone = QueueService::new(
            Arc::clone(&store),
            Arc::clone(&settings),
            QueueEnvironment {
                clock: Arc::new(SystemClock),
                location: Arc::new(FixedLocation::at(position)),
                identity: Arc::new(StaticIdentity::driver(profile.clone())),
            },
            config.clone(),
        );
        let route = ROUTES[i % ROUTES.len()];
        handles.push(tokio::spawn(async move {
            match phone.request_ticket(route).await {
                Ok(ticket) => tracing::info!(
                    driver = profile.driver_id.as_str(),
                    ticket = ticket.ticket_number.as_str(),
                    route = ticket.route.as_str(),
                    "Ticket issued"
                ),
                Err(e) => tracing::warn!(
                    driver = profile.driver_id.as_str(),
                    kind = e.kind(),
                    error = %e,
                    "Ticket refused"
                ),
            }
        }));
    }
    for handle in handles {
        handle.await?;
    }

    // The operator console needs no device position or driver identity.
    let console = QueueService::new(
        Arc::clone(&store),
        Arc::clone(&settings),
        QueueEnvironment {
            clock: Arc::new(SystemClock),
            location: Arc::new(FixedLocation::at(HUB)),
            identity: Arc::new(StaticIdentity::anonymous()),
        },
        config,
    );

    for round in 1..=3 {
        tokio::time::sleep(Duration::from_millis(200)).await;
        match console.call_batch(3).await {
            Ok(result) => {
                tracing::info!(round, called = result.called.len(), "✓ Batch called");
                if let Some(first) = result.called.first() {
                    let boxed = console
                        .assign_box(first.ticket_number.clone(), BoxSlot::new(format!("{round:02}")))
                        .await?;
                    tracing::info!(
                        ticket = boxed.ticket_number.as_str(),
                        box_slot = boxed.box_slot.as_str(),
                        "Box assigned"
                    );
                }
            }
            Err(e) => tracing::warn!(round, error = %e, "Batch call failed"),
        }
    }

    tokio::time::sleep(Duration::from_millis(200)).await;
    console.clear_queue().await?;
    tracing::info!("✓ Queue cleared at end of shift");
    tokio::time::sleep(Duration::from_millis(200)).await;

    queue_subscription.cancel();
    panel_subscription.cancel();

    if let Some(snapshot) = metrics.render() {
        tracing::info!("Metrics snapshot:\n{snapshot}");
    }

    tracing::info!("✓ Simulation complete");
    Ok(())
}
