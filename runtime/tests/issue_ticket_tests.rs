//! Integration tests for ticket issuance

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

mod common;

use common::{harness, harness_for, harness_with, issue_many, request};
use driver_queue_core::environment::{Clock, LocationError};
use driver_queue_core::error::{QueueError, QueueStoreError};
use driver_queue_core::geo::Coordinates;
use driver_queue_core::hub_settings::ReferencePoint;
use driver_queue_core::ticket::{BoxSlot, DriverId, TicketStatus};
use driver_queue_runtime::{QueueConfig, QueueEnvironment, QueueService};
use driver_queue_testing::{
    InMemoryHubSettings, InMemoryQueueStore, StaticIdentity, StoreOperation, helpers, test_clock,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Happy path
// ============================================================================

#[tokio::test]
async fn first_ticket_is_number_one() {
    let h = harness();

    let ticket = h.service.issue_ticket(request("driver-1")).await.unwrap();

    assert_eq!(ticket.ticket_number.as_str(), "1");
    assert_eq!(ticket.status, TicketStatus::Waiting);
    assert_eq!(ticket.box_slot, BoxSlot::unassigned());
    assert_eq!(ticket.route.as_str(), "A-1");
    assert_eq!(ticket.email.as_deref(), Some("driver-1@example.com"));
    assert_eq!(ticket.issued_at, test_clock().now());
    assert_eq!(h.store.counter().last_number(), 1);
}

#[tokio::test]
async fn sequential_issuances_number_consecutively() {
    let h = harness();
    issue_many(&h.service, 3).await;

    let numbers: Vec<_> = h
        .store
        .tickets()
        .into_iter()
        .map(|t| t.ticket_number.to_string())
        .collect();
    assert_eq!(numbers, ["1", "2", "3"]);
}

#[tokio::test]
async fn counter_wraps_after_ceiling() {
    let h = harness_with(QueueConfig::default(), InMemoryQueueStore::with_counter(999));

    let at_ceiling = h.service.issue_ticket(request("a")).await.unwrap();
    let wrapped = h.service.issue_ticket(request("b")).await.unwrap();

    assert_eq!(at_ceiling.ticket_number.as_str(), "1000");
    assert_eq!(wrapped.ticket_number.as_str(), "1");
}

#[tokio::test]
async fn configured_ceiling_is_used() {
    let config = QueueConfig {
        ceiling: 3,
        ..QueueConfig::default()
    };
    let h = harness_with(config, InMemoryQueueStore::with_counter(3));

    let ticket = h.service.issue_ticket(request("a")).await.unwrap();
    assert_eq!(ticket.ticket_number.as_str(), "1");
}

// ============================================================================
// Rejections
// ============================================================================

#[tokio::test]
async fn invalid_route_is_rejected_before_anything_else() {
    let h = harness();
    let mut req = request("a");
    req.route = "a-1".to_string();

    let result = h.service.issue_ticket(req).await;

    assert!(matches!(result, Err(QueueError::InvalidRoute(_))));
    assert_eq!(h.store.call_count(StoreOperation::FindTickets), 0);
}

#[tokio::test]
async fn driver_out_of_range_is_rejected() {
    let h = harness();
    h.location.move_to(helpers::north_of_hub(150.0));

    let result = h.service.issue_ticket(request("a")).await;

    match result {
        Err(QueueError::OutOfRange {
            distance_meters,
            radius_meters,
        }) => {
            assert!(distance_meters > 100.0);
            assert!((radius_meters - 100.0).abs() < f64::EPSILON);
        }
        other => panic!("expected OutOfRange, got {other:?}"),
    }
    assert!(h.store.is_empty());
    assert_eq!(h.store.counter().last_number(), 0);
}

#[tokio::test]
async fn driver_just_inside_radius_is_accepted() {
    let h = harness();
    h.location.move_to(helpers::north_of_hub(99.0));

    assert!(h.service.issue_ticket(request("a")).await.is_ok());
}

#[tokio::test]
async fn missing_location_is_reported() {
    let h = harness();
    h.location.fail_with(LocationError::PermissionDenied);

    let result = h.service.issue_ticket(request("a")).await;

    assert!(matches!(result, Err(QueueError::LocationUnavailable(_))));
}

#[tokio::test]
async fn unset_reference_point_is_reported() {
    let h = harness();
    let service = QueueService::new(
        Arc::new(h.store.clone()),
        Arc::new(InMemoryHubSettings::new()),
        QueueEnvironment {
            clock: Arc::new(test_clock()),
            location: Arc::new(h.location.clone()),
            identity: Arc::new(StaticIdentity::anonymous()),
        },
        QueueConfig::default(),
    );

    let result = service.issue_ticket(request("a")).await;

    assert_eq!(result, Err(QueueError::ReferencePointUnset));
}

#[tokio::test]
async fn nan_position_is_rejected() {
    let h = harness();
    h.location.move_to(Coordinates::new(f64::NAN, f64::NAN));

    let result = h.service.issue_ticket(request("nan-driver")).await;

    assert!(matches!(result, Err(QueueError::LocationUnavailable(_))));
    assert!(h.store.is_empty());
    assert_eq!(h.store.counter().last_number(), 0);
}

#[tokio::test]
async fn position_off_the_globe_is_rejected() {
    let h = harness();
    h.location.move_to(Coordinates::new(helpers::HUB.latitude, 200.0));

    let result = h.service.issue_ticket(request("a")).await;

    assert!(matches!(result, Err(QueueError::LocationUnavailable(_))));
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn antipode_of_the_hub_is_out_of_range() {
    let h = harness();
    h.location.move_to(Coordinates::new(
        -helpers::HUB.latitude,
        helpers::HUB.longitude + 180.0,
    ));

    let result = h.service.issue_ticket(request("a")).await;

    assert!(matches!(result, Err(QueueError::OutOfRange { .. })));
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn corrupt_reference_point_admits_nobody() {
    let h = harness();
    let settings = InMemoryHubSettings::with_reference_point(ReferencePoint {
        coordinates: Coordinates::new(f64::NAN, f64::NAN),
        updated_at: test_clock().now(),
        updated_by: "Master".to_string(),
    });
    let service = QueueService::new(
        Arc::new(h.store.clone()),
        Arc::new(settings),
        QueueEnvironment {
            clock: Arc::new(test_clock()),
            location: Arc::new(h.location.clone()),
            identity: Arc::new(StaticIdentity::anonymous()),
        },
        QueueConfig::default(),
    );

    let result = service.issue_ticket(request("a")).await;

    assert!(matches!(result, Err(QueueError::OutOfRange { .. })));
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn second_ticket_for_same_driver_is_rejected() {
    let h = harness();
    h.service.issue_ticket(request("a")).await.unwrap();

    let result = h.service.issue_ticket(request("a")).await;

    assert_eq!(
        result,
        Err(QueueError::DuplicateActiveTicket {
            driver_id: DriverId::from("a"),
            ticket_number: Some("1".into()),
        })
    );
    assert_eq!(h.store.len(), 1);
    assert_eq!(h.store.counter().last_number(), 1);
}

#[tokio::test]
async fn called_ticket_still_blocks_a_new_one() {
    let h = harness();
    h.service.issue_ticket(request("a")).await.unwrap();
    h.service.call_batch(1).await.unwrap();

    let result = h.service.issue_ticket(request("a")).await;

    assert!(matches!(
        result,
        Err(QueueError::DuplicateActiveTicket { .. })
    ));
}

#[tokio::test]
async fn store_conflict_is_surfaced_as_retryable() {
    let h = harness();
    h.store.fail_next(
        StoreOperation::AllocateTicket,
        QueueStoreError::TransactionConflict("contention".into()),
    );

    let error = h.service.issue_ticket(request("a")).await.unwrap_err();

    assert!(matches!(error, QueueError::TransactionConflict(_)));
    assert!(error.is_retryable());
    assert!(h.service.issue_ticket(request("a")).await.is_ok());
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_issuances_get_distinct_consecutive_numbers() {
    let h = harness();
    h.store.set_latency(Duration::from_millis(2));

    let handles: Vec<_> = (0..40)
        .map(|i| {
            let service = h.service.clone();
            tokio::spawn(async move { service.issue_ticket(request(&format!("d{i}"))).await })
        })
        .collect();

    let mut numbers = HashSet::new();
    for handle in handles {
        let ticket = handle.await.unwrap().unwrap();
        numbers.insert(ticket.ticket_number.numeric_value().unwrap());
    }

    assert_eq!(numbers, (1..=40).collect::<HashSet<u32>>());
    assert_eq!(h.store.counter().last_number(), 40);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_from_one_driver_yield_one_ticket() {
    let h = harness();
    // Both pre-queries run before either allocation commits.
    h.store.set_latency(Duration::from_millis(20));

    let first = {
        let service = h.service.clone();
        tokio::spawn(async move { service.issue_ticket(request("same")).await })
    };
    let second = {
        let service = h.service.clone();
        tokio::spawn(async move { service.issue_ticket(request("same")).await })
    };
    let results = [first.await.unwrap(), second.await.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().any(|r| matches!(
        r,
        Err(QueueError::DuplicateActiveTicket { .. })
    )));
    assert_eq!(h.store.len(), 1);
    assert_eq!(h.store.counter().last_number(), 1);
}

// ============================================================================
// Signed-in driver
// ============================================================================

#[tokio::test]
async fn request_ticket_uses_signed_in_driver_and_normalizes_route() {
    let identity = StaticIdentity::driver(helpers::driver_profile("uid-42"));
    let h = harness_for(QueueConfig::default(), InMemoryQueueStore::new(), identity);

    let ticket = h.service.request_ticket(" b-12 ").await.unwrap();

    assert_eq!(ticket.driver_id.as_str(), "uid-42");
    assert_eq!(ticket.route.as_str(), "B-12");
}

#[tokio::test]
async fn request_ticket_requires_a_signed_in_driver() {
    let h = harness();

    let result = h.service.request_ticket("A-1").await;

    assert_eq!(result, Err(QueueError::NotAuthenticated));
}

#[tokio::test]
async fn active_ticket_finds_the_drivers_ticket() {
    let h = harness();
    issue_many(&h.service, 2).await;

    let active = h
        .service
        .active_ticket(&DriverId::from("driver-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(active.ticket_number.as_str(), "2");

    let none = h.service.active_ticket(&DriverId::from("nobody")).await.unwrap();
    assert!(none.is_none());
}
