//! # Driver Queue Runtime
//!
//! The queue service and everything around it.
//!
//! ## Core Components
//!
//! - **`QueueService`**: issues tickets, calls batches, clears the queue, deletes tickets
//! - **`QueueObserver`**: pushes queue and last-called changes to subscribers
//! - **`HubSettingsService`**: reads and moves the hub reference point
//! - **`QueueConfig`**: ceiling, eligibility radius, batch bound, call ordering
//!
//! ## Example
//!
//! ```ignore
//! use driver_queue_runtime::{QueueConfig, QueueEnvironment, QueueObserver, QueueService};
//!
//! let service = QueueService::new(store.clone(), settings, environment, QueueConfig::from_env()?);
//! let observer = QueueObserver::new(store);
//!
//! let subscription = observer.subscribe_to_queue(|tickets| render(&tickets));
//! service.call_batch(5).await?;
//! subscription.cancel();
//! ```

/// Environment-driven configuration
pub mod config;

/// Hub reference-point management
pub mod hub;

/// Prometheus metrics for observability
pub mod metrics;

/// Queue and last-called subscriptions
pub mod observer;

/// Ticket issuance, batch calls and queue maintenance
pub mod service;

pub use config::{ConfigError, QueueConfig, StorageConfig};
pub use hub::HubSettingsService;
pub use observer::{QueueObserver, Subscription};
pub use service::{
    CallResult, IssueTicketRequest, LastCalledPublication, QueueEnvironment, QueueService,
};
