//! `PostgreSQL` backend for the driver queue.
//!
//! This crate provides production implementations of the store traits from
//! `driver-queue-core`. It uses sqlx and supports:
//!
//! - Transactional ticket allocation (`SELECT ... FOR UPDATE` on the counter row)
//! - All-or-nothing batch calls
//! - Live snapshots through `LISTEN/NOTIFY`
//! - Connection pooling
//!
//! # Example
//!
//! ```ignore
//! use driver_queue_postgres::{PostgresHubSettings, PostgresQueueStore};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresQueueStore::connect("postgres://localhost/driver_queue", 10).await?;
//!     store.migrate().await?;
//!     let settings = PostgresHubSettings::from_pool(store.pool().clone());
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod hub_settings;
mod queue_store;

pub use hub_settings::PostgresHubSettings;
pub use queue_store::{CHANGE_CHANNEL, PostgresQueueStore};

use driver_queue_core::error::QueueStoreError;

/// Map a sqlx error to the store taxonomy.
///
/// Serialization failures and deadlocks are retryable conflicts; everything else
/// is treated as the backend being unavailable.
pub(crate) fn db_error(error: sqlx::Error) -> QueueStoreError {
    let code = error
        .as_database_error()
        .and_then(|db| db.code())
        .map(|code| code.into_owned());
    match code.as_deref() {
        Some("40001" | "40P01") => {
            metrics::counter!("driver_queue_store_conflicts_total").increment(1);
            QueueStoreError::TransactionConflict(error.to_string())
        }
        _ => QueueStoreError::Unavailable(error.to_string()),
    }
}

pub(crate) fn decode_error(message: impl Into<String>) -> QueueStoreError {
    QueueStoreError::Serialization(message.into())
}
