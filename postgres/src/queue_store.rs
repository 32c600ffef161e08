//! `PostgreSQL` implementation of [`QueueStore`].
//!
//! Tickets live in `queue_tickets`, the counter in the single-row `queue_counter`
//! table and the board in the single-row `queue_last_called` table. Allocation
//! serializes on `SELECT ... FOR UPDATE` of the counter row; a partial unique index
//! on `driver_id` backs the one-active-ticket rule. Statement-level triggers emit
//! `NOTIFY driver_queue_changed` with the table name as payload, which is what the
//! watch streams listen for.

use crate::{db_error, decode_error};
use chrono::{DateTime, Utc};
use driver_queue_core::error::QueueStoreError;
use driver_queue_core::queue_store::{
    LastCalledStream, QueueStore, StoreFuture, TicketQuery, TicketSnapshotStream,
};
use driver_queue_core::sequence::SequenceCounter;
use driver_queue_core::ticket::{
    BoxSlot, CallOrdering, DriverId, LastCalledRecord, RouteCode, Ticket, TicketDraft, TicketId,
    TicketNumber, TicketStatus,
};
use sqlx::postgres::{PgListener, PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use std::time::Duration;
use uuid::Uuid;

/// Channel the change triggers notify on.
pub const CHANGE_CHANNEL: &str = "driver_queue_changed";

const TICKETS_TABLE: &str = "queue_tickets";
const LAST_CALLED_TABLE: &str = "queue_last_called";

/// Consecutive listener failures after which a watch stream ends.
const LISTENER_MAX_FAILURES: u32 = 5;

/// Base delay between listener retries; grows linearly with each failure.
const LISTENER_RETRY_DELAY: Duration = Duration::from_millis(200);

const TICKET_COLUMNS: &str = "id, driver_id, driver_name, plate, route, email, ticket_number, \
                              status, box_slot, issued_at, called_at";

/// `PostgreSQL`-backed queue store.
///
/// # Example
///
/// ```no_run
/// use driver_queue_postgres::PostgresQueueStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = PostgresQueueStore::connect("postgres://localhost/driver_queue", 10).await?;
/// store.migrate().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct PostgresQueueStore {
    pool: PgPool,
}

impl PostgresQueueStore {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a new pool to `database_url`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueStoreError::Unavailable`] if the database cannot be reached.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, QueueStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(db_error)?;
        Ok(Self::from_pool(pool))
    }

    /// The underlying pool, for sharing with [`PostgresHubSettings`](crate::PostgresHubSettings).
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables, indexes and triggers if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns [`QueueStoreError::Unavailable`] if a statement fails.
    pub async fn migrate(&self) -> Result<(), QueueStoreError> {
        sqlx::raw_sql(include_str!("../migrations/001_driver_queue.sql"))
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        tracing::info!("Driver queue schema ready");
        Ok(())
    }

    async fn query_tickets(&self, query: &TicketQuery) -> Result<Vec<Ticket>, QueueStoreError> {
        let mut builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new(format!("SELECT {TICKET_COLUMNS} FROM queue_tickets WHERE TRUE"));
        if let Some(driver_id) = &query.driver_id {
            builder.push(" AND driver_id = ").push_bind(driver_id.as_str().to_string());
        }
        if let Some(number) = &query.ticket_number {
            builder.push(" AND ticket_number = ").push_bind(number.as_str().to_string());
        }
        if !query.statuses.is_empty() {
            let statuses: Vec<String> = query
                .statuses
                .iter()
                .map(|status| status.as_str().to_string())
                .collect();
            builder.push(" AND status = ANY(").push_bind(statuses).push(")");
        }
        builder.push(match query.order {
            Some(CallOrdering::Lexicographic) => r#" ORDER BY ticket_number COLLATE "C", seq"#,
            Some(CallOrdering::Numeric) => {
                r#" ORDER BY (ticket_number !~ '^[0-9]+$'),
                    CASE WHEN ticket_number ~ '^[0-9]+$' THEN ticket_number::BIGINT END,
                    ticket_number COLLATE "C", seq"#
            }
            None => " ORDER BY seq",
        });
        if let Some(limit) = query.limit {
            let limit = i64::try_from(limit).unwrap_or(i64::MAX);
            builder.push(" LIMIT ").push_bind(limit);
        }

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        rows.iter().map(ticket_from_row).collect()
    }

    async fn read_last_called(&self) -> Result<Option<LastCalledRecord>, QueueStoreError> {
        let row = sqlx::query(
            r"
            SELECT ticket_number, driver_name, route, plate, box_slot
            FROM queue_last_called
            WHERE id = 1
            ",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.as_ref().map(last_called_from_row).transpose()
    }

    async fn listen(&self) -> Result<PgListener, QueueStoreError> {
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(db_error)?;
        listener.listen(CHANGE_CHANNEL).await.map_err(db_error)?;
        Ok(listener)
    }
}

impl QueueStore for PostgresQueueStore {
    fn find_tickets(&self, query: TicketQuery) -> StoreFuture<'_, Vec<Ticket>> {
        Box::pin(async move { self.query_tickets(&query).await })
    }

    fn allocate_ticket(&self, draft: TicketDraft, ceiling: u32) -> StoreFuture<'_, Ticket> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(db_error)?;

            // Serializes every allocation; later reads see all committed tickets.
            let (last_number,): (i32,) =
                sqlx::query_as("SELECT last_number FROM queue_counter WHERE id = 1 FOR UPDATE")
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(db_error)?;

            let active: Option<(Uuid,)> = sqlx::query_as(
                r"
                SELECT id FROM queue_tickets
                WHERE driver_id = $1 AND status IN ('waiting', 'called')
                LIMIT 1
                ",
            )
            .bind(draft.driver_id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error)?;
            if active.is_some() {
                return Err(QueueStoreError::ActiveTicketExists(draft.driver_id));
            }

            let current = u32::try_from(last_number)
                .map_err(|_| decode_error(format!("negative counter {last_number}")))?;
            let counter = SequenceCounter::new(current).advance(ceiling);
            let stored = i32::try_from(counter.last_number())
                .map_err(|_| decode_error(format!("counter {counter} exceeds column range")))?;

            sqlx::query("UPDATE queue_counter SET last_number = $1 WHERE id = 1")
                .bind(stored)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;

            let driver_id = draft.driver_id.clone();
            let ticket = Ticket::issue(TicketId::new(), draft, counter.ticket_number());
            sqlx::query(
                r"
                INSERT INTO queue_tickets (
                    id, driver_id, driver_name, plate, route, email,
                    ticket_number, status, box_slot, issued_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ",
            )
            .bind(ticket.id.as_uuid())
            .bind(ticket.driver_id.as_str())
            .bind(&ticket.driver_name)
            .bind(&ticket.plate)
            .bind(ticket.route.as_str())
            .bind(ticket.email.as_deref())
            .bind(ticket.ticket_number.as_str())
            .bind(ticket.status.as_str())
            .bind(ticket.box_slot.as_str())
            .bind(ticket.issued_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| active_ticket_violation(e, &driver_id))?;

            tx.commit().await.map_err(db_error)?;
            tracing::debug!(ticket_number = %ticket.ticket_number, "Ticket row inserted");
            Ok(ticket)
        })
    }

    fn mark_called(
        &self,
        ids: Vec<TicketId>,
        called_at: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<Ticket>> {
        Box::pin(async move {
            let uuids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
            let mut tx = self.pool.begin().await.map_err(db_error)?;

            let locked: Vec<(Uuid, String)> = sqlx::query_as(
                "SELECT id, status FROM queue_tickets WHERE id = ANY($1) FOR UPDATE",
            )
            .bind(&uuids)
            .fetch_all(&mut *tx)
            .await
            .map_err(db_error)?;

            for id in &ids {
                let (_, status) = locked
                    .iter()
                    .find(|(uuid, _)| uuid == id.as_uuid())
                    .ok_or(QueueStoreError::DocumentMissing(*id))?;
                if status != TicketStatus::Waiting.as_str() {
                    return Err(QueueStoreError::TransactionConflict(format!(
                        "ticket {id} is no longer waiting"
                    )));
                }
            }

            let rows = sqlx::query(&format!(
                r"
                UPDATE queue_tickets
                SET status = 'called', called_at = $2
                WHERE id = ANY($1)
                RETURNING {TICKET_COLUMNS}
                "
            ))
            .bind(&uuids)
            .bind(called_at)
            .fetch_all(&mut *tx)
            .await
            .map_err(db_error)?;
            tx.commit().await.map_err(db_error)?;

            let mut updated = rows
                .iter()
                .map(ticket_from_row)
                .collect::<Result<Vec<_>, _>>()?;
            // RETURNING order is unspecified; callers expect request order.
            updated.sort_by_key(|ticket| ids.iter().position(|id| *id == ticket.id));
            Ok(updated)
        })
    }

    fn publish_last_called(&self, record: LastCalledRecord) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO queue_last_called (id, ticket_number, driver_name, route, plate, box_slot)
                VALUES (1, $1, $2, $3, $4, $5)
                ON CONFLICT (id) DO UPDATE SET
                    ticket_number = EXCLUDED.ticket_number,
                    driver_name = EXCLUDED.driver_name,
                    route = EXCLUDED.route,
                    plate = EXCLUDED.plate,
                    box_slot = EXCLUDED.box_slot
                ",
            )
            .bind(record.ticket_number.as_str())
            .bind(&record.driver_name)
            .bind(record.route.as_str())
            .bind(&record.plate)
            .bind(record.box_slot.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
            Ok(())
        })
    }

    fn load_last_called(&self) -> StoreFuture<'_, Option<LastCalledRecord>> {
        Box::pin(self.read_last_called())
    }

    fn clear_last_called(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query("DELETE FROM queue_last_called")
                .execute(&self.pool)
                .await
                .map_err(db_error)?;
            Ok(())
        })
    }

    fn delete_tickets(&self, ids: Vec<TicketId>) -> StoreFuture<'_, usize> {
        Box::pin(async move {
            let uuids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
            let result = sqlx::query("DELETE FROM queue_tickets WHERE id = ANY($1)")
                .bind(&uuids)
                .execute(&self.pool)
                .await
                .map_err(db_error)?;
            Ok(usize::try_from(result.rows_affected()).unwrap_or(usize::MAX))
        })
    }

    fn delete_all_tickets(&self) -> StoreFuture<'_, usize> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM queue_tickets")
                .execute(&self.pool)
                .await
                .map_err(db_error)?;
            Ok(usize::try_from(result.rows_affected()).unwrap_or(usize::MAX))
        })
    }

    fn load_counter(&self) -> StoreFuture<'_, SequenceCounter> {
        Box::pin(async move {
            let (last_number,): (i32,) =
                sqlx::query_as("SELECT last_number FROM queue_counter WHERE id = 1")
                    .fetch_one(&self.pool)
                    .await
                    .map_err(db_error)?;
            u32::try_from(last_number)
                .map(SequenceCounter::new)
                .map_err(|_| decode_error(format!("negative counter {last_number}")))
        })
    }

    fn reset_counter(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query("UPDATE queue_counter SET last_number = 0 WHERE id = 1")
                .execute(&self.pool)
                .await
                .map_err(db_error)?;
            Ok(())
        })
    }

    fn update_box(&self, id: TicketId, box_slot: BoxSlot) -> StoreFuture<'_, Ticket> {
        Box::pin(async move {
            let row = sqlx::query(&format!(
                "UPDATE queue_tickets SET box_slot = $2 WHERE id = $1 RETURNING {TICKET_COLUMNS}"
            ))
            .bind(id.as_uuid())
            .bind(box_slot.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .ok_or(QueueStoreError::DocumentMissing(id))?;
            ticket_from_row(&row)
        })
    }

    fn watch_tickets(&self) -> StoreFuture<'_, TicketSnapshotStream> {
        Box::pin(async move {
            let mut listener = self.listen().await?;
            let store = self.clone();
            let stream = async_stream::stream! {
                let mut backoff = ListenerBackoff::default();
                yield store.query_tickets(&TicketQuery::all()).await;
                loop {
                    match listener.recv().await {
                        Ok(notification) => {
                            backoff.reset();
                            if notification.payload() == TICKETS_TABLE {
                                yield store.query_tickets(&TicketQuery::all()).await;
                            }
                        }
                        // PgListener reconnects on the next recv.
                        Err(e) => {
                            yield Err(db_error(e));
                            if !backoff.wait().await {
                                break;
                            }
                        }
                    }
                }
            };
            Ok(Box::pin(stream) as TicketSnapshotStream)
        })
    }

    fn watch_last_called(&self) -> StoreFuture<'_, LastCalledStream> {
        Box::pin(async move {
            let mut listener = self.listen().await?;
            let store = self.clone();
            let stream = async_stream::stream! {
                let mut backoff = ListenerBackoff::default();
                yield store.read_last_called().await;
                loop {
                    match listener.recv().await {
                        Ok(notification) => {
                            backoff.reset();
                            if notification.payload() == LAST_CALLED_TABLE {
                                yield store.read_last_called().await;
                            }
                        }
                        Err(e) => {
                            yield Err(db_error(e));
                            if !backoff.wait().await {
                                break;
                            }
                        }
                    }
                }
            };
            Ok(Box::pin(stream) as LastCalledStream)
        })
    }
}

/// Paces retries of a failing `PgListener` and gives up after a run of failures.
#[derive(Debug, Default)]
struct ListenerBackoff {
    failures: u32,
}

impl ListenerBackoff {
    const fn reset(&mut self) {
        self.failures = 0;
    }

    /// Delay before the next attempt, or `None` once the stream should end.
    fn record_failure(&mut self) -> Option<Duration> {
        self.failures += 1;
        (self.failures < LISTENER_MAX_FAILURES).then_some(LISTENER_RETRY_DELAY * self.failures)
    }

    /// Sleep before retrying; `false` means give up.
    async fn wait(&mut self) -> bool {
        match self.record_failure() {
            Some(delay) => {
                tokio::time::sleep(delay).await;
                true
            }
            None => {
                tracing::error!(
                    failures = self.failures,
                    "Change listener keeps failing, closing watch stream"
                );
                false
            }
        }
    }
}

fn active_ticket_violation(error: sqlx::Error, driver_id: &DriverId) -> QueueStoreError {
    let unique_violation = error
        .as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "23505");
    if unique_violation {
        QueueStoreError::ActiveTicketExists(driver_id.clone())
    } else {
        db_error(error)
    }
}

fn ticket_from_row(row: &PgRow) -> Result<Ticket, QueueStoreError> {
    let get_text = |column: &str| -> Result<String, QueueStoreError> {
        row.try_get(column).map_err(|e| decode_error(e.to_string()))
    };
    let id: Uuid = row.try_get("id").map_err(|e| decode_error(e.to_string()))?;
    let status = TicketStatus::parse(&get_text("status")?).map_err(|e| decode_error(e.to_string()))?;

    Ok(Ticket {
        id: TicketId::from_uuid(id),
        driver_id: DriverId::from(get_text("driver_id")?),
        driver_name: get_text("driver_name")?,
        plate: get_text("plate")?,
        route: get_text("route")?
            .parse::<RouteCode>()
            .map_err(|e| decode_error(e.to_string()))?,
        email: row.try_get("email").map_err(|e| decode_error(e.to_string()))?,
        ticket_number: TicketNumber::from(get_text("ticket_number")?),
        status,
        box_slot: BoxSlot::new(get_text("box_slot")?),
        issued_at: row
            .try_get("issued_at")
            .map_err(|e| decode_error(e.to_string()))?,
        called_at: row
            .try_get("called_at")
            .map_err(|e| decode_error(e.to_string()))?,
    })
}

fn last_called_from_row(row: &PgRow) -> Result<LastCalledRecord, QueueStoreError> {
    let get_text = |column: &str| -> Result<String, QueueStoreError> {
        row.try_get(column).map_err(|e| decode_error(e.to_string()))
    };
    Ok(LastCalledRecord {
        ticket_number: TicketNumber::from(get_text("ticket_number")?),
        driver_name: get_text("driver_name")?,
        route: get_text("route")?
            .parse::<RouteCode>()
            .map_err(|e| decode_error(e.to_string()))?,
        plate: get_text("plate")?,
        box_slot: BoxSlot::new(get_text("box_slot")?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_then_gives_up() {
        let mut backoff = ListenerBackoff::default();

        assert_eq!(backoff.record_failure(), Some(LISTENER_RETRY_DELAY));
        assert_eq!(backoff.record_failure(), Some(LISTENER_RETRY_DELAY * 2));
        for _ in 2..LISTENER_MAX_FAILURES - 1 {
            assert!(backoff.record_failure().is_some());
        }
        assert_eq!(backoff.record_failure(), None);
    }

    #[test]
    fn successful_receive_resets_backoff() {
        let mut backoff = ListenerBackoff::default();
        for _ in 0..LISTENER_MAX_FAILURES - 1 {
            assert!(backoff.record_failure().is_some());
        }

        backoff.reset();

        assert_eq!(backoff.record_failure(), Some(LISTENER_RETRY_DELAY));
    }

    #[tokio::test]
    async fn wait_sleeps_then_reports_exhaustion() {
        let mut backoff = ListenerBackoff::default();
        let started = std::time::Instant::now();

        assert!(backoff.wait().await);
        assert!(started.elapsed() >= LISTENER_RETRY_DELAY);

        backoff.failures = LISTENER_MAX_FAILURES - 1;
        assert!(!backoff.wait().await);
    }
}
