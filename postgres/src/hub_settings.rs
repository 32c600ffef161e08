//! `PostgreSQL` implementation of [`HubSettingsStore`].

use crate::{db_error, decode_error};
use driver_queue_core::geo::Coordinates;
use driver_queue_core::hub_settings::{HubSettingsStore, ReferencePoint};
use driver_queue_core::queue_store::StoreFuture;
use sqlx::{PgPool, Row};

/// Hub settings stored in the single-row `hub_settings` table.
#[derive(Clone, Debug)]
pub struct PostgresHubSettings {
    pool: PgPool,
}

impl PostgresHubSettings {
    /// Wrap an existing connection pool (schema created by
    /// [`PostgresQueueStore::migrate`](crate::PostgresQueueStore::migrate)).
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl HubSettingsStore for PostgresHubSettings {
    fn load_reference_point(&self) -> StoreFuture<'_, Option<ReferencePoint>> {
        Box::pin(async move {
            let row = sqlx::query(
                "SELECT latitude, longitude, updated_at, updated_by FROM hub_settings WHERE id = 1",
            )
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

            let Some(row) = row else {
                return Ok(None);
            };
            let decode = |e: sqlx::Error| decode_error(e.to_string());
            Ok(Some(ReferencePoint {
                coordinates: Coordinates::new(
                    row.try_get("latitude").map_err(decode)?,
                    row.try_get("longitude").map_err(decode)?,
                ),
                updated_at: row.try_get("updated_at").map_err(decode)?,
                updated_by: row.try_get("updated_by").map_err(decode)?,
            }))
        })
    }

    fn save_reference_point(&self, point: ReferencePoint) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO hub_settings (id, latitude, longitude, updated_at, updated_by)
                VALUES (1, $1, $2, $3, $4)
                ON CONFLICT (id) DO UPDATE SET
                    latitude = EXCLUDED.latitude,
                    longitude = EXCLUDED.longitude,
                    updated_at = EXCLUDED.updated_at,
                    updated_by = EXCLUDED.updated_by
                ",
            )
            .bind(point.coordinates.latitude)
            .bind(point.coordinates.longitude)
            .bind(point.updated_at)
            .bind(&point.updated_by)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
            Ok(())
        })
    }
}
