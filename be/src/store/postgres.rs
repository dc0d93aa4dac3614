use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info};

use super::{BusStore, StoreResult};
use crate::error::StorageError;
use crate::model::{Bus, BusId, BusLocation, NewBus};
use crate::proximity::Coordinate;

#[derive(Clone, Debug)]
pub struct PostgresBusStore {
    pool: PgPool,
}

impl PostgresBusStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        info!(max_connections, "Connected to PostgreSQL");
        Ok(Self::new(pool))
    }

    /// Applies the embedded schema migrations.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// A foreign key violation on either location table means the bus was never registered
fn unknown_bus_or(bus_id: BusId, err: sqlx::Error) -> StorageError {
    match &err {
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            StorageError::UnknownBus(bus_id)
        }
        _ => StorageError::Database(err),
    }
}

#[async_trait]
impl BusStore for PostgresBusStore {
    async fn register_bus(&self, bus: NewBus) -> StoreResult<Bus> {
        let bus = sqlx::query_as::<_, Bus>(
            r#"
            INSERT INTO buses (bus_no, bus_name)
            VALUES ($1, $2)
            RETURNING bus_id, bus_no, bus_name, popularity
            "#,
        )
        .bind(&bus.bus_no)
        .bind(&bus.bus_name)
        .fetch_one(self.pool())
        .await?;
        Ok(bus)
    }

    async fn list_buses(&self) -> StoreResult<Vec<Bus>> {
        let buses = sqlx::query_as::<_, Bus>(
            "SELECT bus_id, bus_no, bus_name, popularity FROM buses ORDER BY bus_id",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(buses)
    }

    async fn record_location(
        &self,
        bus_id: BusId,
        position: Coordinate,
        recorded_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        // Rolled back on drop if either statement fails
        let mut tx = self.pool().begin().await?;

        sqlx::query(
            r#"
            INSERT INTO latest_bus_location (bus_id, latitude, longitude, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (bus_id) DO UPDATE SET
                latitude = EXCLUDED.latitude,
                longitude = EXCLUDED.longitude,
                updated_at = EXCLUDED.updated_at
            WHERE latest_bus_location.updated_at <= EXCLUDED.updated_at
            "#,
        )
        .bind(bus_id)
        .bind(position.latitude())
        .bind(position.longitude())
        .bind(recorded_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| unknown_bus_or(bus_id, e))?;

        sqlx::query(
            r#"
            INSERT INTO bus_locations (bus_id, latitude, longitude, recorded_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(bus_id)
        .bind(position.latitude())
        .bind(position.longitude())
        .bind(recorded_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| unknown_bus_or(bus_id, e))?;

        tx.commit().await?;
        Ok(())
    }

    async fn latest_locations(&self) -> StoreResult<Vec<BusLocation>> {
        let rows = sqlx::query_as::<_, BusLocation>(
            r#"
            SELECT b.bus_id, b.bus_no, b.bus_name, b.popularity,
                   l.latitude, l.longitude, l.updated_at
            FROM latest_bus_location l
            JOIN buses b ON b.bus_id = l.bus_id
            ORDER BY b.bus_id
            "#,
        )
        .fetch_all(self.pool())
        .await?;
        debug!(count = rows.len(), "Loaded latest bus locations");
        Ok(rows)
    }

    async fn purge_history_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM bus_locations WHERE recorded_at < $1")
            .bind(cutoff)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }
}
