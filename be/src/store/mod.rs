//! Storage port for the bus registry and location history.
//!
//! Handlers only ever see `Arc<dyn BusStore>`, so the PostgreSQL adapter and
//! the in-memory one are interchangeable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageError;
use crate::model::{Bus, BusId, BusLocation, NewBus};
use crate::proximity::Coordinate;

mod memory;
mod postgres;

pub use memory::MemoryBusStore;
pub use postgres::PostgresBusStore;

pub type StoreResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait BusStore: Send + Sync {
    /// Registers a bus and returns it with its generated id.
    async fn register_bus(&self, bus: NewBus) -> StoreResult<Bus>;

    /// All registered buses, ordered by id.
    async fn list_buses(&self) -> StoreResult<Vec<Bus>>;

    /// Upserts the latest location and appends to the history.
    ///
    /// Both writes land or neither does. A sample older than the current
    /// latest row still goes into the history but does not replace it.
    async fn record_location(
        &self,
        bus_id: BusId,
        position: Coordinate,
        recorded_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Buses that have reported at least once, with their latest position,
    /// ordered by id.
    async fn latest_locations(&self) -> StoreResult<Vec<BusLocation>>;

    /// Deletes history rows recorded strictly before `cutoff`.
    async fn purge_history_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;
}
