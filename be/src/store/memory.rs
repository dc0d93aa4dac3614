use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{BusStore, StoreResult};
use crate::error::StorageError;
use crate::model::{Bus, BusId, BusLocation, LatestLocation, LocationSample, NewBus};
use crate::proximity::Coordinate;

#[derive(Debug, Default)]
struct Tables {
    next_id: BusId,
    buses: BTreeMap<BusId, Bus>,
    latest: BTreeMap<BusId, LatestLocation>,
    history: Vec<LocationSample>,
}

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryBusStore {
    tables: RwLock<Tables>,
}

impl MemoryBusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// History rows in insertion order.
    pub async fn history(&self) -> Vec<LocationSample> {
        self.tables.read().await.history.clone()
    }

    pub async fn latest(&self, bus_id: BusId) -> Option<LatestLocation> {
        self.tables.read().await.latest.get(&bus_id).cloned()
    }
}

#[async_trait]
impl BusStore for MemoryBusStore {
    async fn register_bus(&self, bus: NewBus) -> StoreResult<Bus> {
        let mut tables = self.tables.write().await;
        tables.next_id += 1;
        let bus = Bus {
            bus_id: tables.next_id,
            bus_no: bus.bus_no,
            bus_name: bus.bus_name,
            popularity: 0,
        };
        tables.buses.insert(bus.bus_id, bus.clone());
        Ok(bus)
    }

    async fn list_buses(&self) -> StoreResult<Vec<Bus>> {
        Ok(self.tables.read().await.buses.values().cloned().collect())
    }

    async fn record_location(
        &self,
        bus_id: BusId,
        position: Coordinate,
        recorded_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        // One write guard covers both tables
        let mut tables = self.tables.write().await;
        if !tables.buses.contains_key(&bus_id) {
            return Err(StorageError::UnknownBus(bus_id));
        }

        let newer = tables
            .latest
            .get(&bus_id)
            .is_none_or(|current| current.updated_at <= recorded_at);
        if newer {
            tables.latest.insert(
                bus_id,
                LatestLocation {
                    bus_id,
                    latitude: position.latitude(),
                    longitude: position.longitude(),
                    updated_at: recorded_at,
                },
            );
        }

        tables.history.push(LocationSample {
            bus_id,
            latitude: position.latitude(),
            longitude: position.longitude(),
            recorded_at,
        });
        Ok(())
    }

    async fn latest_locations(&self) -> StoreResult<Vec<BusLocation>> {
        let tables = self.tables.read().await;
        let rows = tables
            .latest
            .values()
            .filter_map(|latest| {
                let bus = tables.buses.get(&latest.bus_id)?;
                Some(BusLocation {
                    bus_id: bus.bus_id,
                    bus_no: bus.bus_no.clone(),
                    bus_name: bus.bus_name.clone(),
                    popularity: bus.popularity,
                    latitude: latest.latitude,
                    longitude: latest.longitude,
                    updated_at: Some(latest.updated_at),
                })
            })
            .collect();
        Ok(rows)
    }

    async fn purge_history_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.history.len();
        tables.history.retain(|sample| sample.recorded_at >= cutoff);
        Ok((before - tables.history.len()) as u64)
    }
}
