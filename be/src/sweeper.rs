//! Retention sweeper for the location history.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info};

use crate::error::StorageError;
use crate::store::{BusStore, StoreResult};

/// Default age, in hours, after which history rows are deleted.
pub const DEFAULT_RETENTION_HOURS: u32 = 24;

/// Longest accepted retention horizon (roughly a century).
pub const MAX_RETENTION_HOURS: u32 = 876_000;

pub const DEFAULT_RETENTION: TimeDelta = TimeDelta::hours(DEFAULT_RETENTION_HOURS as i64);

/// Deletes history older than `retention` as of `now`. Returns the row count.
pub async fn sweep_once(
    store: &dyn BusStore,
    retention: TimeDelta,
    now: DateTime<Utc>,
) -> StoreResult<u64> {
    let cutoff = now
        .checked_sub_signed(retention)
        .ok_or(StorageError::RetentionOutOfRange(retention.num_hours()))?;
    let deleted = store.purge_history_before(cutoff).await?;
    info!(deleted, %cutoff, "Purged old bus locations");
    Ok(deleted)
}

/// Runs [`sweep_once`] every `every` until `shutdown` flips to `true`.
///
/// The first sweep happens one full period after start. A failed sweep is
/// logged and the next one runs on schedule.
pub fn spawn(
    store: Arc<dyn BusStore>,
    retention: TimeDelta,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(?every, retention_hours = retention.num_hours(), "Retention sweeper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = sweep_once(store.as_ref(), retention, Utc::now()).await {
                        error!("Cleanup error: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    // A dropped sender also means shut down
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Retention sweeper stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewBus;
    use crate::proximity::Coordinate;
    use crate::store::MemoryBusStore;

    async fn store_with_history(ages_hours: &[i64]) -> Arc<MemoryBusStore> {
        let store = Arc::new(MemoryBusStore::new());
        let bus = store
            .register_bus(NewBus {
                bus_no: "T789".to_string(),
                bus_name: "Kerinchi".to_string(),
            })
            .await
            .unwrap();
        let now = Utc::now();
        for age in ages_hours {
            store
                .record_location(
                    bus.bus_id,
                    Coordinate::new(3.11, 101.66).unwrap(),
                    now - TimeDelta::hours(*age),
                )
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn sweep_once_uses_retention_horizon() {
        let store = store_with_history(&[48, 25, 23, 0]).await;

        let deleted = sweep_once(store.as_ref(), DEFAULT_RETENTION, Utc::now())
            .await
            .unwrap();

        assert_eq!(deleted, 2);
        assert_eq!(store.history().await.len(), 2);
    }

    #[tokio::test]
    async fn unrepresentable_cutoff_is_an_error() {
        let store = store_with_history(&[48]).await;

        let err = sweep_once(store.as_ref(), TimeDelta::hours(4_000_000_000), Utc::now())
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::RetentionOutOfRange(4_000_000_000)));
        assert_eq!(store.history().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_sweeper_runs_until_shutdown() {
        let store = store_with_history(&[48]).await;
        let (tx, rx) = watch::channel(false);

        let handle = spawn(store.clone(), DEFAULT_RETENTION, Duration::from_secs(60), rx);
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(store.history().await.is_empty());

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
