//! Periodic expiration sweeps.
//!
//! One task, one sweep at a time: a slow sweep delays the next tick instead
//! of overlapping it. Failures are logged and retried on the next tick.

use crate::{
    context::RequestContext,
    errors::{StorageError, StorageResult},
    services::storage::Storage,
};
use std::{sync::Arc, time::Duration};
use tokio::{
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Clone)]
pub struct Sweeper {
    storage: Arc<dyn Storage>,
    interval: Duration,
}

impl Sweeper {
    /// A zero `interval` is rejected; the ticker cannot run with it.
    pub fn new(storage: Arc<dyn Storage>, interval: Duration) -> StorageResult<Self> {
        if interval.is_zero() {
            return Err(StorageError::Config("sweep interval must be positive".into()));
        }
        Ok(Self { storage, interval })
    }

    /// Run a single `delete_expired` pass, e.g. from an admin trigger.
    pub async fn sweep_once(&self, ctx: &RequestContext) -> StorageResult<usize> {
        self.storage.delete_expired(ctx).await
    }

    /// Sweep on every tick until `shutdown` is cancelled. The first sweep
    /// runs immediately.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(
                backend = self.storage.storage_type(),
                interval_secs = self.interval.as_secs(),
                "expiration sweeper started"
            );

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let ctx = RequestContext::with_token(shutdown.child_token());
                match self.sweep_once(&ctx).await {
                    Ok(count) => info!(deleted = count, "purged expired objects"),
                    Err(err) if err.is_cancelled() => break,
                    Err(err) => error!(error = %err, "expiration sweep failed, retrying next tick"),
                }
            }

            info!("expiration sweeper stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::Metadata, services::local::LocalStorage, stream::from_bytes};
    use tempfile::TempDir;

    async fn seeded() -> (TempDir, Arc<dyn Storage>) {
        let dir = TempDir::new().unwrap();
        let storage: Arc<dyn Storage> = Arc::new(LocalStorage::new(dir.path()));
        let ctx = RequestContext::background();
        let expired = Metadata::new("old.txt", "", 3, "", "2020-01-01T00:00:00Z");
        let fresh = Metadata::new("new.txt", "", 3, "", "2099-01-01T00:00:00Z");
        storage.put(&ctx, "old", from_bytes("old"), &expired).await.unwrap();
        storage.put(&ctx, "new", from_bytes("new"), &fresh).await.unwrap();
        (dir, storage)
    }

    #[tokio::test]
    async fn sweep_once_reports_count() {
        let (_dir, storage) = seeded().await;
        let sweeper = Sweeper::new(storage.clone(), Duration::from_secs(3600)).unwrap();
        let ctx = RequestContext::background();
        assert_eq!(sweeper.sweep_once(&ctx).await.unwrap(), 1);
        assert_eq!(sweeper.sweep_once(&ctx).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn zero_interval_is_rejected() {
        let (_dir, storage) = seeded().await;
        let err = Sweeper::new(storage, Duration::ZERO).err().unwrap();
        assert!(matches!(err, StorageError::Config(_)));
    }

    #[tokio::test]
    async fn spawned_sweeper_purges_and_stops() {
        let (_dir, storage) = seeded().await;
        let shutdown = CancellationToken::new();
        let handle = Sweeper::new(storage.clone(), Duration::from_millis(10))
            .unwrap()
            .spawn(shutdown.clone());

        let ctx = RequestContext::background();
        let mut remaining = usize::MAX;
        for _ in 0..100 {
            remaining = storage.list(&ctx).await.unwrap().len();
            if remaining == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(remaining, 1);

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("sweeper stops on shutdown")
            .unwrap();
    }
}
