//! Eviction of finished jobs

use chrono::{TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use courier_queue::{JobStore, QueueError};

/// Upper bound on the time between two sweeps
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Evict every terminal job last updated more than `ttl` ago.
pub async fn sweep_once(store: &dyn JobStore, ttl: Duration) -> Result<usize, QueueError> {
    let Some(cutoff) = TimeDelta::from_std(ttl)
        .ok()
        .and_then(|ttl| Utc::now().checked_sub_signed(ttl))
    else {
        return Ok(0);
    };
    store.evict_finished_before(cutoff).await
}

/// Sweep in the background until the returned handle is aborted.
pub fn spawn_sweeper(store: Arc<dyn JobStore>, ttl: Duration) -> JoinHandle<()> {
    let period = ttl.clamp(Duration::from_secs(1), MAX_SWEEP_INTERVAL);
    tracing::info!(
        ttl_secs = ttl.as_secs(),
        period_secs = period.as_secs(),
        "Job retention sweeper started"
    );

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match sweep_once(store.as_ref(), ttl).await {
                Ok(0) => {}
                Ok(evicted) => tracing::debug!(evicted, "Evicted finished jobs"),
                Err(e) => tracing::warn!(error = %e, "Retention sweep failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_queue::job::MessagePayload;
    use courier_queue::{FailureTolerance, JobRecord, MemoryJobStore, RecipientOutcome};

    async fn finished_job(store: &MemoryJobStore) -> courier_queue::JobId {
        let record = JobRecord::new(
            vec!["a@example.com".to_string()].into(),
            Arc::new(MessagePayload {
                from: "me@example.com".to_string(),
                subject: "s".to_string(),
                body: "b".to_string(),
                attachment_ref: None,
            }),
            FailureTolerance::default(),
        );
        let id = store.create(record).await.unwrap().id;
        store.mark_processing(id).await.unwrap();
        store
            .record_outcome(id, "a@example.com", &RecipientOutcome::Sent)
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn test_fresh_jobs_survive_a_sweep() {
        let store = MemoryJobStore::new();
        let id = finished_job(&store).await;

        assert_eq!(sweep_once(&store, Duration::from_secs(3600)).await.unwrap(), 0);
        assert!(store.get(id).await.is_ok());
    }

    #[tokio::test]
    async fn test_expired_jobs_are_evicted() {
        let store = MemoryJobStore::new();
        let id = finished_job(&store).await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(sweep_once(&store, Duration::ZERO).await.unwrap(), 1);
        assert!(store.get(id).await.is_err());
    }

    #[test]
    fn test_huge_ttl_never_evicts() {
        let store = MemoryJobStore::new();
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let evicted = rt.block_on(sweep_once(&store, Duration::MAX)).unwrap();
        assert_eq!(evicted, 0);
    }
}
