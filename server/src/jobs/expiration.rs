//! Hourly transition of past-due events from `active` to `finished`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::store::{EventStore, StoreError, WriteBatch};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpirationReport {
    pub expired: usize,
    pub batches: usize,
}

#[derive(Clone)]
pub struct ExpirationJob {
    store: Arc<dyn EventStore>,
    scan_limit: i64,
}

impl ExpirationJob {
    pub fn new(store: Arc<dyn EventStore>, scan_limit: i64) -> Self {
        Self {
            store,
            scan_limit: scan_limit.max(1),
        }
    }

    /// Expire every active event dated before `now`.
    ///
    /// Events are taken in chunks of at most `scan_limit`. Each chunk becomes
    /// one atomic batch pairing the status change with the organization
    /// counter decrement. The first failing read or commit ends the run; what
    /// was not committed stays active and is picked up by the next run.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<ExpirationReport, StoreError> {
        let mut report = ExpirationReport::default();

        loop {
            let expired = self.store.find_expired_events(now, self.scan_limit).await?;
            if expired.is_empty() {
                break;
            }

            let mut batch = WriteBatch::new();
            for event in &expired {
                batch
                    .finish_event(event.id, now)
                    .adjust_active_events(event.organization_id, -1);
            }

            let commit = self.store.commit(batch).await?;
            if !commit.missing_organizations.is_empty() {
                warn!(
                    organizations = ?commit.missing_organizations,
                    "Expired events belong to organizations that no longer exist"
                );
            }

            report.expired += expired.len();
            report.batches += 1;

            if (expired.len() as i64) < self.scan_limit {
                break;
            }
        }

        Ok(report)
    }
}

/// Drives an [`ExpirationJob`] on a fixed period from a single task, so two
/// runs never overlap.
pub struct ExpirationScheduler {
    job: ExpirationJob,
    period: Duration,
}

impl ExpirationScheduler {
    pub fn new(job: ExpirationJob, period: Duration) -> Self {
        Self { job, period }
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(period_secs = self.period.as_secs(), "Expiration scheduler started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.job.run_once(Utc::now()).await {
                        Ok(report) => info!(
                            expired = report.expired,
                            batches = report.batches,
                            "Expired events updated"
                        ),
                        Err(e) => error!(error = ?e, "Failed to expire events"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Expiration scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Event, EventStatus, ExpiredEvent, NewEvent, Organization};
    use crate::store::{MemoryEventStore, MockEventStore};
    use chrono::Duration as ChronoDuration;
    use uuid::Uuid;

    fn event(org_id: Uuid, date: DateTime<Utc>) -> Event {
        NewEvent {
            id: Uuid::new_v4(),
            name: "Opening night".to_string(),
            description: "Live music and cocktails".to_string(),
            location: "Downtown".to_string(),
            date,
            image_url: "img.png".to_string(),
            organization_id: org_id,
            created_at: date - ChronoDuration::days(30),
        }
        .into_event()
    }

    async fn org_with(store: &MemoryEventStore, active: i32) -> Organization {
        let mut org = Organization::new(Uuid::new_v4(), "Acme".into(), Uuid::new_v4(), Utc::now());
        org.active_events_count = active;
        store.put_organization(org.clone()).await;
        org
    }

    #[tokio::test]
    async fn test_only_past_active_events_expire() {
        let store = MemoryEventStore::new();
        let org = org_with(&store, 3).await;
        let now = Utc::now();

        let a = event(org.id, now - ChronoDuration::days(1));
        let b = event(org.id, now + ChronoDuration::days(1));
        let c = event(org.id, now + ChronoDuration::days(2));
        for e in [&a, &b, &c] {
            store.put_event(e.clone()).await;
        }

        let job = ExpirationJob::new(Arc::new(store.clone()), 500);
        let report = job.run_once(now).await.unwrap();
        assert_eq!(report, ExpirationReport { expired: 1, batches: 1 });

        let a_after = store.fetch_event(a.id).await.unwrap().unwrap();
        assert_eq!(a_after.status, EventStatus::Finished);
        assert_eq!(a_after.updated_at, now);
        for e in [&b, &c] {
            let unchanged = store.fetch_event(e.id).await.unwrap().unwrap();
            assert_eq!(&unchanged, e);
        }

        let org_after = store.fetch_organization(org.id).await.unwrap().unwrap();
        assert_eq!(org_after.active_events_count, 2);
    }

    #[tokio::test]
    async fn test_second_run_is_a_no_op() {
        let store = MemoryEventStore::new();
        let org = org_with(&store, 2).await;
        let now = Utc::now();
        store.put_event(event(org.id, now - ChronoDuration::hours(3))).await;
        store.put_event(event(org.id, now - ChronoDuration::hours(2))).await;

        let job = ExpirationJob::new(Arc::new(store.clone()), 500);
        assert_eq!(job.run_once(now).await.unwrap().expired, 2);
        assert_eq!(job.run_once(now).await.unwrap(), ExpirationReport::default());

        let org_after = store.fetch_organization(org.id).await.unwrap().unwrap();
        assert_eq!(org_after.active_events_count, 0);
    }

    #[tokio::test]
    async fn test_large_backlog_is_committed_in_chunks() {
        let store = MemoryEventStore::new();
        let first = org_with(&store, 4).await;
        let second = org_with(&store, 3).await;
        let now = Utc::now();

        for i in 0..4 {
            store
                .put_event(event(first.id, now - ChronoDuration::minutes(i + 1)))
                .await;
        }
        for i in 0..3 {
            store
                .put_event(event(second.id, now - ChronoDuration::minutes(i + 10)))
                .await;
        }

        let job = ExpirationJob::new(Arc::new(store.clone()), 3);
        let report = job.run_once(now).await.unwrap();
        assert_eq!(report.expired, 7);
        assert_eq!(report.batches, 3);

        for org in [&first, &second] {
            let after = store.fetch_organization(org.id).await.unwrap().unwrap();
            assert_eq!(after.active_events_count, 0);
        }
        assert!(store.find_expired_events(now, 100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_organization_does_not_block_expiration() {
        let store = MemoryEventStore::new();
        let org = org_with(&store, 1).await;
        let now = Utc::now();
        let orphan = event(org.id, now - ChronoDuration::days(2));
        store.put_event(orphan.clone()).await;
        store.remove_organization(org.id).await;

        let job = ExpirationJob::new(Arc::new(store.clone()), 500);
        assert_eq!(job.run_once(now).await.unwrap().expired, 1);

        let after = store.fetch_event(orphan.id).await.unwrap().unwrap();
        assert_eq!(after.status, EventStatus::Finished);
    }

    #[tokio::test]
    async fn test_commit_failure_ends_run() {
        let expired = ExpiredEvent {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
        };

        let mut store = MockEventStore::new();
        store
            .expect_find_expired_events()
            .times(1)
            .returning(move |_, _| Ok(vec![expired]));
        store
            .expect_commit()
            .times(1)
            .withf(move |batch| batch.len() == 2)
            .returning(|_| Err(StoreError::Unavailable("connection reset".into())));

        let job = ExpirationJob::new(Arc::new(store), 500);
        assert_eq!(
            job.run_once(Utc::now()).await,
            Err(StoreError::Unavailable("connection reset".into()))
        );
    }

    #[tokio::test]
    async fn test_query_failure_ends_run() {
        let mut store = MockEventStore::new();
        store
            .expect_find_expired_events()
            .returning(|_, _| Err(StoreError::Timeout));
        store.expect_commit().never();

        let job = ExpirationJob::new(Arc::new(store), 500);
        assert_eq!(job.run_once(Utc::now()).await, Err(StoreError::Timeout));
    }

    #[tokio::test]
    async fn test_scheduler_runs_immediately_and_stops_on_shutdown() {
        let store = MemoryEventStore::new();
        let org = org_with(&store, 1).await;
        let past = event(org.id, Utc::now() - ChronoDuration::hours(1));
        store.put_event(past.clone()).await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scheduler = ExpirationScheduler::new(
            ExpirationJob::new(Arc::new(store.clone()), 500),
            Duration::from_secs(3600),
        );
        let handle = scheduler.spawn(shutdown_rx);

        // The first tick fires right away.
        let mut finished = false;
        for _ in 0..50 {
            let e = store.fetch_event(past.id).await.unwrap().unwrap();
            if e.status == EventStatus::Finished {
                finished = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(finished);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
