//! InMemoryJobStore - 開発用・テスト用の JobStore
//!
//! Mutex 1 本で全 job を守る。claim は「状態が待機中かつ due なら RUNNING にする」
//! を lock の中で判定するので、同時に claim しても勝つのは 1 つだけ。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{JobId, JobState, ScheduledJob, StoreError};
use crate::observability::JobCounts;
use crate::ports::{JobStore, Withdrawal};

#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<JobId, ScheduledJob>>,
    unavailable: AtomicBool,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails with `StoreError::Unavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("job store offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: ScheduledJob) -> Result<(), StoreError> {
        self.check_available()?;
        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::Conflict(format!("job {} already exists", job.id)));
        }
        jobs.insert(job.id, job);
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<ScheduledJob>, StoreError> {
        self.check_available()?;
        Ok(self.jobs.lock().await.get(&id).cloned())
    }

    async fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<ScheduledJob>, StoreError> {
        self.check_available()?;
        let jobs = self.jobs.lock().await;

        let mut due: Vec<_> = jobs
            .values()
            .filter_map(|job| job.due_at().filter(|at| *at <= now).map(|at| (at, job)))
            .collect();
        due.sort_by_key(|(at, job)| (*at, job.id));

        Ok(due
            .into_iter()
            .take(limit)
            .map(|(_, job)| job.clone())
            .collect())
    }

    async fn claim(&self, id: JobId, now: DateTime<Utc>) -> Result<Option<ScheduledJob>, StoreError> {
        self.check_available()?;
        let mut jobs = self.jobs.lock().await;
        match jobs.get_mut(&id) {
            Some(job) if job.state.is_claimable() && job.is_due(now) => {
                job.mark_running(now);
                Ok(Some(job.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn finish(&self, job: &ScheduledJob) -> Result<(), StoreError> {
        self.check_available()?;
        if !(job.state.is_terminal() || job.state == JobState::RetryScheduled) {
            return Err(StoreError::Corrupt(format!(
                "job {} cannot finish as {:?}",
                job.id, job.state
            )));
        }
        let mut jobs = self.jobs.lock().await;
        match jobs.get_mut(&job.id) {
            Some(stored) if stored.state == JobState::Running => {
                *stored = job.clone();
                Ok(())
            }
            Some(stored) => Err(StoreError::Conflict(format!(
                "job {} is {:?}, not RUNNING",
                job.id, stored.state
            ))),
            None => Err(StoreError::Conflict(format!("job {} does not exist", job.id))),
        }
    }

    async fn withdraw(&self, id: JobId) -> Result<Withdrawal, StoreError> {
        self.check_available()?;
        let mut jobs = self.jobs.lock().await;
        match jobs.get(&id).map(|job| job.state) {
            None => Ok(Withdrawal::Missing),
            Some(JobState::Pending) => Ok(jobs
                .remove(&id)
                .map_or(Withdrawal::Missing, Withdrawal::Removed)),
            Some(state) => Ok(Withdrawal::NotPending(state)),
        }
    }

    async fn counts(&self) -> Result<JobCounts, StoreError> {
        self.check_available()?;
        Ok(self.jobs.lock().await.values().map(|job| job.state).collect())
    }
}
