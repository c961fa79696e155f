//! JobStore port - durable table of scheduled jobs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{JobId, JobState, ScheduledJob, StoreError};
use crate::observability::JobCounts;

/// Result of `JobStore::withdraw`.
#[derive(Debug, Clone, PartialEq)]
pub enum Withdrawal {
    Removed(ScheduledJob),
    /// The job exists but has already left PENDING.
    NotPending(JobState),
    Missing,
}

/// Source of truth for job state.
///
/// # Claim
/// `claim` is a conditional update: it moves a job to RUNNING only if it is
/// still PENDING / RETRY_SCHEDULED and due. Under concurrent dispatch exactly
/// one caller gets `Some`; everyone else gets `None`.
///
/// # Finish
/// `finish` stores the outcome of an execution and only succeeds while the
/// stored job is RUNNING, so a stale executor cannot overwrite newer state.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: ScheduledJob) -> Result<(), StoreError>;

    async fn get(&self, id: JobId) -> Result<Option<ScheduledJob>, StoreError>;

    /// Up to `limit` due jobs, earliest due time first, ties broken by id.
    async fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<ScheduledJob>, StoreError>;

    async fn claim(&self, id: JobId, now: DateTime<Utc>) -> Result<Option<ScheduledJob>, StoreError>;

    async fn finish(&self, job: &ScheduledJob) -> Result<(), StoreError>;

    /// Delete a job, but only while it is still PENDING.
    async fn withdraw(&self, id: JobId) -> Result<Withdrawal, StoreError>;

    async fn counts(&self) -> Result<JobCounts, StoreError>;
}
