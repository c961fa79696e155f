//! Scheduled job record and its state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::JobId;

/// Job state.
///
/// State transitions:
/// - Pending -> Running -> Succeeded
/// - Pending -> Running -> RetryScheduled -> Running (loop until retries run out)
/// - Pending -> Running -> Failed (retries exhausted, or no handler for the type)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Waiting for `scheduled_time`.
    Pending,

    /// Claimed by a dispatcher; exactly one execution in flight.
    Running,

    Succeeded,

    /// Waiting for `next_attempt_at` after a failed attempt.
    RetryScheduled,

    /// Failed permanently.
    Failed,
}

impl JobState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }

    /// Can a dispatcher claim a job in this state (once it is due)?
    pub fn is_claimable(self) -> bool {
        matches!(self, JobState::Pending | JobState::RetryScheduled)
    }
}

/// One row of the job table.
///
/// All state changes go through the methods below so `updated_at` and the
/// retry bookkeeping stay consistent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: JobId,
    pub event_type: String,
    pub scheduled_time: DateTime<Utc>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub state: JobState,

    /// Handler executions so far (successful or not).
    pub attempt_count: u32,

    /// Retries allowed after the first attempt.
    pub max_retries: u32,

    /// Only meaningful in `RetryScheduled`.
    pub next_attempt_at: Option<DateTime<Utc>>,

    pub last_error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduledJob {
    pub fn new(
        id: JobId,
        event_type: impl Into<String>,
        scheduled_time: DateTime<Utc>,
        metadata: serde_json::Map<String, serde_json::Value>,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            event_type: event_type.into(),
            scheduled_time,
            metadata,
            state: JobState::Pending,
            attempt_count: 0,
            max_retries,
            next_attempt_at: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// When the job becomes eligible for dispatch, if it is claimable at all.
    pub fn due_at(&self) -> Option<DateTime<Utc>> {
        match self.state {
            JobState::Pending => Some(self.scheduled_time),
            JobState::RetryScheduled => Some(self.next_attempt_at.unwrap_or(self.scheduled_time)),
            _ => None,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due_at().is_some_and(|due| due <= now)
    }

    /// Total attempts this job may make.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// May another attempt follow attempt number `attempt` (1-indexed)?
    pub fn may_retry_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts()
    }

    /// Claim for execution.
    pub fn mark_running(&mut self, now: DateTime<Utc>) {
        self.state = JobState::Running;
        self.updated_at = now;
    }

    /// The handler ran and returned success.
    pub fn mark_succeeded(&mut self, now: DateTime<Utc>) {
        self.attempt_count += 1;
        self.state = JobState::Succeeded;
        self.next_attempt_at = None;
        self.last_error = None;
        self.updated_at = now;
    }

    /// The handler ran and failed (or timed out); try again at `next_attempt_at`.
    pub fn schedule_retry(&mut self, next_attempt_at: DateTime<Utc>, error: String, now: DateTime<Utc>) {
        self.attempt_count += 1;
        self.state = JobState::RetryScheduled;
        self.next_attempt_at = Some(next_attempt_at);
        self.last_error = Some(error);
        self.updated_at = now;
    }

    /// The handler ran and failed with no retries left.
    pub fn mark_exhausted(&mut self, error: String, now: DateTime<Utc>) {
        self.attempt_count += 1;
        self.state = JobState::Failed;
        self.next_attempt_at = None;
        self.last_error = Some(error);
        self.updated_at = now;
    }

    /// Fail without running a handler (configuration error); no attempt is consumed.
    pub fn mark_rejected(&mut self, error: String, now: DateTime<Utc>) {
        self.state = JobState::Failed;
        self.next_attempt_at = None;
        self.last_error = Some(error);
        self.updated_at = now;
    }

    pub fn status_view(&self) -> JobStatusView {
        JobStatusView {
            job_id: self.id,
            event_type: self.event_type.clone(),
            state: self.state,
            attempt_count: self.attempt_count,
            max_retries: self.max_retries,
            scheduled_time: self.scheduled_time,
            next_attempt_at: self.next_attempt_at,
            last_error: self.last_error.clone(),
        }
    }
}

/// Job status for API responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusView {
    pub job_id: JobId,
    pub event_type: String,
    pub state: JobState,
    pub attempt_count: u32,
    pub max_retries: u32,
    pub scheduled_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}
