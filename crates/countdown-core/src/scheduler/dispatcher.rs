//! Scheduler - schedules jobs and dispatches due ones to handlers.
//!
//! # フロー（1 回の dispatch）
//! 1. 空き slot = min(semaphore の空き permit, max_concurrent_jobs - store 上の RUNNING 数)
//! 2. due な job を (due 時刻, id) 順に最大 slot 件取得
//! 3. 1 件ずつ条件付き claim（負けたら次へ）し、permit を持たせて spawn
//! 4. 実行: handler を timeout 付きで走らせ、結果を job に反映して finish
//!
//! store エラーは内部で再試行し、job の失敗回数には数えない。
//! 結果の書き込み（finish）は store が戻るまで permit を握ったまま再試行し続ける。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::registry::{HandlerRegistry, JobContext};
use super::retry::{RetryPolicy, until_stored, with_store_retry};
use crate::config::SchedulerConfig;
use crate::domain::{JobId, JobState, JobStatusView, ScheduledJob, StoreError};
use crate::observability::JobCounts;
use crate::ports::{Clock, IdGenerator, JobStore, Withdrawal};

/// How far in the past a `scheduled_time` may be and still be accepted.
const CLOCK_SKEW_MS: i64 = 1_000;

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleRequest {
    pub event_type: String,
    pub scheduled_time: DateTime<Utc>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Overrides the configured `max_retries` for this job.
    pub max_retries: Option<u32>,
}

impl ScheduleRequest {
    pub fn new(event_type: impl Into<String>, scheduled_time: DateTime<Utc>) -> Self {
        Self {
            event_type: event_type.into(),
            scheduled_time,
            metadata: serde_json::Map::new(),
            max_retries: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Map<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("invalid schedule request: {0}")]
    InvalidRequest(String),

    #[error("job {0} not found")]
    NotFound(JobId),

    #[error("job {job_id} is {state:?} and can no longer be withdrawn")]
    NotWithdrawable { job_id: JobId, state: JobState },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Runs one claimed job to completion. Shared by every spawned execution.
struct JobRunner {
    store: Arc<dyn JobStore>,
    registry: Arc<HandlerRegistry>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    job_timeout: std::time::Duration,
}

impl JobRunner {
    async fn execute(&self, mut job: ScheduledJob, _permit: OwnedSemaphorePermit) {
        let Some(handler) = self.registry.get(&job.event_type) else {
            warn!(job_id = %job.id, event_type = %job.event_type, "no handler registered, failing job");
            let message = format!("no handler registered for event type '{}'", job.event_type);
            job.mark_rejected(message, self.clock.now());
            self.finish(&job).await;
            return;
        };

        let attempt = job.attempt_count + 1;
        let ctx = JobContext::for_attempt(&job, attempt);
        debug!(job_id = %job.id, event_type = %job.event_type, attempt, "executing job");

        // separate task so a panicking handler fails the attempt instead of stranding the job
        let mut task = tokio::spawn(async move { handler.handle(&ctx).await });
        let outcome = match tokio::time::timeout(self.job_timeout, &mut task).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(e.to_string()),
            Ok(Err(join_error)) => Err(format!("handler panicked: {join_error}")),
            Err(_) => {
                task.abort();
                Err(format!("timed out after {}s", self.job_timeout.as_secs_f64()))
            }
        };

        let now = self.clock.now();
        match outcome {
            Ok(()) => {
                job.mark_succeeded(now);
                info!(job_id = %job.id, event_type = %job.event_type, attempt, "job succeeded");
            }
            Err(message) if job.may_retry_after(attempt) => {
                let delay = self.retry.sample_delay(attempt);
                match chrono::Duration::from_std(delay)
                    .ok()
                    .and_then(|d| now.checked_add_signed(d))
                {
                    Some(next_attempt_at) => {
                        warn!(
                            job_id = %job.id,
                            event_type = %job.event_type,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %message,
                            "job failed, retry scheduled"
                        );
                        job.schedule_retry(next_attempt_at, message, now);
                    }
                    None => {
                        error!(job_id = %job.id, attempt, "retry time out of range, failing job");
                        job.mark_exhausted(message, now);
                    }
                }
            }
            Err(message) => {
                error!(
                    job_id = %job.id,
                    event_type = %job.event_type,
                    attempt,
                    error = %message,
                    "job failed, no retries left"
                );
                job.mark_exhausted(message, now);
            }
        }

        self.finish(&job).await;
    }

    /// Store the outcome. Outages are waited out while this execution still
    /// holds its permit, so the job never stays RUNNING because of one.
    async fn finish(&self, job: &ScheduledJob) {
        if let Err(e) = until_stored("finish", || self.store.finish(job)).await {
            error!(job_id = %job.id, state = ?job.state, error = %e, "could not record job outcome");
        }
    }
}

pub struct Scheduler {
    store: Arc<dyn JobStore>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    permits: Arc<Semaphore>,
    runner: Arc<JobRunner>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn JobStore>,
        registry: HandlerRegistry,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        let runner = Arc::new(JobRunner {
            store: Arc::clone(&store),
            registry: Arc::new(registry),
            clock: Arc::clone(&clock),
            retry: RetryPolicy::from_config(&config),
            job_timeout: config.job_timeout,
        });

        Self {
            store,
            ids,
            clock,
            permits: Arc::new(Semaphore::new(config.max_concurrent_jobs)),
            config,
            runner,
        }
    }

    /// Persist a new PENDING job.
    pub async fn schedule(&self, request: ScheduleRequest) -> Result<JobId, ScheduleError> {
        let event_type = request.event_type.trim();
        if event_type.is_empty() {
            return Err(ScheduleError::InvalidRequest("event_type must not be blank".into()));
        }

        let now = self.clock.now();
        if request.scheduled_time < now - chrono::Duration::milliseconds(CLOCK_SKEW_MS) {
            return Err(ScheduleError::InvalidRequest(format!(
                "scheduled_time {} is in the past",
                request.scheduled_time.to_rfc3339()
            )));
        }

        let job = ScheduledJob::new(
            self.ids.generate_job_id(),
            event_type,
            request.scheduled_time,
            request.metadata,
            request.max_retries.unwrap_or(self.config.max_retries),
            now,
        );
        let id = job.id;
        self.store.insert(job).await?;

        info!(
            job_id = %id,
            event_type,
            scheduled_time = %request.scheduled_time.to_rfc3339(),
            "job scheduled"
        );
        Ok(id)
    }

    pub async fn job_status(&self, id: JobId) -> Result<JobStatusView, ScheduleError> {
        self.store
            .get(id)
            .await?
            .map(|job| job.status_view())
            .ok_or(ScheduleError::NotFound(id))
    }

    /// Remove a job that has not started yet.
    pub async fn withdraw(&self, id: JobId) -> Result<ScheduledJob, ScheduleError> {
        match self.store.withdraw(id).await? {
            Withdrawal::Removed(job) => {
                info!(job_id = %id, "job withdrawn");
                Ok(job)
            }
            Withdrawal::NotPending(state) => Err(ScheduleError::NotWithdrawable { job_id: id, state }),
            Withdrawal::Missing => Err(ScheduleError::NotFound(id)),
        }
    }

    pub async fn counts(&self) -> Result<JobCounts, ScheduleError> {
        Ok(self.store.counts().await?)
    }

    /// Claim as many due jobs as there are free slots and start them.
    ///
    /// Returns the handles of the executions started by this call.
    pub async fn dispatch_once(&self) -> Result<Vec<JoinHandle<()>>, ScheduleError> {
        let running = with_store_retry("counts", || self.store.counts()).await?.running;
        let slots = self
            .permits
            .available_permits()
            .min(self.config.max_concurrent_jobs.saturating_sub(running));
        if slots == 0 {
            debug!(running, "no free slots");
            return Ok(Vec::new());
        }

        let now = self.clock.now();
        let due = with_store_retry("due", || self.store.due(now, slots)).await?;

        let mut started = Vec::with_capacity(due.len());
        for job in due {
            let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
                break;
            };

            let claimed = match with_store_retry("claim", || self.store.claim(job.id, now)).await {
                Ok(Some(claimed)) => claimed,
                Ok(None) => {
                    debug!(job_id = %job.id, "claimed by another dispatcher");
                    continue;
                }
                Err(e) => {
                    warn!(job_id = %job.id, error = %e, "claim failed, stopping this round");
                    break;
                }
            };

            debug!(job_id = %claimed.id, event_type = %claimed.event_type, "job claimed");
            let runner = Arc::clone(&self.runner);
            started.push(tokio::spawn(async move { runner.execute(claimed, permit).await }));
        }

        Ok(started)
    }

    /// Poll and dispatch until `shutdown` flips to true (or its sender is
    /// dropped), then wait for in-flight executions to finish.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut in_flight: Vec<JoinHandle<()>> = Vec::new();
        let mut ticker = tokio::time::interval(self.config.dispatch_poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            max_concurrent_jobs = self.config.max_concurrent_jobs,
            poll_ms = self.config.dispatch_poll_interval.as_millis() as u64,
            "scheduler started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            in_flight.retain(|h| !h.is_finished());
            match self.dispatch_once().await {
                Ok(started) => in_flight.extend(started),
                Err(e) => warn!(error = %e, "dispatch round failed"),
            }
        }

        info!(in_flight = in_flight.len(), "scheduler stopping, waiting for running jobs");
        for handle in in_flight {
            if let Err(e) = handle.await {
                error!(error = %e, "job execution task panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::TimeZone;

    use crate::impls::InMemoryJobStore;
    use crate::ports::{FixedClock, UlidGenerator};
    use crate::scheduler::registry::{HandlerError, JobHandler};

    struct AlwaysFails;

    #[async_trait]
    impl JobHandler for AlwaysFails {
        async fn handle(&self, _job: &JobContext) -> Result<(), HandlerError> {
            Err(HandlerError::new("encoder crashed"))
        }
    }

    struct Succeeds;

    #[async_trait]
    impl JobHandler for Succeeds {
        async fn handle(&self, _job: &JobContext) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    struct Sleeps(Duration);

    #[async_trait]
    impl JobHandler for Sleeps {
        async fn handle(&self, _job: &JobContext) -> Result<(), HandlerError> {
            tokio::time::sleep(self.0).await;
            Ok(())
        }
    }

    struct Panics;

    #[async_trait]
    impl JobHandler for Panics {
        async fn handle(&self, _job: &JobContext) -> Result<(), HandlerError> {
            panic!("handler bug");
        }
    }

    /// Succeeds, but takes the job store offline on its first run.
    struct TakesStoreDown {
        store: Arc<InMemoryJobStore>,
        tripped: AtomicBool,
    }

    #[async_trait]
    impl JobHandler for TakesStoreDown {
        async fn handle(&self, _job: &JobContext) -> Result<(), HandlerError> {
            if !self.tripped.swap(true, Ordering::SeqCst) {
                self.store.set_unavailable(true);
            }
            Ok(())
        }
    }

    /// Blocks until the test releases a permit; records peak concurrency.
    struct Gated {
        gate: Arc<Semaphore>,
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl JobHandler for Gated {
        async fn handle(&self, _job: &JobContext) -> Result<(), HandlerError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| HandlerError::new(e.to_string()))?;
            permit.forget();
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            max_concurrent_jobs: 4,
            job_timeout: Duration::from_secs(5),
            retry_delay: Duration::from_secs(60),
            max_retries: 2,
            dispatch_poll_interval: Duration::from_millis(10),
            retry_max_delay: Duration::from_secs(3600),
            retry_jitter_ratio: 0.1,
        }
    }

    struct Fixture {
        clock: Arc<FixedClock>,
        store: Arc<InMemoryJobStore>,
        scheduler: Scheduler,
    }

    fn fixture(registry: HandlerRegistry, config: SchedulerConfig) -> Fixture {
        let clock = Arc::new(FixedClock::new(t0()));
        let store = Arc::new(InMemoryJobStore::new());
        let scheduler = Scheduler::new(
            store.clone(),
            registry,
            Arc::new(UlidGenerator::new(clock.clone())),
            clock.clone(),
            config,
        );
        Fixture {
            clock,
            store,
            scheduler,
        }
    }

    fn registry(event_type: &str, handler: Arc<dyn JobHandler>) -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        registry.register(event_type, handler).unwrap();
        registry
    }

    async fn dispatch_and_wait(scheduler: &Scheduler) -> usize {
        let handles = scheduler.dispatch_once().await.unwrap();
        let n = handles.len();
        for h in handles {
            h.await.unwrap();
        }
        n
    }

    #[tokio::test]
    async fn failing_job_retries_with_growing_backoff_then_fails() {
        let f = fixture(registry("video_render", Arc::new(AlwaysFails)), config());
        let id = f
            .scheduler
            .schedule(ScheduleRequest::new("video_render", t0()))
            .await
            .unwrap();

        let mut delays = Vec::new();
        for attempt in 1..=2 {
            assert_eq!(dispatch_and_wait(&f.scheduler).await, 1);
            let status = f.scheduler.job_status(id).await.unwrap();
            assert_eq!(status.state, JobState::RetryScheduled);
            assert_eq!(status.attempt_count, attempt);

            let next = status.next_attempt_at.unwrap();
            delays.push(next - f.clock.now());

            // not due yet: nothing happens
            assert_eq!(dispatch_and_wait(&f.scheduler).await, 0);
            f.clock.set(next);
        }

        assert_eq!(dispatch_and_wait(&f.scheduler).await, 1);
        let status = f.scheduler.job_status(id).await.unwrap();
        assert_eq!(status.state, JobState::Failed);
        assert_eq!(status.attempt_count, 3);
        assert_eq!(status.last_error.as_deref(), Some("encoder crashed"));
        assert!(status.state.is_terminal());

        assert!(delays[0] >= chrono::Duration::seconds(60));
        assert!(delays[0] < chrono::Duration::seconds(66));
        assert!(delays[1] >= chrono::Duration::seconds(120));
        assert!(delays[1] > delays[0]);

        // terminal: never dispatched again
        f.clock.advance(chrono::Duration::days(1));
        assert_eq!(dispatch_and_wait(&f.scheduler).await, 0);
    }

    #[tokio::test]
    async fn successful_job_counts_one_attempt() {
        let f = fixture(registry("video_render", Arc::new(Succeeds)), config());
        let id = f
            .scheduler
            .schedule(ScheduleRequest::new("video_render", t0()))
            .await
            .unwrap();

        assert_eq!(dispatch_and_wait(&f.scheduler).await, 1);
        let status = f.scheduler.job_status(id).await.unwrap();
        assert_eq!(status.state, JobState::Succeeded);
        assert_eq!(status.attempt_count, 1);
        assert_eq!(status.next_attempt_at, None);
    }

    #[tokio::test]
    async fn per_request_retry_override_is_honoured() {
        let f = fixture(registry("video_render", Arc::new(AlwaysFails)), config());
        let id = f
            .scheduler
            .schedule(ScheduleRequest::new("video_render", t0()).with_max_retries(0))
            .await
            .unwrap();

        dispatch_and_wait(&f.scheduler).await;
        let status = f.scheduler.job_status(id).await.unwrap();
        assert_eq!(status.state, JobState::Failed);
        assert_eq!(status.attempt_count, 1);
    }

    #[tokio::test]
    async fn unknown_event_type_fails_without_consuming_an_attempt() {
        let f = fixture(registry("video_render", Arc::new(Succeeds)), config());
        let id = f
            .scheduler
            .schedule(ScheduleRequest::new("mystery", t0()))
            .await
            .unwrap();

        dispatch_and_wait(&f.scheduler).await;
        let status = f.scheduler.job_status(id).await.unwrap();
        assert_eq!(status.state, JobState::Failed);
        assert_eq!(status.attempt_count, 0);
        assert!(status.last_error.unwrap().contains("mystery"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_counts_as_a_failed_attempt() {
        let config = SchedulerConfig {
            job_timeout: Duration::from_millis(50),
            ..config()
        };
        let f = fixture(registry("video_render", Arc::new(Sleeps(Duration::from_secs(30)))), config);
        let id = f
            .scheduler
            .schedule(ScheduleRequest::new("video_render", t0()))
            .await
            .unwrap();

        dispatch_and_wait(&f.scheduler).await;
        let status = f.scheduler.job_status(id).await.unwrap();
        assert_eq!(status.state, JobState::RetryScheduled);
        assert_eq!(status.attempt_count, 1);
        assert!(status.last_error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn panicking_handler_fails_the_attempt() {
        let f = fixture(registry("video_render", Arc::new(Panics)), config());
        let id = f
            .scheduler
            .schedule(ScheduleRequest::new("video_render", t0()))
            .await
            .unwrap();

        dispatch_and_wait(&f.scheduler).await;
        let status = f.scheduler.job_status(id).await.unwrap();
        assert_eq!(status.state, JobState::RetryScheduled);
        assert!(status.last_error.unwrap().contains("panicked"));
    }

    #[tokio::test]
    async fn running_jobs_never_exceed_the_limit() {
        let gate = Arc::new(Semaphore::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let handler = Gated {
            gate: gate.clone(),
            active: Arc::new(AtomicUsize::new(0)),
            peak: peak.clone(),
        };
        let config = SchedulerConfig {
            max_concurrent_jobs: 2,
            ..config()
        };
        let f = fixture(registry("video_render", Arc::new(handler)), config);
        for _ in 0..5 {
            f.scheduler
                .schedule(ScheduleRequest::new("video_render", t0()))
                .await
                .unwrap();
        }

        let first = f.scheduler.dispatch_once().await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(f.scheduler.counts().await.unwrap().running, 2);

        // saturated: a second round starts nothing
        assert!(f.scheduler.dispatch_once().await.unwrap().is_empty());

        gate.add_permits(2);
        for h in first {
            h.await.unwrap();
        }
        let counts = f.scheduler.counts().await.unwrap();
        assert_eq!(counts.succeeded, 2);
        assert_eq!(counts.pending, 3);

        gate.add_permits(3);
        let mut finished = 0;
        while finished < 3 {
            let handles = f.scheduler.dispatch_once().await.unwrap();
            assert!(handles.len() <= 2);
            for h in handles {
                h.await.unwrap();
                finished += 1;
            }
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(f.scheduler.counts().await.unwrap().succeeded, 5);
    }

    #[tokio::test]
    async fn jobs_run_in_due_order() {
        let f = fixture(
            registry("video_render", Arc::new(Succeeds)),
            SchedulerConfig {
                max_concurrent_jobs: 1,
                ..config()
            },
        );
        let late = f
            .scheduler
            .schedule(ScheduleRequest::new("video_render", t0() + chrono::Duration::seconds(5)))
            .await
            .unwrap();
        let early = f
            .scheduler
            .schedule(ScheduleRequest::new("video_render", t0()))
            .await
            .unwrap();
        f.clock.advance(chrono::Duration::seconds(10));

        dispatch_and_wait(&f.scheduler).await;
        assert_eq!(f.scheduler.job_status(early).await.unwrap().state, JobState::Succeeded);
        assert_eq!(f.scheduler.job_status(late).await.unwrap().state, JobState::Pending);
    }

    #[tokio::test]
    async fn schedule_validates_request() {
        let f = fixture(HandlerRegistry::new(), config());

        let blank = f.scheduler.schedule(ScheduleRequest::new("  ", t0())).await;
        assert!(matches!(blank, Err(ScheduleError::InvalidRequest(_))));

        let past = f
            .scheduler
            .schedule(ScheduleRequest::new("video_render", t0() - chrono::Duration::minutes(5)))
            .await;
        assert!(matches!(past, Err(ScheduleError::InvalidRequest(_))));

        // within the skew allowance
        let skewed = f
            .scheduler
            .schedule(ScheduleRequest::new("video_render", t0() - chrono::Duration::milliseconds(500)))
            .await;
        assert!(skewed.is_ok());
    }

    #[tokio::test]
    async fn withdraw_only_while_pending() {
        let f = fixture(registry("video_render", Arc::new(Succeeds)), config());
        let pending = f
            .scheduler
            .schedule(ScheduleRequest::new("video_render", t0() + chrono::Duration::hours(1)))
            .await
            .unwrap();
        let done = f
            .scheduler
            .schedule(ScheduleRequest::new("video_render", t0()))
            .await
            .unwrap();
        dispatch_and_wait(&f.scheduler).await;

        let removed = f.scheduler.withdraw(pending).await.unwrap();
        assert_eq!(removed.id, pending);
        assert!(matches!(
            f.scheduler.job_status(pending).await,
            Err(ScheduleError::NotFound(_))
        ));
        assert!(matches!(
            f.scheduler.withdraw(done).await,
            Err(ScheduleError::NotWithdrawable {
                state: JobState::Succeeded,
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn store_outage_is_not_a_job_failure() {
        let f = fixture(registry("video_render", Arc::new(Succeeds)), config());
        let id = f
            .scheduler
            .schedule(ScheduleRequest::new("video_render", t0()))
            .await
            .unwrap();

        f.store.set_unavailable(true);
        let result = f.scheduler.dispatch_once().await;
        assert!(matches!(result, Err(ScheduleError::Store(StoreError::Unavailable(_)))));

        f.store.set_unavailable(false);
        let status = f.scheduler.job_status(id).await.unwrap();
        assert_eq!(status.state, JobState::Pending);
        assert_eq!(status.attempt_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn long_outage_while_recording_an_outcome_does_not_strand_the_job() {
        let clock = Arc::new(FixedClock::new(t0()));
        let store = Arc::new(InMemoryJobStore::new());
        let handler = TakesStoreDown {
            store: store.clone(),
            tripped: AtomicBool::new(false),
        };
        let scheduler = Scheduler::new(
            store.clone(),
            registry("video_render", Arc::new(handler)),
            Arc::new(UlidGenerator::new(clock.clone())),
            clock.clone(),
            SchedulerConfig {
                max_concurrent_jobs: 1,
                ..config()
            },
        );
        let ids = [
            scheduler.schedule(ScheduleRequest::new("video_render", t0())).await.unwrap(),
            scheduler.schedule(ScheduleRequest::new("video_render", t0())).await.unwrap(),
        ];

        let handles = scheduler.dispatch_once().await.unwrap();
        assert_eq!(handles.len(), 1);

        // far longer than the bounded store retries last
        tokio::time::sleep(Duration::from_secs(30)).await;
        store.set_unavailable(false);
        for h in handles {
            h.await.unwrap();
        }

        let counts = scheduler.counts().await.unwrap();
        assert_eq!(counts.running, 0);
        assert_eq!(counts.succeeded, 1);
        assert_eq!(counts.pending, 1);

        // the slot is free again, so the second job runs
        assert_eq!(dispatch_and_wait(&scheduler).await, 1);
        for id in ids {
            let status = scheduler.job_status(id).await.unwrap();
            assert_eq!(status.state, JobState::Succeeded);
            assert!(status.state.is_terminal());
            assert_eq!(status.attempt_count, 1);
        }
    }

    #[tokio::test]
    async fn run_drains_in_flight_jobs_on_shutdown() {
        let f = fixture(
            registry("video_render", Arc::new(Sleeps(Duration::from_millis(100)))),
            config(),
        );
        let id = f
            .scheduler
            .schedule(ScheduleRequest::new("video_render", t0()))
            .await
            .unwrap();

        let scheduler = Arc::new(f.scheduler);
        let (tx, rx) = watch::channel(false);
        let run = tokio::spawn({
            let scheduler = Arc::clone(&scheduler);
            async move { scheduler.run(rx).await }
        });

        // wait until the job has been picked up, then ask to stop
        while scheduler.counts().await.unwrap().running == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tx.send(true).unwrap();
        run.await.unwrap();

        let status = scheduler.job_status(id).await.unwrap();
        assert_eq!(status.state, JobState::Succeeded);
    }
}
