//! Demo: feeds launch events through the consumers, runs a few scheduled
//! jobs, then prints launch statistics and job counts as JSON.

use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use countdown_core::app::{ConsumerGroup, EventConsumer, LaunchStateMachine, ReportEngine};
use countdown_core::config::Config;
use countdown_core::domain::{LaunchEvent, Transition};
use countdown_core::impls::{
    InMemoryDeadLetterQueue, InMemoryEventSource, InMemoryJobStore, InMemoryLaunchStore,
};
use countdown_core::ports::{Clock, DeadLetterReason, SystemClock, UlidGenerator};
use countdown_core::scheduler::{
    HandlerError, JobContext, JobHandler, ScheduleRequest, SchedulerBuilder,
};

#[derive(Debug, Deserialize)]
struct RenderRequest {
    video_id: String,
}

/// Fails the first `failures` attempts, then succeeds.
struct VideoRender {
    failures: AtomicU32,
}

#[async_trait]
impl JobHandler for VideoRender {
    async fn handle(&self, job: &JobContext) -> Result<(), HandlerError> {
        let request: RenderRequest = job.metadata_as()?;

        let left = self.failures.load(Ordering::Relaxed);
        if left > 0 {
            self.failures.fetch_sub(1, Ordering::Relaxed);
            return Err(HandlerError::new(format!(
                "render of {} failed (left={left})",
                request.video_id
            )));
        }

        info!(video_id = %request.video_id, attempt = job.attempt, "video rendered");
        Ok(())
    }
}

fn sample_events() -> Vec<LaunchEvent> {
    let day = |d| Utc.with_ymd_and_hms(2026, 11, d, 9, 0, 0).single();
    let mut events = Vec::new();

    if let Some(date) = day(20) {
        events.extend([
            LaunchEvent::new("trace-a1", "acme", date, Transition::PreFlightPassed),
            LaunchEvent::new("trace-a2", "acme", date, Transition::StartCountdown),
            LaunchEvent::new("trace-a3", "acme", date, Transition::CompleteCountdown),
            // redelivery
            LaunchEvent::new("trace-a3", "acme", date, Transition::CompleteCountdown),
        ]);
    }
    if let Some(date) = day(21) {
        events.extend([
            LaunchEvent::new("trace-b1", "globex", date, Transition::PreFlightPassed),
            LaunchEvent::new("trace-b2", "globex", date, Transition::StartCountdown),
            LaunchEvent::new("trace-b3", "globex", date, Transition::AbortCountdown),
            // rejected: the countdown was aborted
            LaunchEvent::new("trace-b4", "globex", date, Transition::CompleteCountdown),
        ]);
    }
    if let Some(date) = day(22) {
        events.push(LaunchEvent::new("trace-c1", "initech", date, Transition::PreFlightFailed));
    }
    events
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    info!(?config, "configuration loaded");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ids = Arc::new(UlidGenerator::new(clock.clone()));

    // (A) launch lifecycle: broker → consumers → state machine
    let launches = Arc::new(InMemoryLaunchStore::new(clock.clone()));
    let source = Arc::new(InMemoryEventSource::new());
    let dead_letters = Arc::new(InMemoryDeadLetterQueue::new());

    for event in sample_events() {
        source.push_event(&event).await?;
    }
    source.push(b"{not json".to_vec()).await;
    source.close().await;

    let machine = Arc::new(LaunchStateMachine::new(launches.clone(), ids.clone(), clock.clone()));
    let consumer = Arc::new(EventConsumer::new(
        source.clone(),
        machine,
        dead_letters.clone(),
        clock.clone(),
        config.consumer.clone(),
    ));
    let consumed = ConsumerGroup::spawn(2, consumer).join().await;
    info!(
        applied = consumed.applied,
        dead_lettered = consumed.dead_lettered,
        redelivered = consumed.redelivered,
        "event stream drained"
    );

    // (B) scheduled jobs
    let jobs = Arc::new(InMemoryJobStore::new());
    let scheduler = Arc::new(
        SchedulerBuilder::new(config.scheduler.clone())
            .register(
                "video_render",
                Arc::new(VideoRender {
                    failures: AtomicU32::new(1),
                }),
            )?
            .expect_event_types(&["video_render"])
            .build(jobs, ids, clock.clone())?,
    );

    let mut scheduled = Vec::new();
    for video_id in ["v-100", "v-101", "v-102"] {
        let mut metadata = serde_json::Map::new();
        metadata.insert("video_id".into(), video_id.into());
        let request = ScheduleRequest::new("video_render", clock.now())
            .with_metadata(metadata)
            .with_max_retries(0);
        scheduled.push(scheduler.schedule(request).await?);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner = tokio::spawn({
        let scheduler = Arc::clone(&scheduler);
        async move { scheduler.run(shutdown_rx).await }
    });

    loop {
        let counts = scheduler.counts().await?;
        if counts.pending + counts.running + counts.retry_scheduled == 0 {
            break;
        }
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted");
                break;
            }
            _ = tokio::time::sleep(Duration::from_millis(100)) => {}
        }
    }
    shutdown_tx.send(true).ok();
    runner.await?;

    // (C) summary
    let reports = ReportEngine::new(launches, clock.clone(), config.report.clone());
    let statistics = reports.statistics().await?;
    println!("{}", serde_json::to_string_pretty(&statistics)?);
    if let (Some(start), Some(end)) = (
        Utc.with_ymd_and_hms(2026, 11, 21, 0, 0, 0).single(),
        Utc.with_ymd_and_hms(2026, 11, 23, 0, 0, 0).single(),
    ) {
        let period = reports.statistics_for_period(start, end).await?;
        println!("{}", serde_json::to_string_pretty(&period)?);
    }

    for id in scheduled {
        println!("{}", serde_json::to_string(&scheduler.job_status(id).await?)?);
    }
    println!("{}", serde_json::to_string_pretty(&scheduler.counts().await?)?);
    println!(
        "dead letters: {} (malformed={}, rejected={}, corrupt={})",
        dead_letters.len().await,
        dead_letters.count(DeadLetterReason::Malformed).await,
        dead_letters.count(DeadLetterReason::Rejected).await,
        dead_letters.count(DeadLetterReason::Corrupt).await,
    );

    Ok(())
}
