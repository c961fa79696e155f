//! EventConsumer - drives the state machine from an at-least-once source.
//!
//! A delivery is acked only after its outcome is durable: either the launch
//! store accepted the event (or it was a no-op), or a dead letter was written.
//! Transient failures nack the delivery so the broker hands it out again.

use std::ops::AddAssign;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::app::state_machine::{ApplyError, LaunchStateMachine};
use crate::config::ConsumerConfig;
use crate::domain::LaunchEvent;
use crate::ports::{Clock, DeadLetter, DeadLetterReason, DeadLetterSink, Delivery, EventSource, SourceError};

/// What happened to one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// Event applied (or recognised as already applied); acked.
    Applied,
    /// Parked in the dead-letter sink; acked.
    DeadLettered(DeadLetterReason),
    /// Transient failure; nacked for redelivery.
    Redeliver,
}

#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    #[error("event source error: {0}")]
    Source(#[from] SourceError),
}

/// Per-loop counters, returned when a consumer loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerReport {
    pub applied: usize,
    pub dead_lettered: usize,
    pub redelivered: usize,
}

impl ConsumerReport {
    fn record(&mut self, outcome: ConsumeOutcome) {
        match outcome {
            ConsumeOutcome::Applied => self.applied += 1,
            ConsumeOutcome::DeadLettered(_) => self.dead_lettered += 1,
            ConsumeOutcome::Redeliver => self.redelivered += 1,
        }
    }
}

impl AddAssign for ConsumerReport {
    fn add_assign(&mut self, other: Self) {
        self.applied += other.applied;
        self.dead_lettered += other.dead_lettered;
        self.redelivered += other.redelivered;
    }
}

pub struct EventConsumer {
    source: Arc<dyn EventSource>,
    machine: Arc<LaunchStateMachine>,
    dead_letters: Arc<dyn DeadLetterSink>,
    clock: Arc<dyn Clock>,
    config: ConsumerConfig,
}

impl EventConsumer {
    pub fn new(
        source: Arc<dyn EventSource>,
        machine: Arc<LaunchStateMachine>,
        dead_letters: Arc<dyn DeadLetterSink>,
        clock: Arc<dyn Clock>,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            source,
            machine,
            dead_letters,
            clock,
            config,
        }
    }

    /// Handle one delivery and ack or nack it.
    pub async fn process(&self, delivery: Delivery) -> Result<ConsumeOutcome, ConsumerError> {
        let outcome = self.handle(&delivery).await;
        match outcome {
            ConsumeOutcome::Redeliver => self.source.nack(delivery.id).await?,
            ConsumeOutcome::Applied | ConsumeOutcome::DeadLettered(_) => {
                self.source.ack(delivery.id).await?
            }
        }
        Ok(outcome)
    }

    async fn handle(&self, delivery: &Delivery) -> ConsumeOutcome {
        let event = match LaunchEvent::decode(&delivery.payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(delivery = delivery.id.0, error = %e, "malformed event");
                return self
                    .dead_letter(delivery, None, DeadLetterReason::Malformed, e.to_string())
                    .await;
            }
        };

        match self.machine.apply(&event).await {
            Ok(record) => {
                debug!(trace_id = %event.trace_id, status = %record.status, "event consumed");
                ConsumeOutcome::Applied
            }
            Err(e @ ApplyError::InvalidTransition { .. }) => {
                warn!(trace_id = %event.trace_id, error = %e, "transition rejected");
                self.dead_letter(delivery, Some(&event), DeadLetterReason::Rejected, e.to_string())
                    .await
            }
            Err(e) if e.is_transient() => {
                warn!(
                    trace_id = %event.trace_id,
                    delivery_count = delivery.delivery_count,
                    error = %e,
                    "transient failure, handing back for redelivery"
                );
                ConsumeOutcome::Redeliver
            }
            Err(e) => {
                error!(trace_id = %event.trace_id, error = %e, "launch record is corrupt");
                self.dead_letter(delivery, Some(&event), DeadLetterReason::Corrupt, e.to_string())
                    .await
            }
        }
    }

    async fn dead_letter(
        &self,
        delivery: &Delivery,
        event: Option<&LaunchEvent>,
        reason: DeadLetterReason,
        error: String,
    ) -> ConsumeOutcome {
        let letter = DeadLetter {
            reason,
            payload: String::from_utf8_lossy(&delivery.payload).into_owned(),
            trace_id: event.map(|e| e.trace_id.clone()),
            error,
            delivery_count: delivery.delivery_count,
            recorded_at: self.clock.now(),
        };

        match self.dead_letters.record(letter).await {
            Ok(()) => ConsumeOutcome::DeadLettered(reason),
            Err(e) => {
                warn!(delivery = delivery.id.0, error = %e, "dead letter write failed");
                ConsumeOutcome::Redeliver
            }
        }
    }

    /// Consume until `shutdown` flips to true (or its sender is dropped) or
    /// the source is closed and drained.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> ConsumerReport {
        let mut report = ConsumerReport::default();

        loop {
            if *shutdown.borrow() {
                break;
            }

            let received = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                received = self.source.receive() => received,
            };

            let delivery = match received {
                Ok(Some(delivery)) => delivery,
                Ok(None) => {
                    debug!("event source closed");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "receive failed");
                    self.pause(&mut shutdown).await;
                    continue;
                }
            };

            match self.process(delivery).await {
                Ok(outcome) => {
                    report.record(outcome);
                    if outcome == ConsumeOutcome::Redeliver {
                        self.pause(&mut shutdown).await;
                    }
                }
                // the broker redelivers anything we failed to settle
                Err(e) => warn!(error = %e, "failed to settle delivery"),
            }
        }

        report
    }

    async fn pause(&self, shutdown: &mut watch::Receiver<bool>) {
        tokio::select! {
            _ = tokio::time::sleep(self.config.redelivery_backoff) => {}
            _ = shutdown.changed() => {}
        }
    }
}

/// Group of consumer loops sharing one source.
/// - `request_shutdown()` で全ループが止まる（処理中の delivery は最後まで処理する）
/// - `join()` で全ループの終了を待てる
pub struct ConsumerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<ConsumerReport>>,
}

impl ConsumerGroup {
    /// Spawn `n` loops over the same consumer.
    pub fn spawn(n: usize, consumer: Arc<EventConsumer>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let joins = (0..n)
            .map(|_| {
                let consumer = Arc::clone(&consumer);
                let rx = shutdown_rx.clone();
                tokio::spawn(async move { consumer.run(rx).await })
            })
            .collect();

        info!(consumers = n, "consumer group started");
        Self { shutdown_tx, joins }
    }

    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for every loop to stop on its own (source closed).
    pub async fn join(self) -> ConsumerReport {
        let mut total = ConsumerReport::default();
        for join in self.joins {
            match join.await {
                Ok(report) => total += report,
                Err(e) => error!(error = %e, "consumer loop panicked"),
            }
        }
        // keep the sender alive until every loop has finished
        drop(self.shutdown_tx);
        total
    }

    pub async fn shutdown_and_join(self) -> ConsumerReport {
        self.request_shutdown();
        self.join().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::{DateTime, TimeZone, Utc};

    use crate::domain::{LaunchStatus, Transition};
    use crate::impls::{InMemoryDeadLetterQueue, InMemoryEventSource, InMemoryLaunchStore};
    use crate::ports::{FixedClock, LaunchStore, UlidGenerator};

    struct Fixture {
        source: Arc<InMemoryEventSource>,
        store: Arc<InMemoryLaunchStore>,
        dead_letters: Arc<InMemoryDeadLetterQueue>,
        consumer: Arc<EventConsumer>,
    }

    fn launch_date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 9, 30, 0).unwrap()
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap()));
        let source = Arc::new(InMemoryEventSource::new());
        let store = Arc::new(InMemoryLaunchStore::new(clock.clone()));
        let dead_letters = Arc::new(InMemoryDeadLetterQueue::new());
        let machine = Arc::new(LaunchStateMachine::new(
            store.clone(),
            Arc::new(UlidGenerator::new(clock.clone())),
            clock.clone(),
        ));
        let consumer = Arc::new(EventConsumer::new(
            source.clone(),
            machine,
            dead_letters.clone(),
            clock,
            ConsumerConfig {
                redelivery_backoff: Duration::from_millis(5),
            },
        ));
        Fixture {
            source,
            store,
            dead_letters,
            consumer,
        }
    }

    fn event(trace: &str, transition: Transition) -> LaunchEvent {
        LaunchEvent::new(trace, "acme", launch_date(), transition)
    }

    async fn next(f: &Fixture) -> Delivery {
        f.source.receive().await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn applied_event_is_acked() {
        let f = fixture();
        f.source.push_event(&event("T1", Transition::PreFlightPassed)).await.unwrap();

        let outcome = f.consumer.process(next(&f).await).await.unwrap();
        assert_eq!(outcome, ConsumeOutcome::Applied);
        assert_eq!(f.source.outstanding().await, 0);
        assert!(f.store.find_by_trace("T1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn malformed_payload_is_dead_lettered_and_acked() {
        let f = fixture();
        f.source.push("{not json").await;

        let outcome = f.consumer.process(next(&f).await).await.unwrap();
        assert_eq!(outcome, ConsumeOutcome::DeadLettered(DeadLetterReason::Malformed));
        assert_eq!(f.source.outstanding().await, 0);

        let letters = f.dead_letters.entries().await;
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].payload, "{not json");
        assert_eq!(letters[0].trace_id, None);
        assert_eq!(f.dead_letters.count(DeadLetterReason::Malformed).await, 1);
        assert_eq!(f.dead_letters.count(DeadLetterReason::Rejected).await, 0);
    }

    #[tokio::test]
    async fn rejected_transition_is_dead_lettered_with_context() {
        let f = fixture();
        f.source.push_event(&event("T1", Transition::StartCountdown)).await.unwrap();

        let outcome = f.consumer.process(next(&f).await).await.unwrap();
        assert_eq!(outcome, ConsumeOutcome::DeadLettered(DeadLetterReason::Rejected));

        let letters = f.dead_letters.entries().await;
        assert_eq!(letters[0].trace_id.as_deref(), Some("T1"));
        assert!(letters[0].error.contains("start_countdown"));
        assert_eq!(f.dead_letters.count(DeadLetterReason::Rejected).await, 1);
        assert!(f.store.is_empty().await);
    }

    #[tokio::test]
    async fn store_outage_nacks_and_redelivers() {
        let f = fixture();
        f.source.push_event(&event("T1", Transition::PreFlightPassed)).await.unwrap();

        f.store.set_unavailable(true);
        let outcome = f.consumer.process(next(&f).await).await.unwrap();
        assert_eq!(outcome, ConsumeOutcome::Redeliver);
        assert_eq!(f.source.acked().await, 0);

        f.store.set_unavailable(false);
        let again = next(&f).await;
        assert_eq!(again.delivery_count, 2);
        assert_eq!(f.consumer.process(again).await.unwrap(), ConsumeOutcome::Applied);
        assert!(f.dead_letters.is_empty().await);
    }

    #[tokio::test]
    async fn dead_letter_outage_nacks() {
        let f = fixture();
        f.source.push("garbage").await;
        f.dead_letters.set_unavailable(true);

        let outcome = f.consumer.process(next(&f).await).await.unwrap();
        assert_eq!(outcome, ConsumeOutcome::Redeliver);
        assert_eq!(f.source.outstanding().await, 1);
    }

    #[tokio::test]
    async fn group_applies_each_event_once_despite_duplicates() {
        let f = fixture();
        let script = [
            event("T1", Transition::PreFlightPassed),
            event("T2", Transition::StartCountdown),
            event("T3", Transition::CompleteCountdown),
        ];
        // publish in order, then the whole stream again (broker redelivery)
        for e in script.iter().chain(script.iter()) {
            f.source.push_event(e).await.unwrap();
        }
        f.source.close().await;

        let report = ConsumerGroup::spawn(1, f.consumer.clone()).join().await;
        assert_eq!(report.applied, 6);
        assert_eq!(report.dead_lettered, 0);

        let record = f.store.find_by_trace("T3").await.unwrap().unwrap();
        assert_eq!(record.status, LaunchStatus::Launched);
        assert_eq!(record.version, 3);
    }

    #[tokio::test]
    async fn out_of_order_delivery_is_rejected_not_lost() {
        let f = fixture();
        // countdown arrives before pre-flight; the rejection is parked for operators
        f.source.push_event(&event("T2", Transition::StartCountdown)).await.unwrap();
        f.source.push_event(&event("T1", Transition::PreFlightPassed)).await.unwrap();
        f.source.close().await;

        let report = ConsumerGroup::spawn(2, f.consumer.clone()).join().await;
        assert_eq!(report.applied + report.dead_lettered, 2);
        assert_eq!(f.source.outstanding().await, 0);
    }

    #[tokio::test]
    async fn shutdown_stops_idle_loops() {
        let f = fixture();
        let group = ConsumerGroup::spawn(3, f.consumer.clone());
        tokio::time::sleep(Duration::from_millis(20)).await;

        let report = tokio::time::timeout(Duration::from_secs(1), group.shutdown_and_join())
            .await
            .expect("loops should stop on shutdown");
        assert_eq!(report, ConsumerReport::default());
    }
}
