//! LaunchStateMachine - applies lifecycle events to launch records.
//!
//! # フロー
//! 1. trace_id が適用済みなら、その record をそのまま返す（再配送）
//! 2. launch key で record を読む。なければ新規 record に遷移を適用して insert
//! 3. 保存済み status と sub-status の整合を確認（不整合は CorruptState）
//! 4. 遷移表を引く: 前進 / 既に到達済み（no-op） / 拒否
//! 5. version を条件に compare-and-update。競合したら読み直して再評価

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::{
    ErrorKind, LaunchEvent, LaunchId, LaunchRecord, Phase, Step, StoreError, Transition,
    UndefinedStatus, evaluate,
};
use crate::ports::{Clock, IdGenerator, LaunchStore};

/// Compare-and-update rounds before giving up with a transient conflict.
const MAX_CONFLICT_ROUNDS: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error("trace {trace_id}: {transition} is not allowed from {current}")]
    InvalidTransition {
        trace_id: String,
        transition: Transition,
        current: Phase,
    },

    #[error("launch {launch_id} is in an undefined state (trace {trace_id}): {source}")]
    CorruptState {
        launch_id: LaunchId,
        trace_id: String,
        #[source]
        source: UndefinedStatus,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApplyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApplyError::InvalidTransition { .. } => ErrorKind::Validation,
            ApplyError::CorruptState { .. } => ErrorKind::Fatal,
            ApplyError::Store(e) => e.kind(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

pub struct LaunchStateMachine {
    store: Arc<dyn LaunchStore>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl LaunchStateMachine {
    pub fn new(store: Arc<dyn LaunchStore>, ids: Arc<dyn IdGenerator>, clock: Arc<dyn Clock>) -> Self {
        Self { store, ids, clock }
    }

    /// Apply one event and return the resulting record.
    ///
    /// Idempotent per `trace_id`: applying the same event again returns the
    /// record it produced without writing.
    pub async fn apply(&self, event: &LaunchEvent) -> Result<LaunchRecord, ApplyError> {
        let mut last_conflict = String::new();

        for round in 1..=MAX_CONFLICT_ROUNDS {
            match self.try_apply(event).await {
                Err(ApplyError::Store(StoreError::Conflict(reason))) => {
                    debug!(trace_id = %event.trace_id, round, %reason, "write conflict, reloading");
                    last_conflict = reason;
                }
                other => return other,
            }
        }

        warn!(
            trace_id = %event.trace_id,
            rounds = MAX_CONFLICT_ROUNDS,
            "giving up after repeated write conflicts"
        );
        Err(ApplyError::Store(StoreError::Conflict(last_conflict)))
    }

    async fn try_apply(&self, event: &LaunchEvent) -> Result<LaunchRecord, ApplyError> {
        if let Some(owner) = self.store.find_by_trace(&event.trace_id).await? {
            debug!(trace_id = %event.trace_id, launch_id = %owner.id, "trace already applied");
            return Ok(owner);
        }

        let key = event.launch_key();
        let now = self.clock.now();

        let Some(current) = self.store.find_by_key(&key).await? else {
            let mut fresh = LaunchRecord::new(self.ids.generate_launch_id(), key, &event.trace_id, now);
            if let Some(phase) = self.next_phase(&fresh, event)? {
                fresh.enter(phase, now).map_err(|source| corrupt(&fresh, event, source))?;
            }
            let stored = self.store.insert(fresh, &event.trace_id).await?;
            info!(
                trace_id = %event.trace_id,
                launch_id = %stored.id,
                customer_id = %stored.customer_id,
                transition = %event.transition,
                status = %stored.status,
                "launch created"
            );
            return Ok(stored);
        };

        current
            .verify_status()
            .map_err(|source| corrupt(&current, event, source))?;

        let Some(phase) = self.next_phase(&current, event)? else {
            // remember the trace so a later redelivery is recognised
            self.store.attach_trace(current.id, &event.trace_id).await?;
            return Ok(current);
        };

        let expected_version = current.version;
        let from = current.status;
        let mut next = current;
        next.enter(phase, now).map_err(|source| corrupt(&next, event, source))?;

        let stored = self.store.update(next, expected_version, &event.trace_id).await?;
        info!(
            trace_id = %event.trace_id,
            launch_id = %stored.id,
            transition = %event.transition,
            from = %from,
            to = %stored.status,
            "launch advanced"
        );
        Ok(stored)
    }

    /// `Some(phase)` to advance, `None` when the record is already there.
    fn next_phase(&self, record: &LaunchRecord, event: &LaunchEvent) -> Result<Option<Phase>, ApplyError> {
        match evaluate(record.phase(), event.transition) {
            Step::Advance(phase) => Ok(Some(phase)),
            Step::AlreadyThere => {
                debug!(
                    trace_id = %event.trace_id,
                    launch_id = %record.id,
                    transition = %event.transition,
                    "already in target phase, nothing to write"
                );
                Ok(None)
            }
            Step::Rejected => Err(ApplyError::InvalidTransition {
                trace_id: event.trace_id.clone(),
                transition: event.transition,
                current: record.phase(),
            }),
        }
    }
}

fn corrupt(record: &LaunchRecord, event: &LaunchEvent, source: UndefinedStatus) -> ApplyError {
    ApplyError::CorruptState {
        launch_id: record.id,
        trace_id: event.trace_id.clone(),
        source,
    }
}
