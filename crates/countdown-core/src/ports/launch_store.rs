//! LaunchStore port - the event store behind the launch state machine.
//!
//! Shape of the `rocket_launches` table: primary key `id`, indexed
//! `customer_id`, `launch_date` and `trace_id`, and an `updated_at` that is
//! stamped on every mutation (see `schema/rocket_launches.sql`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{LaunchId, LaunchKey, LaunchRecord, StoreError};

/// Position after the last record a reader consumed.
///
/// Scans are ordered by `(launch_date, id)`, so this is enough to resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageCursor {
    pub launch_date: DateTime<Utc>,
    pub id: LaunchId,
}

impl PageCursor {
    pub fn of(record: &LaunchRecord) -> Self {
        Self {
            launch_date: record.launch_date,
            id: record.id,
        }
    }
}

/// Read filter for scans.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchFilter {
    /// Half-open `[start, end)` on `launch_date`.
    pub period: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub customer_id: Option<String>,
}

impl LaunchFilter {
    pub fn period(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            period: Some((start, end)),
            customer_id: None,
        }
    }

    pub fn with_customer(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    pub fn matches(&self, record: &LaunchRecord) -> bool {
        let in_period = self
            .period
            .is_none_or(|(start, end)| record.launch_date >= start && record.launch_date < end);
        let for_customer = self
            .customer_id
            .as_deref()
            .is_none_or(|c| record.customer_id == c);
        in_period && for_customer
    }
}

/// Durable table of launch records.
///
/// Writes are conditional so that concurrent appliers serialize per record
/// without a global lock:
/// - `insert` fails with `Conflict` if the launch key or trace id already exists.
/// - `update` fails with `Conflict` unless the stored version equals `expected_version`.
///
/// Both also index `trace_id` so redeliveries are recognised by `find_by_trace`.
#[async_trait]
pub trait LaunchStore: Send + Sync {
    /// Record that owns an already-applied trace id.
    async fn find_by_trace(&self, trace_id: &str) -> Result<Option<LaunchRecord>, StoreError>;

    async fn find_by_key(&self, key: &LaunchKey) -> Result<Option<LaunchRecord>, StoreError>;

    /// Insert a new record. Returns the stored row (version 1).
    async fn insert(&self, record: LaunchRecord, trace_id: &str) -> Result<LaunchRecord, StoreError>;

    /// Compare-and-update. Returns the stored row (version bumped by one).
    async fn update(
        &self,
        record: LaunchRecord,
        expected_version: u64,
        trace_id: &str,
    ) -> Result<LaunchRecord, StoreError>;

    /// Mark `trace_id` as applied to launch `id` without touching the record:
    /// no version bump, `updated_at` unchanged. `Conflict` if another launch
    /// owns the trace or the launch does not exist.
    async fn attach_trace(&self, id: LaunchId, trace_id: &str) -> Result<(), StoreError>;

    /// Up to `limit` records matching `filter`, ordered by `(launch_date, id)`,
    /// strictly after `after` when given.
    async fn scan(
        &self,
        filter: &LaunchFilter,
        after: Option<PageCursor>,
        limit: usize,
    ) -> Result<Vec<LaunchRecord>, StoreError>;
}
