//! InMemoryLaunchStore - 開発用・テスト用の LaunchStore
//!
//! # 実装詳細
//! - `records`: id → LaunchRecord（正本）
//! - `by_key`: (customer_id, launch_date) → id
//! - `by_trace`: 適用済み trace_id → id（再配送の検出用）
//! - `order`: (launch_date, id) の BTreeSet（scan の並び順と cursor 再開用）
//!
//! `updated_at` は書き込みのたびに Clock から打刻する（DB の trigger 相当）。

use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{LaunchId, LaunchKey, LaunchRecord, StoreError};
use crate::ports::{Clock, LaunchFilter, LaunchStore, PageCursor};

#[derive(Default)]
struct LaunchTable {
    records: HashMap<LaunchId, LaunchRecord>,
    by_key: HashMap<LaunchKey, LaunchId>,
    by_trace: HashMap<String, LaunchId>,
    order: BTreeSet<(DateTime<Utc>, LaunchId)>,
}

pub struct InMemoryLaunchStore {
    table: Mutex<LaunchTable>,
    clock: Arc<dyn Clock>,
    unavailable: AtomicBool,
}

impl InMemoryLaunchStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            table: Mutex::new(LaunchTable::default()),
            clock,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Simulate an outage: every call fails with `StoreError::Unavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Overwrite a stored row without any checks (tests use this to plant corrupt rows).
    pub async fn force_put(&self, record: LaunchRecord) {
        let mut table = self.table.lock().await;
        table.by_key.insert(record.key(), record.id);
        table.order.insert((record.launch_date, record.id));
        table.records.insert(record.id, record);
    }

    pub async fn len(&self) -> usize {
        self.table.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("launch store offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl LaunchStore for InMemoryLaunchStore {
    async fn find_by_trace(&self, trace_id: &str) -> Result<Option<LaunchRecord>, StoreError> {
        self.check_available()?;
        let table = self.table.lock().await;
        Ok(table
            .by_trace
            .get(trace_id)
            .and_then(|id| table.records.get(id))
            .cloned())
    }

    async fn find_by_key(&self, key: &LaunchKey) -> Result<Option<LaunchRecord>, StoreError> {
        self.check_available()?;
        let table = self.table.lock().await;
        Ok(table
            .by_key
            .get(key)
            .and_then(|id| table.records.get(id))
            .cloned())
    }

    async fn insert(&self, mut record: LaunchRecord, trace_id: &str) -> Result<LaunchRecord, StoreError> {
        self.check_available()?;
        let mut table = self.table.lock().await;

        let key = record.key();
        if table.by_key.contains_key(&key) {
            return Err(StoreError::Conflict(format!("launch {key} already exists")));
        }
        if table.by_trace.contains_key(trace_id) || table.records.contains_key(&record.id) {
            return Err(StoreError::Conflict(format!("trace {trace_id} already applied")));
        }

        record.version = 1;
        record.updated_at = self.clock.now();

        table.by_key.insert(key, record.id);
        table.by_trace.insert(trace_id.to_string(), record.id);
        table.order.insert((record.launch_date, record.id));
        table.records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        mut record: LaunchRecord,
        expected_version: u64,
        trace_id: &str,
    ) -> Result<LaunchRecord, StoreError> {
        self.check_available()?;
        let mut table = self.table.lock().await;

        let Some(current) = table.records.get(&record.id) else {
            return Err(StoreError::Conflict(format!("launch {} does not exist", record.id)));
        };
        if current.version != expected_version {
            return Err(StoreError::Conflict(format!(
                "launch {} is at version {}, expected {}",
                record.id, current.version, expected_version
            )));
        }
        if current.key() != record.key() {
            return Err(StoreError::Corrupt(format!(
                "launch {} cannot change its key",
                record.id
            )));
        }
        if table.by_trace.contains_key(trace_id) {
            return Err(StoreError::Conflict(format!("trace {trace_id} already applied")));
        }

        record.version = expected_version + 1;
        record.updated_at = self.clock.now();

        table.by_trace.insert(trace_id.to_string(), record.id);
        table.records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn attach_trace(&self, id: LaunchId, trace_id: &str) -> Result<(), StoreError> {
        self.check_available()?;
        let mut table = self.table.lock().await;

        if !table.records.contains_key(&id) {
            return Err(StoreError::Conflict(format!("launch {id} does not exist")));
        }
        match table.by_trace.get(trace_id) {
            Some(owner) if *owner == id => Ok(()),
            Some(_) => Err(StoreError::Conflict(format!("trace {trace_id} already applied"))),
            None => {
                table.by_trace.insert(trace_id.to_string(), id);
                Ok(())
            }
        }
    }

    async fn scan(
        &self,
        filter: &LaunchFilter,
        after: Option<PageCursor>,
        limit: usize,
    ) -> Result<Vec<LaunchRecord>, StoreError> {
        self.check_available()?;
        let table = self.table.lock().await;

        let lower = match after {
            Some(cursor) => Bound::Excluded((cursor.launch_date, cursor.id)),
            None => Bound::Unbounded,
        };

        Ok(table
            .order
            .range((lower, Bound::Unbounded))
            .filter_map(|(_, id)| table.records.get(id))
            .filter(|record| filter.matches(record))
            .take(limit)
            .cloned()
            .collect())
    }
}
