//! ReportEngine - read-only queries over launch records.
//!
//! Period queries are streamed page by page from the store, so callers can
//! walk arbitrarily large periods and resume from a [`PageCursor`].

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde::Serialize;

use crate::config::ReportConfig;
use crate::domain::{LaunchRecord, LaunchStatus, StoreError};
use crate::ports::{Clock, LaunchFilter, LaunchStore, PageCursor};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReportError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type LaunchStream = BoxStream<'static, Result<LaunchRecord, ReportError>>;

/// Aggregate counts over a set of launches.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaunchStatistics {
    pub total: usize,
    /// Every status is present, zero when unused.
    pub by_status: BTreeMap<LaunchStatus, usize>,
    /// LAUNCHED / total, in percent. 0.0 when there are no launches.
    pub success_rate: f64,
}

impl LaunchStatistics {
    fn empty() -> Self {
        Self {
            total: 0,
            by_status: LaunchStatus::ALL.iter().map(|s| (*s, 0)).collect(),
            success_rate: 0.0,
        }
    }

    fn add(&mut self, record: &LaunchRecord) {
        self.total += 1;
        *self.by_status.entry(record.status).or_default() += 1;
    }

    fn finish(mut self) -> Self {
        let launched = self.by_status.get(&LaunchStatus::Launched).copied().unwrap_or(0);
        self.success_rate = percent(launched, self.total);
        self
    }
}

/// Per-customer summary for a period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaunchReport {
    pub customer_id: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub total_launches: usize,
    pub successful_launches: usize,
    /// FAILED or ABORTED.
    pub failed_launches: usize,
    /// Mean of `launch_date - created_at`, in seconds.
    pub average_lead_time_secs: f64,
    pub launches: Vec<LaunchRecord>,
}

pub struct ReportEngine {
    store: Arc<dyn LaunchStore>,
    clock: Arc<dyn Clock>,
    config: ReportConfig,
}

struct Paging {
    after: Option<PageCursor>,
    exhausted: bool,
}

impl ReportEngine {
    pub fn new(store: Arc<dyn LaunchStore>, clock: Arc<dyn Clock>, config: ReportConfig) -> Self {
        Self { store, clock, config }
    }

    /// Launches with `launch_date` in `[start, end)`, ordered by `(launch_date, id)`.
    pub fn query_by_period(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> LaunchStream {
        self.scan(LaunchFilter::period(start, end), None)
    }

    /// Resume a period query after the last record a caller consumed.
    pub fn query_by_period_after(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cursor: PageCursor,
    ) -> LaunchStream {
        self.scan(LaunchFilter::period(start, end), Some(cursor))
    }

    /// Statistics over the configured trailing window, or the whole store.
    pub async fn statistics(&self) -> Result<LaunchStatistics, ReportError> {
        let filter = match self.config.stats_window {
            Some(window) => {
                let now = self.clock.now();
                LaunchFilter::period(now - window, now)
            }
            None => LaunchFilter::default(),
        };
        self.summarize(filter).await
    }

    pub async fn statistics_for_period(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<LaunchStatistics, ReportError> {
        self.summarize(LaunchFilter::period(start, end)).await
    }

    pub async fn customer_report(
        &self,
        customer_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<LaunchReport, ReportError> {
        let launches: Vec<LaunchRecord> = self
            .scan(LaunchFilter::period(start, end).with_customer(customer_id), None)
            .try_collect()
            .await?;

        let successful_launches = launches
            .iter()
            .filter(|r| r.status == LaunchStatus::Launched)
            .count();
        let failed_launches = launches
            .iter()
            .filter(|r| matches!(r.status, LaunchStatus::Failed | LaunchStatus::Aborted))
            .count();

        let average_lead_time_secs = if launches.is_empty() {
            0.0
        } else {
            let total_ms: i64 = launches
                .iter()
                .map(|r| (r.launch_date - r.created_at).num_milliseconds())
                .sum();
            total_ms as f64 / 1000.0 / launches.len() as f64
        };

        Ok(LaunchReport {
            customer_id: customer_id.to_string(),
            period_start: start,
            period_end: end,
            total_launches: launches.len(),
            successful_launches,
            failed_launches,
            average_lead_time_secs,
            launches,
        })
    }

    async fn summarize(&self, filter: LaunchFilter) -> Result<LaunchStatistics, ReportError> {
        let stats = self
            .scan(filter, None)
            .try_fold(LaunchStatistics::empty(), |mut stats, record| async move {
                stats.add(&record);
                Ok(stats)
            })
            .await?;
        Ok(stats.finish())
    }

    fn scan(&self, filter: LaunchFilter, after: Option<PageCursor>) -> LaunchStream {
        if let Some((start, end)) = filter.period
            && start >= end
        {
            return stream::empty().boxed();
        }

        let store = Arc::clone(&self.store);
        let page_size = self.config.page_size.max(1);
        let start = Paging {
            after,
            exhausted: false,
        };

        stream::try_unfold(start, move |paging| {
            let store = Arc::clone(&store);
            let filter = filter.clone();
            async move {
                if paging.exhausted {
                    return Ok::<_, ReportError>(None);
                }
                let page = store.scan(&filter, paging.after, page_size).await?;
                let Some(last) = page.last() else {
                    return Ok(None);
                };
                let next = Paging {
                    after: Some(PageCursor::of(last)),
                    exhausted: page.len() < page_size,
                };
                Ok(Some((stream::iter(page.into_iter().map(Ok::<_, ReportError>)), next)))
            }
        })
        .try_flatten()
        .boxed()
    }
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}
