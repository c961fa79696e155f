//! DeadLetterSink port - where the consumer parks events it will not retry.
//!
//! Entries are for operators: enough context (trace id, attempted transition,
//! current phase, error text) to diagnose without replaying the stream.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::StoreError;

/// Why an event was parked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterReason {
    /// Payload could not be decoded.
    Malformed,

    /// Decoded fine, but the transition is illegal for the launch's current phase.
    Rejected,

    /// The target record's persisted state is inconsistent.
    Corrupt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub reason: DeadLetterReason,

    /// Raw payload as delivered (lossy UTF-8 for display).
    pub payload: String,

    pub trace_id: Option<String>,
    pub error: String,
    pub delivery_count: u32,
    pub recorded_at: DateTime<Utc>,
}

#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn record(&self, letter: DeadLetter) -> Result<(), StoreError>;
}
