//! HandlerRegistry - event_type → JobHandler
//!
//! # 方針
//! - 起動時に組み立てる（mutable）
//! - 実行中は読むだけ（Arc で共有、lock 不要）

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use crate::domain::{JobId, ScheduledJob};

/// Error a handler reports for a failed attempt. Any error counts toward the
/// job's retry budget.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(format!("invalid job metadata: {e}"))
    }
}

/// What a handler sees of the job it runs.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: JobId,
    pub event_type: String,
    /// 1 for the initial attempt.
    pub attempt: u32,
    pub scheduled_time: DateTime<Utc>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl JobContext {
    pub(crate) fn for_attempt(job: &ScheduledJob, attempt: u32) -> Self {
        Self {
            job_id: job.id,
            event_type: job.event_type.clone(),
            attempt,
            scheduled_time: job.scheduled_time,
            metadata: job.metadata.clone(),
        }
    }

    /// Decode the job metadata into a typed payload.
    pub fn metadata_as<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        let value = serde_json::Value::Object(self.metadata.clone());
        Ok(serde_json::from_value(value)?)
    }
}

/// Executes jobs of one event type.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &JobContext) -> Result<(), HandlerError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("handler for event type '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("event type must not be blank")]
    BlankEventType,
}

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        event_type: impl Into<String>,
        handler: Arc<dyn JobHandler>,
    ) -> Result<(), RegistryError> {
        let event_type = event_type.into();
        if event_type.trim().is_empty() {
            return Err(RegistryError::BlankEventType);
        }
        if self.handlers.contains_key(&event_type) {
            return Err(RegistryError::AlreadyRegistered(event_type));
        }
        self.handlers.insert(event_type, handler);
        Ok(())
    }

    pub fn get(&self, event_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(event_type).cloned()
    }

    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<_> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
