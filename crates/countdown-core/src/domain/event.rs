//! Inbound launch lifecycle events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::launch::LaunchKey;
use super::transition::Transition;

/// A decoded, validated lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchEvent {
    pub trace_id: String,
    pub customer_id: String,
    pub launch_date: DateTime<Utc>,
    pub transition: Transition,

    /// Free-form metadata; carried through for audit, not interpreted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Why a broker payload could not become a `LaunchEvent`.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("payload is not a valid launch event: {0}")]
    Json(#[from] serde_json::Error),

    #[error("required field `{0}` is blank")]
    Blank(&'static str),
}

impl LaunchEvent {
    pub fn new(
        trace_id: impl Into<String>,
        customer_id: impl Into<String>,
        launch_date: DateTime<Utc>,
        transition: Transition,
    ) -> Self {
        Self {
            trace_id: trace_id.into(),
            customer_id: customer_id.into(),
            launch_date,
            transition,
            metadata: None,
        }
    }

    /// Decode a broker payload (JSON, ISO-8601 `launch_date`).
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let event: LaunchEvent = serde_json::from_slice(payload)?;
        event.validate()?;
        Ok(event)
    }

    pub fn validate(&self) -> Result<(), DecodeError> {
        if self.trace_id.trim().is_empty() {
            return Err(DecodeError::Blank("trace_id"));
        }
        if self.customer_id.trim().is_empty() {
            return Err(DecodeError::Blank("customer_id"));
        }
        Ok(())
    }

    pub fn launch_key(&self) -> LaunchKey {
        LaunchKey {
            customer_id: self.customer_id.clone(),
            launch_date: self.launch_date,
        }
    }
}
