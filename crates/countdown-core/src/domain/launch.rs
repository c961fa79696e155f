//! Launch record and its status model.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::LaunchId;
use super::transition::Phase;

/// Outcome of the pre-flight checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PreFlightStatus {
    Pending,
    Passed,
    Failed,
}

/// Progress of the countdown.
///
/// `Aborted` and `Completed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CountdownStatus {
    NotStarted,
    InProgress,
    Aborted,
    Completed,
}

impl CountdownStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, CountdownStatus::Aborted | CountdownStatus::Completed)
    }
}

/// Overall launch status, persisted for query efficiency.
///
/// Always equal to `derive_status(pre_flight_status, countdown_status)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LaunchStatus {
    Scheduled,
    PreFlight,
    Countdown,
    Launched,
    Failed,
    Aborted,
}

impl LaunchStatus {
    pub const ALL: [LaunchStatus; 6] = [
        LaunchStatus::Scheduled,
        LaunchStatus::PreFlight,
        LaunchStatus::Countdown,
        LaunchStatus::Launched,
        LaunchStatus::Failed,
        LaunchStatus::Aborted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LaunchStatus::Scheduled => "SCHEDULED",
            LaunchStatus::PreFlight => "PRE_FLIGHT",
            LaunchStatus::Countdown => "COUNTDOWN",
            LaunchStatus::Launched => "LAUNCHED",
            LaunchStatus::Failed => "FAILED",
            LaunchStatus::Aborted => "ABORTED",
        }
    }
}

impl fmt::Display for LaunchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A (pre-flight, countdown) pair that maps to no overall status.
///
/// Seeing one of these in storage means persisted state has been corrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("undefined launch status for pre_flight={pre_flight:?}, countdown={countdown:?}")]
pub struct UndefinedStatus {
    pub pre_flight: PreFlightStatus,
    pub countdown: CountdownStatus,
}

/// Derive the overall status from the two sub-statuses.
pub fn derive_status(
    pre_flight: PreFlightStatus,
    countdown: CountdownStatus,
) -> Result<LaunchStatus, UndefinedStatus> {
    use CountdownStatus as C;
    use PreFlightStatus as P;

    match (pre_flight, countdown) {
        (P::Pending, C::NotStarted) => Ok(LaunchStatus::Scheduled),
        (P::Passed, C::NotStarted) => Ok(LaunchStatus::PreFlight),
        (P::Failed, C::NotStarted) => Ok(LaunchStatus::Failed),
        (P::Passed, C::InProgress) => Ok(LaunchStatus::Countdown),
        (P::Passed, C::Completed) => Ok(LaunchStatus::Launched),
        (P::Pending | P::Passed, C::Aborted) => Ok(LaunchStatus::Aborted),
        _ => Err(UndefinedStatus {
            pre_flight,
            countdown,
        }),
    }
}

/// Business key of a logical launch: the same customer launching at the
/// same instant is the same launch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LaunchKey {
    pub customer_id: String,
    pub launch_date: DateTime<Utc>,
}

impl fmt::Display for LaunchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.customer_id, self.launch_date.to_rfc3339())
    }
}

/// One row of the `rocket_launches` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchRecord {
    pub id: LaunchId,
    pub customer_id: String,
    pub launch_date: DateTime<Utc>,
    pub pre_flight_status: PreFlightStatus,
    pub countdown_status: CountdownStatus,
    pub status: LaunchStatus,

    /// Trace id of the event that created this record.
    pub trace_id: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Optimistic-concurrency counter, bumped by every durable write.
    pub version: u64,
}

impl LaunchRecord {
    /// A fresh record in SCHEDULED / PENDING / NOT_STARTED.
    ///
    /// `version` is 0 until the store accepts the insert.
    pub fn new(
        id: LaunchId,
        key: LaunchKey,
        trace_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            customer_id: key.customer_id,
            launch_date: key.launch_date,
            pre_flight_status: PreFlightStatus::Pending,
            countdown_status: CountdownStatus::NotStarted,
            status: LaunchStatus::Scheduled,
            trace_id: trace_id.into(),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn key(&self) -> LaunchKey {
        LaunchKey {
            customer_id: self.customer_id.clone(),
            launch_date: self.launch_date,
        }
    }

    pub fn phase(&self) -> Phase {
        Phase {
            pre_flight: self.pre_flight_status,
            countdown: self.countdown_status,
        }
    }

    /// Move to `phase`, re-deriving `status` from it.
    pub fn enter(&mut self, phase: Phase, now: DateTime<Utc>) -> Result<(), UndefinedStatus> {
        self.status = derive_status(phase.pre_flight, phase.countdown)?;
        self.pre_flight_status = phase.pre_flight;
        self.countdown_status = phase.countdown;
        self.updated_at = now;
        Ok(())
    }

    /// Check that the persisted `status` matches its sub-statuses.
    pub fn verify_status(&self) -> Result<(), UndefinedStatus> {
        let derived = derive_status(self.pre_flight_status, self.countdown_status)?;
        if derived == self.status {
            Ok(())
        } else {
            Err(UndefinedStatus {
                pre_flight: self.pre_flight_status,
                countdown: self.countdown_status,
            })
        }
    }
}
