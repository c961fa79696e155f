//! Domain model: identifiers, launch records, transitions, jobs, errors.
//!
//! Nothing in here does I/O; storage and broker access live behind `ports`.

pub mod errors;
pub mod event;
pub mod ids;
pub mod job;
pub mod launch;
pub mod transition;

pub use self::errors::{ErrorKind, StoreError};
pub use self::event::{DecodeError, LaunchEvent};
pub use self::ids::{JobId, LaunchId};
pub use self::job::{JobState, JobStatusView, ScheduledJob};
pub use self::launch::{
    CountdownStatus, LaunchKey, LaunchRecord, LaunchStatus, PreFlightStatus, UndefinedStatus,
    derive_status,
};
pub use self::transition::{Phase, Step, Transition, evaluate};
