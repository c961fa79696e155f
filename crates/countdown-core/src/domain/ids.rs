//! Domain identifiers (strongly-typed IDs).
//!
//! Every identifier is a ULID wrapped in `Id<T>`, where `T` is a zero-sized
//! marker type. ULIDs sort by creation time, which gives the scheduler a stable
//! tie-breaker when two jobs become due at the same instant.
//!
//! `LaunchId` and `JobId` share one implementation but cannot be mixed up:
//! the marker only exists at compile time (`PhantomData`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// Marker trait for each ID kind.
///
/// Provides the prefix used by `Display` ("launch-", "job-").
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// Generic ULID-backed identifier.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Marker for launch records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Launch {}

impl IdMarker for Launch {
    fn prefix() -> &'static str {
        "launch-"
    }
}

/// Marker for scheduled jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Job {}

impl IdMarker for Job {
    fn prefix() -> &'static str {
        "job-"
    }
}

/// Surrogate key of a `LaunchRecord`, assigned on first insert.
pub type LaunchId = Id<Launch>;

/// Identifier of a `ScheduledJob`.
pub type JobId = Id<Job>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_their_prefix() {
        let launch = LaunchId::from_ulid(Ulid::new());
        let job = JobId::from_ulid(Ulid::new());

        assert!(launch.to_string().starts_with("launch-"));
        assert!(job.to_string().starts_with("job-"));

        // let _: JobId = launch; // <- does not compile
    }

    #[test]
    fn ulid_ids_are_sortable() {
        let id1 = JobId::from_ulid(Ulid::new());
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = JobId::from_ulid(Ulid::new());

        assert!(id1 < id2);
    }

    #[test]
    fn ulid_ids_can_be_serialized() {
        let job_id = JobId::from_ulid(Ulid::new());

        let serialized = serde_json::to_string(&job_id).unwrap();
        let deserialized: JobId = serde_json::from_str(&serialized).unwrap();

        assert_eq!(job_id, deserialized);
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        use std::mem::size_of;

        assert_eq!(size_of::<JobId>(), size_of::<Ulid>());
        assert_eq!(size_of::<LaunchId>(), 16);
    }
}
