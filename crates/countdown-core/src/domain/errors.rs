//! Error classification shared by the launch and job pipelines.

/// Operational class of an error.
///
/// - Transient: storage or broker unavailable; retry or redeliver.
/// - Validation: bad input or an illegal transition; record it and move on.
/// - Fatal: persisted invariants are broken; stop work on that record and alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Validation,
    Fatal,
}

/// Errors raised by storage adapters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not be reached or timed out.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A conditional write lost a race (stale version, duplicate key).
    #[error("write conflict: {0}")]
    Conflict(String),

    /// Stored data violates an invariant the store itself enforces.
    #[error("corrupt stored data: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Unavailable(_) | StoreError::Conflict(_) => ErrorKind::Transient,
            StoreError::Corrupt(_) => ErrorKind::Fatal,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}
