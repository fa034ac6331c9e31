use std::fmt;
use thiserror::Error;

/// Which kind of bad event made up an incomplete-data streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncompleteKind {
    /// The selected channel was absent from the event.
    NoChannel,
    /// The channel was present but at least one axis was null.
    MissingAxis,
}

impl fmt::Display for IncompleteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IncompleteKind::NoChannel => write!(f, "returned no data"),
            IncompleteKind::MissingAxis => write!(f, "returned incomplete data"),
        }
    }
}

/// Sensor acquisition error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AcquisitionError {
    #[error("Accelerometer is not available on this platform")]
    NoSensorSupport,

    #[error("Accelerometer returned no data after {waited_ms} ms")]
    NoDataTimeout { waited_ms: u64 },

    #[error("Accelerometer {kind} {count} times in a row")]
    IncompleteDataStreak { count: u32, kind: IncompleteKind },

    #[error("No subscriber registered before start")]
    NotSubscribed,

    #[error("Sensor source failed: {0}")]
    SourceFailed(String),
}

impl AcquisitionError {
    /// Whether a fresh `start()` can reasonably succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            AcquisitionError::NoDataTimeout { .. }
            | AcquisitionError::IncompleteDataStreak { .. }
            | AcquisitionError::SourceFailed(_) => true,
            AcquisitionError::NoSensorSupport | AcquisitionError::NotSubscribed => false,
        }
    }
}

/// Result type for acquisition operations
pub type AcqResult<T> = Result<T, AcquisitionError>;
