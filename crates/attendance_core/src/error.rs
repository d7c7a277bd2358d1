//! crates/attendance_core/src/error.rs
//!
//! The error taxonomy returned to callers of the session manager and the
//! attendance register.

use tracing::error;
use uuid::Uuid;

use crate::ports::{PortError, UniqueConstraint};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttendanceError {
    /// No active session carries the presented token.
    #[error("Invalid or expired QR code. Please scan again.")]
    InvalidToken,

    /// The student is already recorded for this session.
    #[error("You have already marked attendance for this class.")]
    DuplicateSubmission,

    #[error("Session {0} not found")]
    NotFound(Uuid),

    /// The operation needs an active session and this one has ended.
    #[error("Session {0} is not active")]
    InvalidState(Uuid),

    #[error("Invalid submission: {0}")]
    InvalidSubmission(String),

    /// Storage was unreachable or rejected the write for another reason.
    #[error("Storage failure: {0}")]
    StorageFailure(String),
}

impl AttendanceError {
    /// Only storage failures are worth retrying with the same input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AttendanceError::StorageFailure(_))
    }
}

impl From<PortError> for AttendanceError {
    fn from(e: PortError) -> Self {
        match e {
            PortError::UniqueViolation(UniqueConstraint::AttendanceRoll) => {
                AttendanceError::DuplicateSubmission
            }
            other => {
                error!("Storage operation failed: {}", other);
                AttendanceError::StorageFailure(other.to_string())
            }
        }
    }
}

pub type AttendanceResult<T> = Result<T, AttendanceError>;
