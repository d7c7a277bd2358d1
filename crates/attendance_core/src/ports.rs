//! crates/attendance_core/src/ports.rs
//!
//! Defines the storage contracts (traits) the session and attendance logic runs on.
//! Every cross-request race (concurrent start, rotate, submit) is settled here,
//! by atomic conditional updates and uniqueness constraints, not by locks in
//! the callers.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{AttendanceRecord, NewAttendance, NewSession, Session};

//=========================================================================================
// Port Error and Result Types
//=========================================================================================

/// The storage-level uniqueness constraints the ports must enforce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueConstraint {
    /// `token` is unique among active sessions.
    ActiveToken,
    /// At most one active session per owner.
    ActiveOwner,
    /// At most one attendance record per (session id, roll number).
    AttendanceRoll,
}

/// A generic error type for all port operations.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Unique constraint violated: {0:?}")]
    UniqueViolation(UniqueConstraint),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Storage Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Deactivates the owner's active session (if any) and inserts `session` as
    /// active, as one atomic step.
    async fn activate_session(&self, session: NewSession) -> PortResult<Session>;

    /// Marks the session inactive if it is active. Returns the current row, or
    /// `None` when no session has this id.
    async fn deactivate_session(&self, session_id: Uuid) -> PortResult<Option<Session>>;

    /// Replaces the token of an *active* session. `None` when no active session
    /// has this id.
    async fn replace_token(&self, session_id: Uuid, token: &str) -> PortResult<Option<Session>>;

    async fn find_session(&self, session_id: Uuid) -> PortResult<Option<Session>>;

    async fn find_active_session(&self, owner: &str) -> PortResult<Option<Session>>;

    async fn find_active_by_token(&self, token: &str) -> PortResult<Option<Session>>;
}

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    /// Persists a record, assigning its `seq`, and emits it on the store's insert
    /// feed in the same atomic step. Fails with
    /// `UniqueViolation(AttendanceRoll)` for a second record of the same student
    /// in the same session.
    async fn insert_attendance(&self, record: NewAttendance) -> PortResult<AttendanceRecord>;

    async fn find_attendance(
        &self,
        session_id: Uuid,
        roll_number: &str,
    ) -> PortResult<Option<AttendanceRecord>>;

    /// All records of a session in insertion order.
    async fn list_attendance(&self, session_id: Uuid) -> PortResult<Vec<AttendanceRecord>>;

    /// A student's records across every session, newest first.
    async fn list_attendance_for_student(
        &self,
        roll_number: &str,
    ) -> PortResult<Vec<AttendanceRecord>>;
}
