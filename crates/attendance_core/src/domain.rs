//! crates/attendance_core/src/domain.rs
//!
//! Defines the pure, core data structures for class sessions and attendance.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A single class period. At most one session per `owner` is active at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: Uuid,
    /// The issuing teacher (or classroom); the scope of the one-active-session rule.
    pub owner: String,
    /// The current QR credential. Replaced in place on every rotation.
    pub token: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub token_issued_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    /// How long the current token has been live at `now`.
    pub fn token_age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.token_issued_at)
    }
}

/// Insert payload for a new, active session.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub id: Uuid,
    pub owner: String,
    pub token: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttendanceStatus {
    Confirmed,
    NeedsReview,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Confirmed => "confirmed",
            AttendanceStatus::NeedsReview => "needs-review",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown attendance status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for AttendanceStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmed" => Ok(AttendanceStatus::Confirmed),
            "needs-review" => Ok(AttendanceStatus::NeedsReview),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Proof that one student presented a valid token during an active session.
/// Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub session_id: Uuid,
    pub student_name: String,
    pub roll_number: String,
    pub selfie_url: Option<String>,
    pub status: AttendanceStatus,
    /// Storage-assigned, strictly increasing in insertion order.
    pub seq: i64,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for an attendance record. `seq` is assigned by the store.
#[derive(Debug, Clone)]
pub struct NewAttendance {
    pub id: Uuid,
    pub session_id: Uuid,
    pub student_name: String,
    pub roll_number: String,
    pub selfie_url: Option<String>,
    pub status: AttendanceStatus,
    pub created_at: DateTime<Utc>,
}

/// What a scanning client sends after decoding a QR code.
#[derive(Debug, Clone)]
pub struct Submission {
    pub token: String,
    pub student_name: String,
    pub roll_number: String,
    pub selfie_url: Option<String>,
}

impl Submission {
    pub fn new(
        token: impl Into<String>,
        student_name: impl Into<String>,
        roll_number: impl Into<String>,
    ) -> Self {
        Self {
            token: token.into(),
            student_name: student_name.into(),
            roll_number: roll_number.into(),
            selfie_url: None,
        }
    }

    pub fn with_selfie(mut self, selfie_url: impl Into<String>) -> Self {
        self.selfie_url = Some(selfie_url.into());
        self
    }
}
