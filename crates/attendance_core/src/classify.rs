//! crates/attendance_core/src/classify.rs
//!
//! Hook point for deriving an attendance record's status from submission signals.

use chrono::{DateTime, Duration, Utc};

use crate::domain::AttendanceStatus;

/// What is known about a submission at the moment it passes validation.
#[derive(Debug, Clone)]
pub struct SubmissionSignals {
    pub received_at: DateTime<Utc>,
    /// Time since the token the student presented was issued.
    pub token_age: Duration,
    pub has_selfie: bool,
}

pub trait StatusClassifier: Send + Sync {
    fn classify(&self, signals: &SubmissionSignals) -> AttendanceStatus;
}

/// Every valid submission is confirmed.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysConfirm;

impl StatusClassifier for AlwaysConfirm {
    fn classify(&self, _signals: &SubmissionSignals) -> AttendanceStatus {
        AttendanceStatus::Confirmed
    }
}

/// Submissions without a selfie reference go to manual review.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelfieRequired;

impl StatusClassifier for SelfieRequired {
    fn classify(&self, signals: &SubmissionSignals) -> AttendanceStatus {
        if signals.has_selfie {
            AttendanceStatus::Confirmed
        } else {
            AttendanceStatus::NeedsReview
        }
    }
}
