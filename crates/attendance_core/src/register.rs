//! crates/attendance_core/src/register.rs
//!
//! Validates scan submissions against the active session and keeps the
//! de-duplicated set of attendance records.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::classify::{AlwaysConfirm, StatusClassifier, SubmissionSignals};
use crate::domain::{AttendanceRecord, NewAttendance, Submission};
use crate::error::{AttendanceError, AttendanceResult};
use crate::ports::AttendanceStore;
use crate::session_manager::SessionManager;

#[derive(Clone)]
pub struct AttendanceRegister {
    sessions: SessionManager,
    store: Arc<dyn AttendanceStore>,
    classifier: Arc<dyn StatusClassifier>,
}

impl AttendanceRegister {
    pub fn new(sessions: SessionManager, store: Arc<dyn AttendanceStore>) -> Self {
        Self {
            sessions,
            store,
            classifier: Arc::new(AlwaysConfirm),
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn StatusClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Records one student's attendance for the session `submission.token`
    /// currently unlocks.
    ///
    /// The lookup of an existing record is only an early exit; the store's
    /// uniqueness constraint on (session, roll number) decides races, and a
    /// violation surfaces as `DuplicateSubmission` as well.
    pub async fn submit(&self, submission: Submission) -> AttendanceResult<AttendanceRecord> {
        let token = submission.token.trim();
        let student_name = submission.student_name.trim();
        let roll_number = submission.roll_number.trim();
        let selfie_url = submission
            .selfie_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string);

        if student_name.is_empty() {
            return Err(AttendanceError::InvalidSubmission(
                "student name is required".to_string(),
            ));
        }
        if roll_number.is_empty() {
            return Err(AttendanceError::InvalidSubmission(
                "roll number is required".to_string(),
            ));
        }
        if token.is_empty() {
            return Err(AttendanceError::InvalidToken);
        }

        let session = self
            .sessions
            .session_for_token(token)
            .await?
            .ok_or(AttendanceError::InvalidToken)?;

        if self
            .store
            .find_attendance(session.id, roll_number)
            .await?
            .is_some()
        {
            debug!(
                "Duplicate submission for {} in session {}",
                roll_number, session.id
            );
            return Err(AttendanceError::DuplicateSubmission);
        }

        let received_at = Utc::now();
        let status = self.classifier.classify(&SubmissionSignals {
            received_at,
            token_age: session.token_age(received_at),
            has_selfie: selfie_url.is_some(),
        });

        let record = self
            .store
            .insert_attendance(NewAttendance {
                id: Uuid::new_v4(),
                session_id: session.id,
                student_name: student_name.to_string(),
                roll_number: roll_number.to_string(),
                selfie_url,
                status,
                created_at: received_at,
            })
            .await?;

        info!(
            "Attendance recorded for {} in session {} ({})",
            record.roll_number, record.session_id, record.status
        );
        Ok(record)
    }

    /// Every record of a session in insertion order; what a reconnecting
    /// dashboard re-fetches.
    pub async fn records(&self, session_id: Uuid) -> AttendanceResult<Vec<AttendanceRecord>> {
        self.sessions.session(session_id).await?;
        Ok(self.store.list_attendance(session_id).await?)
    }

    /// A student's records across all sessions, newest first.
    pub async fn history(&self, roll_number: &str) -> AttendanceResult<Vec<AttendanceRecord>> {
        let roll_number = roll_number.trim();
        if roll_number.is_empty() {
            return Err(AttendanceError::InvalidSubmission(
                "roll number is required".to_string(),
            ));
        }
        Ok(self.store.list_attendance_for_student(roll_number).await?)
    }
}
