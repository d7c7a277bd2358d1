//! crates/attendance_core/src/memory.rs
//!
//! An in-memory implementation of the storage ports. It enforces the same
//! uniqueness constraints a database would, which makes it the store for tests
//! and for running the service without PostgreSQL.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{AttendanceRecord, NewAttendance, NewSession, Session};
use crate::notify::NotificationChannel;
use crate::ports::{AttendanceStore, PortError, PortResult, SessionStore, UniqueConstraint};

#[derive(Default)]
struct Tables {
    sessions: HashMap<Uuid, Session>,
    attendance: Vec<AttendanceRecord>,
    last_seq: i64,
}

impl Tables {
    fn token_taken(&self, token: &str, except: Option<Uuid>) -> bool {
        self.sessions
            .values()
            .any(|s| s.is_active && s.token == token && Some(s.id) != except)
    }
}

/// Every operation runs under one lock, so each is atomic with respect to the
/// others. Inserted records are published to `channel` while the lock is held.
#[derive(Clone)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    channel: NotificationChannel,
}

impl MemoryStore {
    pub fn new(channel: NotificationChannel) -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            channel,
        }
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn activate_session(&self, new: NewSession) -> PortResult<Session> {
        let mut tables = self.tables.lock().await;

        let previous = tables
            .sessions
            .values()
            .find(|s| s.is_active && s.owner == new.owner)
            .map(|s| s.id);
        if tables.token_taken(&new.token, previous) {
            return Err(PortError::UniqueViolation(UniqueConstraint::ActiveToken));
        }

        if let Some(previous) = previous {
            if let Some(previous) = tables.sessions.get_mut(&previous) {
                previous.is_active = false;
                previous.ended_at = Some(new.created_at);
            }
        }

        let session = Session {
            id: new.id,
            owner: new.owner,
            token: new.token,
            is_active: true,
            created_at: new.created_at,
            token_issued_at: new.created_at,
            ended_at: None,
        };
        tables.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn deactivate_session(&self, session_id: Uuid) -> PortResult<Option<Session>> {
        let mut tables = self.tables.lock().await;
        Ok(tables.sessions.get_mut(&session_id).map(|session| {
            if session.is_active {
                session.is_active = false;
                session.ended_at = Some(Utc::now());
            }
            session.clone()
        }))
    }

    async fn replace_token(&self, session_id: Uuid, token: &str) -> PortResult<Option<Session>> {
        let mut tables = self.tables.lock().await;
        if tables.token_taken(token, Some(session_id)) {
            return Err(PortError::UniqueViolation(UniqueConstraint::ActiveToken));
        }
        Ok(tables
            .sessions
            .get_mut(&session_id)
            .filter(|s| s.is_active)
            .map(|session| {
                session.token = token.to_string();
                session.token_issued_at = Utc::now();
                session.clone()
            }))
    }

    async fn find_session(&self, session_id: Uuid) -> PortResult<Option<Session>> {
        Ok(self.tables.lock().await.sessions.get(&session_id).cloned())
    }

    async fn find_active_session(&self, owner: &str) -> PortResult<Option<Session>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .sessions
            .values()
            .find(|s| s.is_active && s.owner == owner)
            .cloned())
    }

    async fn find_active_by_token(&self, token: &str) -> PortResult<Option<Session>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .sessions
            .values()
            .find(|s| s.is_active && s.token == token)
            .cloned())
    }
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn insert_attendance(&self, new: NewAttendance) -> PortResult<AttendanceRecord> {
        let mut tables = self.tables.lock().await;

        if !tables.sessions.contains_key(&new.session_id) {
            return Err(PortError::Unexpected(format!(
                "session {} does not exist",
                new.session_id
            )));
        }
        if tables
            .attendance
            .iter()
            .any(|r| r.session_id == new.session_id && r.roll_number == new.roll_number)
        {
            return Err(PortError::UniqueViolation(UniqueConstraint::AttendanceRoll));
        }

        tables.last_seq += 1;
        let record = AttendanceRecord {
            id: new.id,
            session_id: new.session_id,
            student_name: new.student_name,
            roll_number: new.roll_number,
            selfie_url: new.selfie_url,
            status: new.status,
            seq: tables.last_seq,
            created_at: new.created_at,
        };
        tables.attendance.push(record.clone());
        self.channel.publish(&record);
        Ok(record)
    }

    async fn find_attendance(
        &self,
        session_id: Uuid,
        roll_number: &str,
    ) -> PortResult<Option<AttendanceRecord>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .attendance
            .iter()
            .find(|r| r.session_id == session_id && r.roll_number == roll_number)
            .cloned())
    }

    async fn list_attendance(&self, session_id: Uuid) -> PortResult<Vec<AttendanceRecord>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .attendance
            .iter()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn list_attendance_for_student(
        &self,
        roll_number: &str,
    ) -> PortResult<Vec<AttendanceRecord>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .attendance
            .iter()
            .rev()
            .filter(|r| r.roll_number == roll_number)
            .cloned()
            .collect())
    }
}
