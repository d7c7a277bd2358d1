//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the concrete implementation of
//! the `SessionStore` and `AttendanceStore` ports from the `core` crate. It
//! handles all interactions with the PostgreSQL database using `sqlx`.
//!
//! The invariants live in the schema: partial unique indexes keep one active
//! session per owner and one active session per token, and a unique constraint
//! keeps one record per (session, roll number).

use async_trait::async_trait;
use attendance_core::domain::{
    AttendanceRecord, AttendanceStatus, NewAttendance, NewSession, Session,
};
use attendance_core::ports::{
    AttendanceStore, PortError, PortResult, SessionStore, UniqueConstraint,
};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::adapters::feed::{InsertNotice, ATTENDANCE_CHANNEL};

const UNIQUE_VIOLATION: &str = "23505";

const SESSION_COLUMNS: &str =
    "id, owner, token, is_active, created_at, token_issued_at, ended_at";
const ATTENDANCE_COLUMNS: &str =
    "id, session_id, student_name, roll_number, selfie_url, status, seq, created_at";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the storage ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    /// Loads one record by id; what the insert relay publishes.
    pub async fn find_attendance_by_id(&self, id: Uuid) -> PortResult<Option<AttendanceRecord>> {
        let record = sqlx::query_as::<_, AttendanceRow>(&format!(
            "SELECT {} FROM attendance WHERE id = $1",
            ATTENDANCE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;
        record.map(AttendanceRow::to_domain).transpose()
    }
}

/// Maps uniqueness violations of the known constraints to their port error.
fn map_db_error(e: sqlx::Error) -> PortError {
    if let sqlx::Error::Database(db_error) = &e {
        if db_error.code().as_deref() == Some(UNIQUE_VIOLATION) {
            let constraint = match db_error.constraint() {
                Some("class_sessions_active_token_key") => Some(UniqueConstraint::ActiveToken),
                Some("class_sessions_active_owner_key") => Some(UniqueConstraint::ActiveOwner),
                Some("attendance_session_roll_key") => Some(UniqueConstraint::AttendanceRoll),
                _ => None,
            };
            if let Some(constraint) = constraint {
                return PortError::UniqueViolation(constraint);
            }
        }
    }
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct SessionRecord {
    id: Uuid,
    owner: String,
    token: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    token_issued_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}
impl SessionRecord {
    fn to_domain(self) -> Session {
        Session {
            id: self.id,
            owner: self.owner,
            token: self.token,
            is_active: self.is_active,
            created_at: self.created_at,
            token_issued_at: self.token_issued_at,
            ended_at: self.ended_at,
        }
    }
}

#[derive(FromRow)]
struct AttendanceRow {
    id: Uuid,
    session_id: Uuid,
    student_name: String,
    roll_number: String,
    selfie_url: Option<String>,
    status: String,
    seq: i64,
    created_at: DateTime<Utc>,
}
impl AttendanceRow {
    fn to_domain(self) -> PortResult<AttendanceRecord> {
        let status = self
            .status
            .parse::<AttendanceStatus>()
            .map_err(|e| PortError::Unexpected(format!("attendance {}: {}", self.id, e)))?;
        Ok(AttendanceRecord {
            id: self.id,
            session_id: self.session_id,
            student_name: self.student_name,
            roll_number: self.roll_number,
            selfie_url: self.selfie_url,
            status,
            seq: self.seq,
            created_at: self.created_at,
        })
    }
}

//=========================================================================================
// `SessionStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl SessionStore for DbAdapter {
    async fn activate_session(&self, new: NewSession) -> PortResult<Session> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        sqlx::query(
            "UPDATE class_sessions SET is_active = FALSE, ended_at = $2 WHERE owner = $1 AND is_active",
        )
        .bind(&new.owner)
        .bind(new.created_at)
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;

        let record = sqlx::query_as::<_, SessionRecord>(&format!(
            "INSERT INTO class_sessions (id, owner, token, is_active, created_at, token_issued_at) \
             VALUES ($1, $2, $3, TRUE, $4, $4) RETURNING {}",
            SESSION_COLUMNS
        ))
        .bind(new.id)
        .bind(&new.owner)
        .bind(&new.token)
        .bind(new.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_db_error)?;

        tx.commit().await.map_err(map_db_error)?;
        Ok(record.to_domain())
    }

    async fn deactivate_session(&self, session_id: Uuid) -> PortResult<Option<Session>> {
        let record = sqlx::query_as::<_, SessionRecord>(&format!(
            "UPDATE class_sessions SET is_active = FALSE, ended_at = COALESCE(ended_at, now()) \
             WHERE id = $1 RETURNING {}",
            SESSION_COLUMNS
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(record.map(SessionRecord::to_domain))
    }

    async fn replace_token(&self, session_id: Uuid, token: &str) -> PortResult<Option<Session>> {
        let record = sqlx::query_as::<_, SessionRecord>(&format!(
            "UPDATE class_sessions SET token = $2, token_issued_at = now() \
             WHERE id = $1 AND is_active RETURNING {}",
            SESSION_COLUMNS
        ))
        .bind(session_id)
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(record.map(SessionRecord::to_domain))
    }

    async fn find_session(&self, session_id: Uuid) -> PortResult<Option<Session>> {
        let record = sqlx::query_as::<_, SessionRecord>(&format!(
            "SELECT {} FROM class_sessions WHERE id = $1",
            SESSION_COLUMNS
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(record.map(SessionRecord::to_domain))
    }

    async fn find_active_session(&self, owner: &str) -> PortResult<Option<Session>> {
        let record = sqlx::query_as::<_, SessionRecord>(&format!(
            "SELECT {} FROM class_sessions WHERE owner = $1 AND is_active",
            SESSION_COLUMNS
        ))
        .bind(owner)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(record.map(SessionRecord::to_domain))
    }

    async fn find_active_by_token(&self, token: &str) -> PortResult<Option<Session>> {
        let record = sqlx::query_as::<_, SessionRecord>(&format!(
            "SELECT {} FROM class_sessions WHERE token = $1 AND is_active",
            SESSION_COLUMNS
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(record.map(SessionRecord::to_domain))
    }
}

//=========================================================================================
// `AttendanceStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl AttendanceStore for DbAdapter {
    async fn insert_attendance(&self, new: NewAttendance) -> PortResult<AttendanceRecord> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        // Inserts into one session are serialized on the session row, so `seq`
        // order and commit (notification) order agree.
        let locked: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM class_sessions WHERE id = $1 FOR UPDATE")
                .bind(new.session_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_db_error)?;
        if locked.is_none() {
            return Err(PortError::Unexpected(format!(
                "session {} does not exist",
                new.session_id
            )));
        }

        let record = sqlx::query_as::<_, AttendanceRow>(&format!(
            "INSERT INTO attendance (id, session_id, student_name, roll_number, selfie_url, status, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            ATTENDANCE_COLUMNS
        ))
        .bind(new.id)
        .bind(new.session_id)
        .bind(&new.student_name)
        .bind(&new.roll_number)
        .bind(&new.selfie_url)
        .bind(new.status.as_str())
        .bind(new.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_db_error)?
        .to_domain()?;

        let payload = serde_json::to_string(&InsertNotice::from(&record))
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(ATTENDANCE_CHANNEL)
            .bind(payload)
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;

        tx.commit().await.map_err(map_db_error)?;
        Ok(record)
    }

    async fn find_attendance(
        &self,
        session_id: Uuid,
        roll_number: &str,
    ) -> PortResult<Option<AttendanceRecord>> {
        let record = sqlx::query_as::<_, AttendanceRow>(&format!(
            "SELECT {} FROM attendance WHERE session_id = $1 AND roll_number = $2",
            ATTENDANCE_COLUMNS
        ))
        .bind(session_id)
        .bind(roll_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;
        record.map(AttendanceRow::to_domain).transpose()
    }

    async fn list_attendance(&self, session_id: Uuid) -> PortResult<Vec<AttendanceRecord>> {
        let records = sqlx::query_as::<_, AttendanceRow>(&format!(
            "SELECT {} FROM attendance WHERE session_id = $1 ORDER BY seq ASC",
            ATTENDANCE_COLUMNS
        ))
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;
        records.into_iter().map(AttendanceRow::to_domain).collect()
    }

    async fn list_attendance_for_student(
        &self,
        roll_number: &str,
    ) -> PortResult<Vec<AttendanceRecord>> {
        let records = sqlx::query_as::<_, AttendanceRow>(&format!(
            "SELECT {} FROM attendance WHERE roll_number = $1 ORDER BY seq DESC",
            ATTENDANCE_COLUMNS
        ))
        .bind(roll_number)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;
        records.into_iter().map(AttendanceRow::to_domain).collect()
    }
}
