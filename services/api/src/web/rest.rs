//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::error::{ErrorBody, ErrorResponse};
use crate::web::state::AppState;
use attendance_core::{AttendanceRecord, Session, Submission};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        start_session_handler,
        active_session_handler,
        get_session_handler,
        end_session_handler,
        rotate_token_handler,
        list_attendance_handler,
        submit_attendance_handler,
        student_history_handler,
    ),
    components(
        schemas(
            HealthResponse,
            StartSessionRequest,
            SessionResponse,
            TokenResponse,
            SubmitAttendanceRequest,
            AttendanceRecordResponse,
            ErrorBody,
        )
    ),
    tags(
        (name = "Attendance API", description = "Class sessions, rotating QR tokens and attendance records.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    status: String,
}

/// The payload for starting a class.
#[derive(Deserialize, ToSchema)]
pub struct StartSessionRequest {
    /// The teacher (or classroom) the session belongs to.
    pub owner: String,
}

#[derive(Deserialize)]
pub struct OwnerQuery {
    pub owner: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct SessionResponse {
    pub id: Uuid,
    pub owner: String,
    /// The value the QR code currently encodes.
    pub token: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub token_issued_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl From<Session> for SessionResponse {
    fn from(session: Session) -> Self {
        Self {
            id: session.id,
            owner: session.owner,
            token: session.token,
            is_active: session.is_active,
            created_at: session.created_at,
            token_issued_at: session.token_issued_at,
            ended_at: session.ended_at,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct TokenResponse {
    pub session_id: Uuid,
    pub token: String,
}

/// A scan submission from a student's device.
#[derive(Deserialize, ToSchema)]
pub struct SubmitAttendanceRequest {
    pub token: String,
    pub student_name: String,
    pub roll_number: String,
    pub selfie_url: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq, Eq)]
pub struct AttendanceRecordResponse {
    pub id: Uuid,
    pub session_id: Uuid,
    pub student_name: String,
    pub roll_number: String,
    pub selfie_url: Option<String>,
    /// `confirmed` or `needs-review`.
    pub status: String,
    /// Insertion order within the service; strictly increasing.
    pub seq: i64,
    pub created_at: DateTime<Utc>,
}

impl From<AttendanceRecord> for AttendanceRecordResponse {
    fn from(record: AttendanceRecord) -> Self {
        Self {
            id: record.id,
            session_id: record.session_id,
            student_name: record.student_name,
            roll_number: record.roll_number,
            selfie_url: record.selfie_url,
            status: record.status.to_string(),
            seq: record.seq,
            created_at: record.created_at,
        }
    }
}

fn to_responses(records: Vec<AttendanceRecord>) -> Vec<AttendanceRecordResponse> {
    records.into_iter().map(AttendanceRecordResponse::from).collect()
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Start a class. Any session the owner still has active is ended first.
#[utoipa::path(
    post,
    path = "/sessions",
    request_body = StartSessionRequest,
    responses(
        (status = 201, description = "Session started", body = SessionResponse),
        (status = 422, description = "Owner missing", body = ErrorBody),
        (status = 503, description = "Storage unavailable", body = ErrorBody)
    )
)]
pub async fn start_session_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<StartSessionRequest>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let session = app_state.sessions.start_session(&payload.owner).await?;
    Ok((StatusCode::CREATED, Json(SessionResponse::from(session))))
}

/// The owner's active session, which is what a reloaded dashboard resumes.
#[utoipa::path(
    get,
    path = "/sessions/active",
    params(("owner" = String, Query, description = "The session owner.")),
    responses(
        (status = 200, description = "The active session", body = SessionResponse),
        (status = 404, description = "No active session", body = ErrorBody)
    )
)]
pub async fn active_session_handler(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<OwnerQuery>,
) -> Result<Json<SessionResponse>, ErrorResponse> {
    match app_state.sessions.active_session(&query.owner).await? {
        Some(session) => Ok(Json(session.into())),
        None => Err(ErrorResponse::new(
            StatusCode::NOT_FOUND,
            "no_active_session",
            format!("{} has no active session.", query.owner.trim()),
        )),
    }
}

#[utoipa::path(
    get,
    path = "/sessions/{id}",
    params(("id" = Uuid, Path, description = "Session id.")),
    responses(
        (status = 200, description = "The session", body = SessionResponse),
        (status = 404, description = "Unknown session", body = ErrorBody)
    )
)]
pub async fn get_session_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionResponse>, ErrorResponse> {
    let session = app_state.sessions.session(session_id).await?;
    Ok(Json(session.into()))
}

/// End a class. Ending an ended session returns it unchanged.
#[utoipa::path(
    post,
    path = "/sessions/{id}/end",
    params(("id" = Uuid, Path, description = "Session id.")),
    responses(
        (status = 200, description = "The ended session", body = SessionResponse),
        (status = 404, description = "Unknown session", body = ErrorBody)
    )
)]
pub async fn end_session_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionResponse>, ErrorResponse> {
    let session = app_state.sessions.end_session(session_id).await?;
    Ok(Json(session.into()))
}

/// Issue a new token. The previous one stops validating immediately.
#[utoipa::path(
    post,
    path = "/sessions/{id}/rotate",
    params(("id" = Uuid, Path, description = "Session id.")),
    responses(
        (status = 200, description = "The new token", body = TokenResponse),
        (status = 404, description = "Unknown session", body = ErrorBody),
        (status = 409, description = "Session is not active", body = ErrorBody)
    )
)]
pub async fn rotate_token_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<TokenResponse>, ErrorResponse> {
    let token = app_state.sessions.rotate_token(session_id).await?;
    Ok(Json(TokenResponse { session_id, token }))
}

#[utoipa::path(
    get,
    path = "/sessions/{id}/attendance",
    params(("id" = Uuid, Path, description = "Session id.")),
    responses(
        (status = 200, description = "Records in insertion order", body = [AttendanceRecordResponse]),
        (status = 404, description = "Unknown session", body = ErrorBody)
    )
)]
pub async fn list_attendance_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Vec<AttendanceRecordResponse>>, ErrorResponse> {
    let records = app_state.register.records(session_id).await?;
    Ok(Json(to_responses(records)))
}

/// Mark a student present with the token scanned from the QR code.
#[utoipa::path(
    post,
    path = "/attendance",
    request_body = SubmitAttendanceRequest,
    responses(
        (status = 201, description = "Attendance recorded", body = AttendanceRecordResponse),
        (status = 400, description = "Invalid or expired token", body = ErrorBody),
        (status = 409, description = "Already marked for this session", body = ErrorBody),
        (status = 422, description = "Name or roll number missing", body = ErrorBody),
        (status = 503, description = "Storage unavailable, retry", body = ErrorBody)
    )
)]
pub async fn submit_attendance_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<SubmitAttendanceRequest>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let mut submission = Submission::new(payload.token, payload.student_name, payload.roll_number);
    if let Some(selfie_url) = payload.selfie_url {
        submission = submission.with_selfie(selfie_url);
    }
    let record = app_state.register.submit(submission).await?;
    Ok((StatusCode::CREATED, Json(AttendanceRecordResponse::from(record))))
}

/// A student's attendance across sessions, newest first.
#[utoipa::path(
    get,
    path = "/students/{roll_number}/attendance",
    params(("roll_number" = String, Path, description = "The student's roll number.")),
    responses(
        (status = 200, description = "Records, newest first", body = [AttendanceRecordResponse])
    )
)]
pub async fn student_history_handler(
    State(app_state): State<Arc<AppState>>,
    Path(roll_number): Path<String>,
) -> Result<Json<Vec<AttendanceRecordResponse>>, ErrorResponse> {
    let records = app_state.register.history(&roll_number).await?;
    Ok(Json(to_responses(records)))
}
