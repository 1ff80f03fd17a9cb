//! Student attendance API endpoints
//!
//! - POST /api/v1/attendance/mark - Mark attendance in a live session
//! - POST /api/v1/attendance/evidence - Pre-upload a signature
//! - GET /api/v1/attendance/live - Live sessions in the caller's courses
//! - GET /api/v1/attendance/history - The caller's attendance records
//!
//! Marking and evidence upload answer with `{success, message, code}` on
//! every failure, including a missing credential.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, MaybeAuthenticated};
use crate::models::{AttendanceHistoryEntry, AttendanceRecord, LiveSession};
use crate::services::attendance::{MarkRequest, MarkingError};

/// Request body for marking attendance
#[derive(Debug, Deserialize)]
pub struct MarkBody {
    pub session_id: i64,
    #[serde(default)]
    pub captured_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub signature_url: Option<String>,
    /// Accepted for compatibility; identity always comes from the credential
    #[serde(default)]
    pub student_id: Option<i64>,
}

impl From<MarkBody> for MarkRequest {
    fn from(body: MarkBody) -> Self {
        Self {
            session_id: body.session_id,
            captured_at: body.captured_at,
            signature: body.signature,
            signature_url: body.signature_url,
            student_id: body.student_id,
        }
    }
}

/// Request body for pre-uploading a signature
#[derive(Debug, Deserialize)]
pub struct EvidenceBody {
    #[serde(default)]
    pub signature: String,
}

/// Marking response envelope
#[derive(Debug, Serialize)]
pub struct MarkResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<AttendanceRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl MarkResponse {
    fn rejected(err: &MarkingError) -> Self {
        Self {
            success: false,
            message: Some(err.user_message()),
            code: Some(err.code().to_string()),
            record: None,
            url: None,
        }
    }
}

/// HTTP status for each marking outcome
pub fn marking_status(err: &MarkingError) -> StatusCode {
    match err {
        MarkingError::AuthenticationFailed => StatusCode::UNAUTHORIZED,
        MarkingError::NotEnrolled => StatusCode::FORBIDDEN,
        MarkingError::NoActiveSession(_) => StatusCode::NOT_FOUND,
        MarkingError::AlreadyMarked => StatusCode::CONFLICT,
        MarkingError::EvidenceMissing(_) => StatusCode::UNPROCESSABLE_ENTITY,
        MarkingError::EvidenceUploadFailed(_) => StatusCode::BAD_GATEWAY,
        MarkingError::TooManyAttempts => StatusCode::TOO_MANY_REQUESTS,
        MarkingError::CommitFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        MarkingError::MalformedEvidence(_) => StatusCode::BAD_REQUEST,
        MarkingError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        MarkingError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Unreadable bodies get the marking envelope instead of axum's plain text
fn read_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, MarkingError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| MarkingError::InvalidRequest(rejection.body_text()))
}

impl IntoResponse for MarkingError {
    fn into_response(self) -> Response {
        (marking_status(&self), Json(MarkResponse::rejected(&self))).into_response()
    }
}

/// Marking routes; they authenticate on their own
pub fn marking_router() -> Router<AppState> {
    Router::new()
        .route("/mark", post(mark_attendance))
        .route("/evidence", post(upload_evidence))
}

/// Routes behind the auth middleware
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/live", get(live_sessions))
        .route("/history", get(history))
}

/// POST /api/v1/attendance/mark
async fn mark_attendance(
    State(state): State<AppState>,
    MaybeAuthenticated(caller): MaybeAuthenticated,
    body: Result<Json<MarkBody>, JsonRejection>,
) -> Result<impl IntoResponse, MarkingError> {
    let caller = caller.ok_or(MarkingError::AuthenticationFailed)?;
    let body = read_body(body)?;

    let record = state
        .attendance_service
        .mark(&caller, body.into())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(MarkResponse {
            success: true,
            message: Some("Attendance recorded".to_string()),
            code: None,
            record: Some(record),
            url: None,
        }),
    ))
}

/// POST /api/v1/attendance/evidence
async fn upload_evidence(
    State(state): State<AppState>,
    MaybeAuthenticated(caller): MaybeAuthenticated,
    body: Result<Json<EvidenceBody>, JsonRejection>,
) -> Result<impl IntoResponse, MarkingError> {
    let caller = caller.ok_or(MarkingError::AuthenticationFailed)?;
    let body = read_body(body)?;

    let url = state
        .attendance_service
        .upload_evidence(&caller, &body.signature)
        .await
        .inspect_err(|e| tracing::info!(student_id = caller.id, code = e.code(), "Upload rejected: {}", e))?;

    Ok((
        StatusCode::CREATED,
        Json(MarkResponse {
            success: true,
            message: None,
            code: None,
            record: None,
            url: Some(url),
        }),
    ))
}

/// GET /api/v1/attendance/live
async fn live_sessions(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<LiveSession>>, ApiError> {
    let sessions = state
        .attendance_service
        .live_sessions(&user.0)
        .await
        .map_err(|e| ApiError::internal(format!("{:#}", e)))?;
    Ok(Json(sessions))
}

/// GET /api/v1/attendance/history
async fn history(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<AttendanceHistoryEntry>>, ApiError> {
    let entries = state
        .attendance_service
        .history(&user.0)
        .await
        .map_err(|e| ApiError::internal(format!("{:#}", e)))?;
    Ok(Json(entries))
}
