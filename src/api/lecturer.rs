//! Lecturer API endpoints
//!
//! All routes require a lecturer credential and only ever touch the
//! caller's own courses.
//!
//! - GET/POST /api/v1/lecturer/courses
//! - GET/POST /api/v1/lecturer/courses/{id}/sessions
//! - DELETE /api/v1/lecturer/sessions/{id}
//! - GET/POST /api/v1/lecturer/courses/{id}/enrollments
//! - DELETE /api/v1/lecturer/courses/{id}/enrollments/{student_id}
//! - GET /api/v1/lecturer/students?q=
//! - GET /api/v1/lecturer/attendance?course_id=&session_id=
//! - PUT /api/v1/lecturer/attendance/{id}/verify

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{
    AttendanceFilter, AttendanceRecord, ClassSession, Course, CreateClassSessionInput,
    CreateCourseInput, EnrolledStudent, LecturerAttendanceEntry, StudentSummary,
};

/// Request body for enrolling students
#[derive(Debug, Deserialize)]
pub struct EnrollRequest {
    pub student_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct EnrollResponse {
    pub enrolled: usize,
}

/// Query for student search
#[derive(Debug, Deserialize)]
pub struct StudentSearchQuery {
    #[serde(default)]
    pub q: String,
}

/// Request body for lecturer review
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub verified: bool,
}

/// Build the lecturer router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/courses", get(list_courses).post(create_course))
        .route(
            "/courses/{id}/sessions",
            get(list_sessions).post(create_session),
        )
        .route("/sessions/{id}", delete(delete_session))
        .route(
            "/courses/{id}/enrollments",
            get(list_enrollments).post(enroll_students),
        )
        .route(
            "/courses/{id}/enrollments/{student_id}",
            delete(remove_enrollment),
        )
        .route("/students", get(search_students))
        .route("/attendance", get(list_attendance))
        .route("/attendance/{id}/verify", put(set_verified))
}

/// GET /api/v1/lecturer/courses
async fn list_courses(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<Course>>, ApiError> {
    Ok(Json(state.course_service.list_courses(&user.0).await?))
}

/// POST /api/v1/lecturer/courses
async fn create_course(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateCourseInput>,
) -> Result<impl IntoResponse, ApiError> {
    let course = state.course_service.create_course(&user.0, body).await?;
    Ok((StatusCode::CREATED, Json(course)))
}

/// GET /api/v1/lecturer/courses/{id}/sessions
async fn list_sessions(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(course_id): Path<i64>,
) -> Result<Json<Vec<ClassSession>>, ApiError> {
    Ok(Json(
        state
            .course_service
            .list_sessions(&user.0, course_id)
            .await?,
    ))
}

/// POST /api/v1/lecturer/courses/{id}/sessions
async fn create_session(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(course_id): Path<i64>,
    Json(body): Json<CreateClassSessionInput>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .course_service
        .create_session(&user.0, course_id, body)
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// DELETE /api/v1/lecturer/sessions/{id}
async fn delete_session(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(session_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state
        .course_service
        .delete_session(&user.0, session_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/lecturer/courses/{id}/enrollments
async fn list_enrollments(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(course_id): Path<i64>,
) -> Result<Json<Vec<EnrolledStudent>>, ApiError> {
    Ok(Json(
        state
            .course_service
            .list_enrollments(&user.0, course_id)
            .await?,
    ))
}

/// POST /api/v1/lecturer/courses/{id}/enrollments
async fn enroll_students(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(course_id): Path<i64>,
    Json(body): Json<EnrollRequest>,
) -> Result<Json<EnrollResponse>, ApiError> {
    let enrolled = state
        .course_service
        .enroll_students(&user.0, course_id, &body.student_ids)
        .await?;
    Ok(Json(EnrollResponse { enrolled }))
}

/// DELETE /api/v1/lecturer/courses/{id}/enrollments/{student_id}
async fn remove_enrollment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((course_id, student_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    state
        .course_service
        .remove_enrollment(&user.0, course_id, student_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/lecturer/students?q=
async fn search_students(
    State(state): State<AppState>,
    Query(query): Query<StudentSearchQuery>,
) -> Result<Json<Vec<StudentSummary>>, ApiError> {
    Ok(Json(
        state
            .user_service
            .search_students(query.q.trim())
            .await?,
    ))
}

/// GET /api/v1/lecturer/attendance
async fn list_attendance(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(filter): Query<AttendanceFilter>,
) -> Result<Json<Vec<LecturerAttendanceEntry>>, ApiError> {
    let records = state
        .attendance_service
        .lecturer_records(&user.0, &filter)
        .await
        .map_err(|e| ApiError::internal(format!("{:#}", e)))?;
    Ok(Json(records))
}

/// PUT /api/v1/lecturer/attendance/{id}/verify
async fn set_verified(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(record_id): Path<i64>,
    Json(body): Json<VerifyRequest>,
) -> Result<Json<AttendanceRecord>, ApiError> {
    let record = state
        .attendance_service
        .set_verified(&user.0, record_id, body.verified)
        .await?;
    Ok(Json(record))
}

#[cfg(test)]
mod tests {
    use crate::api::tests::TestApp;
    use crate::services::evidence::tests::png_base64;
    use axum::http::StatusCode;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn test_students_cannot_use_lecturer_routes() {
        let app = TestApp::new().await;
        let edna = app.login("edna").await;

        let response = app.get_as("/api/v1/lecturer/courses", &edna).await;
        response.assert_status(StatusCode::FORBIDDEN);
        assert_eq!(response.json::<Value>()["error"]["code"], "FORBIDDEN");

        app.server
            .get("/api/v1/lecturer/courses")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_course_session_and_enrollment_flow() {
        let app = TestApp::new().await;
        let grace = app.login("grace").await;

        let created = app
            .post_as(
                "/api/v1/lecturer/courses",
                &grace,
                &json!({ "name": "Operating Systems", "code": "cs310" }),
            )
            .await;
        created.assert_status(StatusCode::CREATED);
        let course: Value = created.json();
        assert_eq!(course["code"], "CS310");
        let course_id = course["id"].as_i64().unwrap();

        let dup = app
            .post_as(
                "/api/v1/lecturer/courses",
                &grace,
                &json!({ "name": "Again", "code": "CS310" }),
            )
            .await;
        dup.assert_status(StatusCode::CONFLICT);

        let bad_window = app
            .post_as(
                &format!("/api/v1/lecturer/courses/{}/sessions", course_id),
                &grace,
                &json!({
                    "title": "Backwards",
                    "start_time": "2026-03-02T11:00:00Z",
                    "end_time": "2026-03-02T10:00:00Z",
                }),
            )
            .await;
        bad_window.assert_status(StatusCode::BAD_REQUEST);

        let session = app
            .post_as(
                &format!("/api/v1/lecturer/courses/{}/sessions", course_id),
                &grace,
                &json!({
                    "title": "Scheduling",
                    "start_time": "2026-03-02T10:00:00Z",
                    "end_time": "2026-03-02T11:00:00Z",
                    "meeting_link": "https://meet.example/os",
                }),
            )
            .await;
        session.assert_status(StatusCode::CREATED);

        let enrolled = app
            .post_as(
                &format!("/api/v1/lecturer/courses/{}/enrollments", course_id),
                &grace,
                &json!({ "student_ids": [app.edna.id, app.fred.id] }),
            )
            .await;
        enrolled.assert_status_ok();
        assert_eq!(enrolled.json::<Value>()["enrolled"], 2);

        let roster: Value = app
            .get_as(
                &format!("/api/v1/lecturer/courses/{}/enrollments", course_id),
                &grace,
            )
            .await
            .json();
        assert_eq!(roster.as_array().unwrap().len(), 2);

        app.delete_as(
            &format!(
                "/api/v1/lecturer/courses/{}/enrollments/{}",
                course_id, app.fred.id
            ),
            &grace,
        )
        .await
        .assert_status(StatusCode::NO_CONTENT);

        let sessions: Value = app
            .get_as(
                &format!("/api/v1/lecturer/courses/{}/sessions", course_id),
                &grace,
            )
            .await
            .json();
        assert_eq!(sessions.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_other_lecturers_course_is_forbidden() {
        let app = TestApp::new().await;
        let alan = app.login("alan").await;

        let response = app
            .get_as(
                &format!("/api/v1/lecturer/courses/{}/sessions", app.course.id),
                &alan,
            )
            .await;
        response.assert_status(StatusCode::FORBIDDEN);

        let response = app
            .delete_as(&format!("/api/v1/lecturer/sessions/{}", app.session.id), &alan)
            .await;
        response.assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_student_search() {
        let app = TestApp::new().await;
        let grace = app.login("grace").await;

        let by_reg: Value = app
            .get_as("/api/v1/lecturer/students?q=REG-002", &grace)
            .await
            .json();
        assert_eq!(by_reg.as_array().unwrap().len(), 1);
        assert_eq!(by_reg[0]["id"], app.fred.id);

        let by_name: Value = app
            .get_as("/api/v1/lecturer/students?q=Edna", &grace)
            .await
            .json();
        assert_eq!(by_name[0]["id"], app.edna.id);
    }

    #[tokio::test]
    async fn test_review_and_tamper_detection() {
        let app = TestApp::new().await;
        let edna = app.login("edna").await;
        let grace = app.login("grace").await;
        let alan = app.login("alan").await;

        app.set_minutes(15);
        let marked: Value = app
            .post_as(
                "/api/v1/attendance/mark",
                &edna,
                &json!({ "session_id": app.session.id, "signature": png_base64(240, 90) }),
            )
            .await
            .json();
        let record_id = marked["record"]["id"].as_i64().unwrap();

        let listed: Value = app
            .get_as(
                &format!("/api/v1/lecturer/attendance?course_id={}", app.course.id),
                &grace,
            )
            .await
            .json();
        assert_eq!(listed.as_array().unwrap().len(), 1);
        assert_eq!(listed[0]["student_name"], "Edna Example");
        assert_eq!(listed[0]["registration_number"], "REG-001");

        let foreign: Value = app
            .get_as("/api/v1/lecturer/attendance", &alan)
            .await
            .json();
        assert!(foreign.as_array().unwrap().is_empty());

        app.put_as(
            &format!("/api/v1/lecturer/attendance/{}/verify", record_id),
            &alan,
            &json!({ "verified": true }),
        )
        .await
        .assert_status(StatusCode::FORBIDDEN);

        let verified = app
            .put_as(
                &format!("/api/v1/lecturer/attendance/{}/verify", record_id),
                &grace,
                &json!({ "verified": true }),
            )
            .await;
        verified.assert_status_ok();
        assert_eq!(verified.json::<Value>()["verified"], true);

        app.tamper_timestamp(record_id).await;

        let tampered = app
            .put_as(
                &format!("/api/v1/lecturer/attendance/{}/verify", record_id),
                &grace,
                &json!({ "verified": false }),
            )
            .await;
        tampered.assert_status(StatusCode::CONFLICT);
        assert_eq!(
            tampered.json::<Value>()["error"]["code"],
            "TAMPERED_RECORD"
        );
    }

    #[tokio::test]
    async fn test_deleting_session_removes_its_records() {
        let app = TestApp::new().await;
        let edna = app.login("edna").await;
        let grace = app.login("grace").await;

        app.set_minutes(15);
        app.post_as(
            "/api/v1/attendance/mark",
            &edna,
            &json!({ "session_id": app.session.id, "signature": png_base64(240, 90) }),
        )
        .await
        .assert_status(StatusCode::CREATED);

        app.delete_as(&format!("/api/v1/lecturer/sessions/{}", app.session.id), &grace)
            .await
            .assert_status(StatusCode::NO_CONTENT);
        assert_eq!(app.attendance_count().await, 0);

        let again = app
            .post_as(
                "/api/v1/attendance/mark",
                &edna,
                &json!({ "session_id": app.session.id, "signature": png_base64(240, 90) }),
            )
            .await;
        again.assert_status(StatusCode::NOT_FOUND);
    }
}
