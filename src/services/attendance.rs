//! Attendance marking pipeline
//!
//! A mark runs these steps in order and stops at the first failure:
//!
//! 1. session window, evaluated on the server clock
//! 2. enrollment of the authenticated caller
//! 3. duplicate pre-check (spares an upload in the common case)
//! 4. evidence capture
//! 5. conditional insert, which re-checks window, enrollment and uniqueness
//!    in one statement and is the only authority on acceptance
//!
//! Lecturer review (`set_verified`) lives here too, since it is the only
//! mutation a committed record ever sees.

use crate::config::AttendanceConfig;
use crate::db::repositories::{AttendanceRepository, CourseRepository};
use crate::models::{
    AttendanceFilter, AttendanceHistoryEntry, AttendanceRecord, CommitOutcome,
    LecturerAttendanceEntry, LiveSession, NewAttendance, User,
};
use crate::services::enrollment::EnrollmentGate;
use crate::services::evidence::{EvidenceCapture, EvidenceError};
use crate::services::rate_limiter::AttemptLimiter;
use crate::services::receipt::ReceiptSigner;
use crate::services::window::{InactiveReason, SessionWindowEvaluator, WindowDecision};
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Why a marking attempt was refused
#[derive(Debug, thiserror::Error)]
pub enum MarkingError {
    #[error("Authentication required")]
    AuthenticationFailed,

    #[error("You are not enrolled in this course")]
    NotEnrolled,

    #[error("No active session: {}", .0.describe())]
    NoActiveSession(InactiveReason),

    #[error("Attendance already marked for this session")]
    AlreadyMarked,

    #[error("Signature required: {0}")]
    EvidenceMissing(String),

    #[error("Could not store signature: {0}")]
    EvidenceUploadFailed(String),

    #[error("Too many submissions, slow down")]
    TooManyAttempts,

    #[error("Could not save attendance: {0:#}")]
    CommitFailed(anyhow::Error),

    #[error("Malformed signature: {0}")]
    MalformedEvidence(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl MarkingError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            MarkingError::AuthenticationFailed => "AUTHENTICATION_FAILED",
            MarkingError::NotEnrolled => "NOT_ENROLLED",
            MarkingError::NoActiveSession(_) => "NO_ACTIVE_SESSION",
            MarkingError::AlreadyMarked => "ALREADY_MARKED",
            MarkingError::EvidenceMissing(_) => "EVIDENCE_MISSING",
            MarkingError::EvidenceUploadFailed(_) => "EVIDENCE_UPLOAD_FAILED",
            MarkingError::TooManyAttempts => "RATE_LIMITED",
            MarkingError::CommitFailed(_) => "COMMIT_FAILED",
            MarkingError::MalformedEvidence(_) => "MALFORMED_EVIDENCE",
            MarkingError::InvalidRequest(_) => "INVALID_REQUEST",
            MarkingError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show the student
    pub fn user_message(&self) -> String {
        match self {
            MarkingError::CommitFailed(_) => {
                "Could not save attendance, please try again".to_string()
            }
            MarkingError::Internal(_) => "Something went wrong, please try again".to_string(),
            other => other.to_string(),
        }
    }

    /// Faults of the system rather than of the request
    pub fn is_system(&self) -> bool {
        matches!(
            self,
            MarkingError::EvidenceUploadFailed(_)
                | MarkingError::CommitFailed(_)
                | MarkingError::MalformedEvidence(_)
                | MarkingError::Internal(_)
        )
    }
}

impl From<EvidenceError> for MarkingError {
    fn from(err: EvidenceError) -> Self {
        match err {
            EvidenceError::Missing(msg) => MarkingError::EvidenceMissing(msg),
            EvidenceError::Malformed(msg) => MarkingError::MalformedEvidence(msg),
            EvidenceError::UploadFailed(msg) => MarkingError::EvidenceUploadFailed(msg),
        }
    }
}

/// Errors from lecturer review
#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("Attendance record not found")]
    NotFound,

    #[error("Attendance record belongs to another lecturer's course")]
    Forbidden,

    #[error("Attendance record failed its integrity check")]
    Tampered,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// A marking submission. The student is always the authenticated caller.
#[derive(Debug, Clone, Default)]
pub struct MarkRequest {
    pub session_id: i64,
    /// Client-claimed capture time, stored for information only
    pub captured_at: Option<DateTime<Utc>>,
    /// Inline base64 PNG
    pub signature: Option<String>,
    /// URL returned by a previous evidence upload
    pub signature_url: Option<String>,
    /// Client-claimed identity, never trusted
    pub student_id: Option<i64>,
}

pub struct AttendanceService {
    window: SessionWindowEvaluator,
    gate: EnrollmentGate,
    evidence: EvidenceCapture,
    signer: ReceiptSigner,
    attendance_repo: Arc<dyn AttendanceRepository>,
    course_repo: Arc<dyn CourseRepository>,
    submissions: AttemptLimiter,
}

impl AttendanceService {
    pub fn new(
        window: SessionWindowEvaluator,
        gate: EnrollmentGate,
        evidence: EvidenceCapture,
        signer: ReceiptSigner,
        attendance_repo: Arc<dyn AttendanceRepository>,
        course_repo: Arc<dyn CourseRepository>,
        config: &AttendanceConfig,
    ) -> Self {
        Self {
            window,
            gate,
            evidence,
            signer,
            attendance_repo,
            course_repo,
            submissions: AttemptLimiter::new(
                config.max_submissions_per_minute,
                Duration::minutes(1),
            ),
        }
    }

    /// Mark the caller present in a session
    pub async fn mark(
        &self,
        caller: &User,
        request: MarkRequest,
    ) -> Result<AttendanceRecord, MarkingError> {
        let session_id = request.session_id;
        let result = self.run_pipeline(caller, request).await;

        match &result {
            Ok(record) => tracing::info!(
                student_id = caller.id,
                session_id,
                record_id = record.id,
                "Attendance marked"
            ),
            Err(e) if e.is_system() => tracing::error!(
                student_id = caller.id,
                session_id,
                code = e.code(),
                "Attendance marking failed: {}",
                e
            ),
            Err(e) => tracing::info!(
                student_id = caller.id,
                session_id,
                code = e.code(),
                "Attendance rejected: {}",
                e
            ),
        }

        result
    }

    async fn run_pipeline(
        &self,
        caller: &User,
        request: MarkRequest,
    ) -> Result<AttendanceRecord, MarkingError> {
        if let Some(claimed) = request.student_id {
            if claimed != caller.id {
                tracing::warn!(
                    student_id = caller.id,
                    claimed_student_id = claimed,
                    "Ignoring student_id that does not match the credential"
                );
            }
        }

        let now = self.window.now();
        self.admit_submission(caller, now).await?;

        let session = match self.window.evaluate_at(request.session_id, now).await? {
            WindowDecision::Live(session) => session,
            WindowDecision::NoActiveSession(reason) => {
                return Err(MarkingError::NoActiveSession(reason))
            }
        };

        if !self.gate.admits(caller, session.course_id).await? {
            return Err(MarkingError::NotEnrolled);
        }

        if self
            .attendance_repo
            .exists_for(caller.id, session.id)
            .await
            .context("Failed to check for an existing record")?
        {
            return Err(MarkingError::AlreadyMarked);
        }

        let signature_url = self.capture_evidence(caller, now, &request).await?;

        let new = NewAttendance {
            student_id: caller.id,
            session_id: session.id,
            timestamp: now,
            client_timestamp: request.captured_at,
            integrity_tag: self.signer.tag(session.id, caller.id, now, &signature_url),
            signature_url,
        };

        match self.attendance_repo.insert_if_eligible(&new).await {
            Ok(CommitOutcome::Inserted(record)) => Ok(record),
            Ok(CommitOutcome::Duplicate) => Err(MarkingError::AlreadyMarked),
            Ok(CommitOutcome::Rejected) => Err(self.classify_rejection(caller, &new).await),
            Err(e) => Err(MarkingError::CommitFailed(e)),
        }
    }

    /// Inline payload wins over a reference; neither means no evidence
    async fn capture_evidence(
        &self,
        caller: &User,
        now: DateTime<Utc>,
        request: &MarkRequest,
    ) -> Result<String, MarkingError> {
        let inline = request.signature.as_deref().filter(|s| !s.trim().is_empty());
        let reference = request
            .signature_url
            .as_deref()
            .filter(|s| !s.trim().is_empty());

        let url = match (inline, reference) {
            (Some(payload), _) => self.evidence.capture(caller.id, now, payload).await?,
            (None, Some(url)) => self.evidence.resolve_reference(caller.id, url).await?,
            (None, None) => {
                return Err(MarkingError::EvidenceMissing(
                    "a signature is required".to_string(),
                ))
            }
        };
        Ok(url)
    }

    /// The insert matched no eligible row; find out which condition failed
    async fn classify_rejection(&self, caller: &User, new: &NewAttendance) -> MarkingError {
        self.window.forget(new.session_id).await;

        match self.window.evaluate_at(new.session_id, new.timestamp).await {
            Ok(WindowDecision::NoActiveSession(reason)) => MarkingError::NoActiveSession(reason),
            Ok(WindowDecision::Live(_)) => {
                tracing::warn!(
                    student_id = caller.id,
                    session_id = new.session_id,
                    "Commit rejected for a live session; enrollment changed mid-request"
                );
                MarkingError::NotEnrolled
            }
            Err(e) => MarkingError::CommitFailed(e),
        }
    }

    /// Marks and pre-uploads share one per-student budget
    async fn admit_submission(&self, caller: &User, now: DateTime<Utc>) -> Result<(), MarkingError> {
        if self
            .submissions
            .try_acquire(&format!("student:{}", caller.id), now)
            .await
        {
            Ok(())
        } else {
            Err(MarkingError::TooManyAttempts)
        }
    }

    /// Drop stale submission-rate buckets
    pub async fn cleanup(&self) -> usize {
        self.submissions.cleanup(self.window.now()).await
    }

    /// Validate and store a signature ahead of marking
    pub async fn upload_evidence(
        &self,
        caller: &User,
        payload: &str,
    ) -> Result<String, MarkingError> {
        let now = self.window.now();
        self.admit_submission(caller, now).await?;

        let url = self
            .evidence
            .capture(caller.id, now, payload)
            .await
            .map_err(MarkingError::from)?;
        tracing::info!(student_id = caller.id, "Signature pre-uploaded");
        Ok(url)
    }

    /// Sessions the caller can mark right now
    pub async fn live_sessions(&self, caller: &User) -> anyhow::Result<Vec<LiveSession>> {
        if !caller.is_student() {
            return Ok(Vec::new());
        }
        self.window.live_for_student(caller.id).await
    }

    /// The caller's own attendance history
    pub async fn history(&self, caller: &User) -> anyhow::Result<Vec<AttendanceHistoryEntry>> {
        self.attendance_repo
            .list_by_student(caller.id)
            .await
            .context("Failed to list attendance history")
    }

    /// Records in the lecturer's courses
    pub async fn lecturer_records(
        &self,
        lecturer: &User,
        filter: &AttendanceFilter,
    ) -> anyhow::Result<Vec<LecturerAttendanceEntry>> {
        self.attendance_repo
            .list_for_lecturer(lecturer.id, filter)
            .await
            .context("Failed to list attendance records")
    }

    /// Set or clear the verified flag after checking the record's integrity tag
    pub async fn set_verified(
        &self,
        lecturer: &User,
        record_id: i64,
        verified: bool,
    ) -> Result<AttendanceRecord, ReviewError> {
        let mut record = self
            .attendance_repo
            .get_by_id(record_id)
            .await
            .context("Failed to get attendance record")?
            .ok_or(ReviewError::NotFound)?;

        let session = self
            .window
            .session(record.session_id)
            .await?
            .ok_or(ReviewError::NotFound)?;
        let course = self
            .course_repo
            .get_by_id(session.course_id)
            .await
            .context("Failed to get course")?
            .ok_or(ReviewError::NotFound)?;
        if course.lecturer_id != lecturer.id {
            return Err(ReviewError::Forbidden);
        }

        if !self.signer.verify(&record) {
            tracing::error!(
                record_id,
                student_id = record.student_id,
                session_id = record.session_id,
                "Attendance record failed integrity check"
            );
            return Err(ReviewError::Tampered);
        }

        if !self
            .attendance_repo
            .set_verified(record_id, verified)
            .await
            .context("Failed to update attendance record")?
        {
            return Err(ReviewError::NotFound);
        }

        tracing::info!(record_id, verified, lecturer_id = lecturer.id, "Attendance reviewed");
        record.verified = verified;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, EvidenceConfig};
    use crate::db::repositories::{
        ClassSessionRepository, EnrollmentRepository, SqlxAttendanceRepository,
        SqlxClassSessionRepository, SqlxCourseRepository, SqlxEnrollmentRepository,
        SqlxUserRepository, UserRepository,
    };
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use crate::models::{ClassSession, Course, UserRole};
    use crate::services::clock::FixedClock;
    use crate::config::DatabaseConfig;
    use crate::db::create_pool;
    use crate::services::evidence::tests::{blank_png_base64, png_base64};
    use crate::services::evidence::LocalEvidenceStore;
    use chrono::TimeZone;

    struct Fixture {
        service: AttendanceService,
        pool: DynDatabasePool,
        clock: Arc<FixedClock>,
        dir: tempfile::TempDir,
        lecturer: User,
        other_lecturer: User,
        enrolled: User,
        outsider: User,
        session: ClassSession,
    }

    async fn make_user(repo: &dyn UserRepository, name: &str, role: UserRole) -> User {
        let mut user = User::new(
            name.to_string(),
            format!("{}@campus.edu", name),
            name.to_uppercase(),
            "hash".to_string(),
            role,
        );
        if role == UserRole::Student {
            user.registration_number = Some(format!("REG-{}", name));
        }
        repo.create(&user).await.unwrap()
    }

    async fn setup_with(config: AttendanceConfig) -> Fixture {
        setup_on(create_test_pool().await.unwrap(), config).await
    }

    async fn setup_on(pool: DynDatabasePool, config: AttendanceConfig) -> Fixture {
        migrations::run_migrations(&pool).await.unwrap();

        let users = SqlxUserRepository::new(pool.clone());
        let lecturer = make_user(&users, "grace", UserRole::Lecturer).await;
        let other_lecturer = make_user(&users, "alan", UserRole::Lecturer).await;
        let enrolled = make_user(&users, "edna", UserRole::Student).await;
        let outsider = make_user(&users, "fred", UserRole::Student).await;

        let start = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
        let course_repo = SqlxCourseRepository::boxed(pool.clone());
        let course = course_repo
            .create(&Course {
                id: 0,
                name: "Compilers".to_string(),
                code: "CS420".to_string(),
                lecturer_id: lecturer.id,
                created_at: start,
            })
            .await
            .unwrap();

        let enrollments = SqlxEnrollmentRepository::boxed(pool.clone());
        enrollments.enroll(enrolled.id, course.id, start).await.unwrap();

        let session_repo = SqlxClassSessionRepository::boxed(pool.clone());
        let session = session_repo
            .create(&ClassSession {
                id: 0,
                course_id: course.id,
                title: "Week 1".to_string(),
                start_time: start,
                end_time: start + Duration::minutes(30),
                meeting_link: Some("https://meet.example/cs420".to_string()),
                created_at: start,
            })
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let evidence_config = EvidenceConfig {
            path: dir.path().to_path_buf(),
            retry_backoff_ms: 1,
            ..EvidenceConfig::default()
        };
        let clock = Arc::new(FixedClock::new(start));

        let service = AttendanceService::new(
            SessionWindowEvaluator::new(
                session_repo,
                crate::cache::create_cache(&CacheConfig::default()),
                clock.clone(),
            ),
            EnrollmentGate::new(enrollments),
            EvidenceCapture::new(
                Arc::new(LocalEvidenceStore::from_config(&evidence_config)),
                evidence_config,
            ),
            ReceiptSigner::new(b"test-secret").unwrap(),
            SqlxAttendanceRepository::boxed(pool.clone()),
            course_repo,
            &config,
        );

        Fixture {
            service,
            pool,
            clock,
            dir,
            lecturer,
            other_lecturer,
            enrolled,
            outsider,
            session,
        }
    }

    fn roomy_config() -> AttendanceConfig {
        AttendanceConfig {
            receipt_secret: "test-secret".to_string(),
            max_submissions_per_minute: 100,
        }
    }

    async fn setup() -> Fixture {
        setup_with(roomy_config()).await
    }

    fn request(f: &Fixture) -> MarkRequest {
        MarkRequest {
            session_id: f.session.id,
            captured_at: None,
            signature: Some(png_base64(240, 90)),
            signature_url: None,
            student_id: None,
        }
    }

    fn at(f: &Fixture, minutes: i64) -> DateTime<Utc> {
        f.session.start_time + Duration::minutes(minutes)
    }

    fn blob_count(f: &Fixture) -> usize {
        std::fs::read_dir(f.dir.path())
            .map(|d| d.count())
            .unwrap_or(0)
    }

    async fn record_count(f: &Fixture) -> i64 {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM attendance")
            .fetch_one(f.pool.sqlite().unwrap())
            .await
            .unwrap();
        row.0
    }

    #[tokio::test]
    async fn test_marking_scenario() {
        let f = setup().await;

        // 10:15 first submission succeeds
        f.clock.set(at(&f, 15));
        let record = f.service.mark(&f.enrolled, request(&f)).await.unwrap();
        assert_eq!(record.student_id, f.enrolled.id);
        assert_eq!(record.session_id, f.session.id);
        assert_eq!(record.timestamp, at(&f, 15));
        assert!(!record.verified);

        // 10:16 second submission is a duplicate
        f.clock.set(at(&f, 16));
        let again = f.service.mark(&f.enrolled, request(&f)).await;
        assert!(matches!(again, Err(MarkingError::AlreadyMarked)));
        assert_eq!(record_count(&f).await, 1);

        // 10:45 the window has closed
        f.clock.set(at(&f, 45));
        let late = f.service.mark(&f.enrolled, request(&f)).await;
        assert!(matches!(
            late,
            Err(MarkingError::NoActiveSession(InactiveReason::AlreadyEnded))
        ));

        // a student outside the course
        f.clock.set(at(&f, 15));
        let outsider = f.service.mark(&f.outsider, request(&f)).await;
        assert!(matches!(outsider, Err(MarkingError::NotEnrolled)));
        assert_eq!(record_count(&f).await, 1);
    }

    #[tokio::test]
    async fn test_before_start_and_unknown_session() {
        let f = setup().await;

        f.clock.set(at(&f, -1));
        let early = f.service.mark(&f.enrolled, request(&f)).await;
        assert!(matches!(
            early,
            Err(MarkingError::NoActiveSession(InactiveReason::NotYetStarted))
        ));

        f.clock.set(at(&f, 10));
        let mut req = request(&f);
        req.session_id = 9999;
        let unknown = f.service.mark(&f.enrolled, req).await;
        assert!(matches!(
            unknown,
            Err(MarkingError::NoActiveSession(InactiveReason::UnknownSession))
        ));
        assert_eq!(record_count(&f).await, 0);
        assert_eq!(blob_count(&f), 0);
    }

    #[tokio::test]
    async fn test_window_bounds_are_inclusive() {
        let f = setup().await;
        f.clock.set(f.session.end_time);
        assert!(f.service.mark(&f.enrolled, request(&f)).await.is_ok());
    }

    #[tokio::test]
    async fn test_blank_signature_writes_nothing() {
        let f = setup().await;
        f.clock.set(at(&f, 5));

        for signature in [
            None,
            Some(String::new()),
            Some(png_base64(1, 1)),
            Some(blank_png_base64(240, 90)),
        ] {
            let mut req = request(&f);
            req.signature = signature;
            let result = f.service.mark(&f.enrolled, req).await;
            assert!(matches!(result, Err(MarkingError::EvidenceMissing(_))));
        }

        assert_eq!(blob_count(&f), 0);
        assert_eq!(record_count(&f).await, 0);
    }

    #[tokio::test]
    async fn test_malformed_signature_is_system_class() {
        let f = setup().await;
        f.clock.set(at(&f, 5));

        let mut req = request(&f);
        req.signature = Some("definitely not base64 !!".to_string());
        let err = f.service.mark(&f.enrolled, req).await.unwrap_err();
        assert!(matches!(err, MarkingError::MalformedEvidence(_)));
        assert!(err.is_system());
        assert_eq!(err.code(), "MALFORMED_EVIDENCE");
    }

    #[tokio::test]
    async fn test_claimed_identity_is_ignored() {
        let f = setup().await;
        f.clock.set(at(&f, 5));

        let mut spoof = request(&f);
        spoof.student_id = Some(f.enrolled.id);
        let result = f.service.mark(&f.outsider, spoof).await;
        assert!(matches!(result, Err(MarkingError::NotEnrolled)));

        let mut other = request(&f);
        other.student_id = Some(f.outsider.id);
        let record = f.service.mark(&f.enrolled, other).await.unwrap();
        assert_eq!(record.student_id, f.enrolled.id);
    }

    #[tokio::test]
    async fn test_lecturers_cannot_mark() {
        let f = setup().await;
        f.clock.set(at(&f, 5));
        let result = f.service.mark(&f.lecturer, request(&f)).await;
        assert!(matches!(result, Err(MarkingError::NotEnrolled)));
    }

    #[tokio::test]
    async fn test_client_timestamp_is_informational() {
        let f = setup().await;
        f.clock.set(at(&f, 20));

        let mut req = request(&f);
        req.captured_at = Some(at(&f, -120));
        let record = f.service.mark(&f.enrolled, req).await.unwrap();
        assert_eq!(record.timestamp, at(&f, 20));
        assert_eq!(record.client_timestamp, Some(at(&f, -120)));
    }

    #[tokio::test]
    async fn test_pre_uploaded_reference() {
        let f = setup().await;
        f.clock.set(at(&f, 5));

        let url = f
            .service
            .upload_evidence(&f.enrolled, &png_base64(100, 40))
            .await
            .unwrap();

        let mut stolen = request(&f);
        stolen.signature = None;
        stolen.signature_url = Some(url.clone());
        let result = f.service.mark(&f.outsider, stolen).await;
        assert!(matches!(result, Err(MarkingError::NotEnrolled)));

        let mut req = request(&f);
        req.signature = None;
        req.signature_url = Some(url.clone());
        let record = f.service.mark(&f.enrolled, req).await.unwrap();
        assert_eq!(record.signature_url, url);
    }

    #[tokio::test]
    async fn test_foreign_reference_is_missing_evidence() {
        let f = setup().await;
        f.clock.set(at(&f, 5));

        let url = f
            .service
            .upload_evidence(&f.outsider, &png_base64(100, 40))
            .await
            .unwrap();
        let mut req = request(&f);
        req.signature = None;
        req.signature_url = Some(url);
        let result = f.service.mark(&f.enrolled, req).await;
        assert!(matches!(result, Err(MarkingError::EvidenceMissing(_))));
    }

    #[tokio::test]
    async fn test_submission_rate_limit() {
        let f = setup_with(AttendanceConfig {
            receipt_secret: String::new(),
            max_submissions_per_minute: 2,
        })
        .await;
        f.clock.set(at(&f, 5));

        let mut blank = request(&f);
        blank.signature = None;
        for _ in 0..2 {
            let _ = f.service.mark(&f.enrolled, blank.clone()).await;
        }
        let limited = f.service.mark(&f.enrolled, request(&f)).await;
        assert!(matches!(limited, Err(MarkingError::TooManyAttempts)));

        f.clock.set(at(&f, 7));
        assert!(f.service.mark(&f.enrolled, request(&f)).await.is_ok());
    }

    #[tokio::test]
    async fn test_pre_upload_shares_the_submission_limit() {
        let f = setup_with(AttendanceConfig {
            receipt_secret: String::new(),
            max_submissions_per_minute: 3,
        })
        .await;
        f.clock.set(at(&f, 5));

        for _ in 0..3 {
            f.service
                .upload_evidence(&f.enrolled, &png_base64(100, 40))
                .await
                .unwrap();
        }
        let limited = f
            .service
            .upload_evidence(&f.enrolled, &png_base64(100, 40))
            .await;
        assert!(matches!(limited, Err(MarkingError::TooManyAttempts)));
        assert_eq!(blob_count(&f), 3);

        // The budget is per student and covers marking too
        let marked = f.service.mark(&f.enrolled, request(&f)).await;
        assert!(matches!(marked, Err(MarkingError::TooManyAttempts)));
        assert!(f
            .service
            .upload_evidence(&f.outsider, &png_base64(100, 40))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_marks_leave_one_record() {
        let dir = tempfile::tempdir().unwrap();
        let db = DatabaseConfig {
            url: dir.path().join("race.db").to_string_lossy().to_string(),
            ..DatabaseConfig::default()
        };
        let f = setup_on(create_pool(&db).await.unwrap(), roomy_config()).await;
        f.clock.set(at(&f, 5));

        let attempts = (0..12).map(|_| f.service.mark(&f.enrolled, request(&f)));
        let results = futures::future::join_all(attempts).await;

        let mut marked = 0;
        for result in results {
            match result {
                Ok(_) => marked += 1,
                Err(MarkingError::AlreadyMarked) => {}
                Err(e) => panic!("unexpected rejection: {}", e),
            }
        }
        assert_eq!(marked, 1);
        assert_eq!(record_count(&f).await, 1);
    }

    #[tokio::test]
    async fn test_review_checks_owner_and_integrity() {
        let f = setup().await;
        f.clock.set(at(&f, 5));
        let record = f.service.mark(&f.enrolled, request(&f)).await.unwrap();

        let foreign = f
            .service
            .set_verified(&f.other_lecturer, record.id, true)
            .await;
        assert!(matches!(foreign, Err(ReviewError::Forbidden)));

        let reviewed = f
            .service
            .set_verified(&f.lecturer, record.id, true)
            .await
            .unwrap();
        assert!(reviewed.verified);

        let missing = f.service.set_verified(&f.lecturer, 9999, true).await;
        assert!(matches!(missing, Err(ReviewError::NotFound)));
    }

    #[tokio::test]
    async fn test_tampered_record_is_not_verified() {
        let f = setup().await;
        f.clock.set(at(&f, 5));
        let record = f.service.mark(&f.enrolled, request(&f)).await.unwrap();

        sqlx::query("UPDATE attendance SET signature_url = ? WHERE id = ?")
            .bind("/uploads/signatures/forged.png")
            .bind(record.id)
            .execute(f.pool.sqlite().unwrap())
            .await
            .unwrap();

        let result = f.service.set_verified(&f.lecturer, record.id, true).await;
        assert!(matches!(result, Err(ReviewError::Tampered)));

        let history = f.service.history(&f.enrolled).await.unwrap();
        assert_eq!(history.len(), 1);
        assert!(!history[0].verified);
    }

    #[tokio::test]
    async fn test_listings() {
        let f = setup().await;
        f.clock.set(at(&f, 5));

        let live = f.service.live_sessions(&f.enrolled).await.unwrap();
        assert_eq!(live.len(), 1);
        assert!(!live[0].marked);
        assert!(f.service.live_sessions(&f.outsider).await.unwrap().is_empty());
        assert!(f.service.live_sessions(&f.lecturer).await.unwrap().is_empty());

        f.service.mark(&f.enrolled, request(&f)).await.unwrap();
        let live = f.service.live_sessions(&f.enrolled).await.unwrap();
        assert!(live[0].marked);

        let history = f.service.history(&f.enrolled).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].session_title, "Week 1");
        assert_eq!(history[0].course_code, "CS420");

        let records = f
            .service
            .lecturer_records(&f.lecturer, &AttendanceFilter::default())
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].student_name, "EDNA");
        assert_eq!(records[0].registration_number.as_deref(), Some("REG-edna"));

        assert!(f
            .service
            .lecturer_records(&f.other_lecturer, &AttendanceFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(MarkingError::AuthenticationFailed.code(), "AUTHENTICATION_FAILED");
        assert_eq!(MarkingError::NotEnrolled.code(), "NOT_ENROLLED");
        assert_eq!(
            MarkingError::NoActiveSession(InactiveReason::AlreadyEnded).code(),
            "NO_ACTIVE_SESSION"
        );
        assert_eq!(MarkingError::AlreadyMarked.code(), "ALREADY_MARKED");
        assert!(!MarkingError::AlreadyMarked.is_system());
        assert_eq!(
            MarkingError::InvalidRequest("bad body".to_string()).code(),
            "INVALID_REQUEST"
        );
        assert!(!MarkingError::InvalidRequest("bad body".to_string()).is_system());
        assert!(MarkingError::CommitFailed(anyhow::anyhow!("db down")).is_system());
        assert!(!MarkingError::Internal(anyhow::anyhow!("boom"))
            .user_message()
            .contains("boom"));
    }
}
