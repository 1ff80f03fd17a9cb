//! Course service
//!
//! Lecturer-side management: courses, their class sessions and enrollments.
//! Every operation is scoped to the calling lecturer; touching another
//! lecturer's course is `Forbidden`.

use crate::cache::{class_session_key, CacheLayer, MemoryCache};
use crate::db::repositories::{
    is_unique_violation, ClassSessionRepository, CourseRepository, EnrollmentRepository,
    UserRepository,
};
use crate::models::{
    ClassSession, Course, CreateClassSessionInput, CreateCourseInput, EnrolledStudent, User,
};
use crate::services::clock::DynClock;
use anyhow::Context;
use std::sync::Arc;

/// Error types for course service operations
#[derive(Debug, thiserror::Error)]
pub enum CourseServiceError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Not allowed: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Course, session and enrollment management for lecturers
pub struct CourseService {
    course_repo: Arc<dyn CourseRepository>,
    session_repo: Arc<dyn ClassSessionRepository>,
    enrollment_repo: Arc<dyn EnrollmentRepository>,
    user_repo: Arc<dyn UserRepository>,
    cache: Arc<MemoryCache>,
    clock: DynClock,
}

impl CourseService {
    pub fn new(
        course_repo: Arc<dyn CourseRepository>,
        session_repo: Arc<dyn ClassSessionRepository>,
        enrollment_repo: Arc<dyn EnrollmentRepository>,
        user_repo: Arc<dyn UserRepository>,
        cache: Arc<MemoryCache>,
        clock: DynClock,
    ) -> Self {
        Self {
            course_repo,
            session_repo,
            enrollment_repo,
            user_repo,
            cache,
            clock,
        }
    }

    /// Create a course owned by the lecturer. Codes are stored upper-cased.
    pub async fn create_course(
        &self,
        lecturer: &User,
        input: CreateCourseInput,
    ) -> Result<Course, CourseServiceError> {
        let name = input.name.trim();
        let code = Course::normalize_code(&input.code);
        if name.is_empty() {
            return Err(CourseServiceError::Validation(
                "Course name cannot be empty".to_string(),
            ));
        }
        if code.is_empty() {
            return Err(CourseServiceError::Validation(
                "Course code cannot be empty".to_string(),
            ));
        }

        let course = Course {
            id: 0,
            name: name.to_string(),
            code: code.clone(),
            lecturer_id: lecturer.id,
            created_at: self.clock.now(),
        };

        match self.course_repo.create(&course).await {
            Ok(created) => {
                tracing::info!(course_id = created.id, code = %created.code, "Course created");
                Ok(created)
            }
            Err(e) if is_unique_violation(&e) => Err(CourseServiceError::Conflict(format!(
                "course code {} is already in use",
                code
            ))),
            Err(e) => Err(CourseServiceError::InternalError(e)),
        }
    }

    pub async fn list_courses(&self, lecturer: &User) -> Result<Vec<Course>, CourseServiceError> {
        let courses = self
            .course_repo
            .list_by_lecturer(lecturer.id)
            .await
            .context("Failed to list courses")?;
        Ok(courses)
    }

    /// Schedule a class session on one of the lecturer's courses
    pub async fn create_session(
        &self,
        lecturer: &User,
        course_id: i64,
        input: CreateClassSessionInput,
    ) -> Result<ClassSession, CourseServiceError> {
        self.owned_course(lecturer, course_id).await?;

        let title = input.title.trim();
        if title.is_empty() {
            return Err(CourseServiceError::Validation(
                "Session title cannot be empty".to_string(),
            ));
        }
        if input.start_time >= input.end_time {
            return Err(CourseServiceError::Validation(
                "start_time must be before end_time".to_string(),
            ));
        }

        let session = ClassSession {
            id: 0,
            course_id,
            title: title.to_string(),
            start_time: input.start_time,
            end_time: input.end_time,
            meeting_link: input
                .meeting_link
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty()),
            created_at: self.clock.now(),
        };

        let created = self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create class session")?;

        tracing::info!(
            session_id = created.id,
            course_id,
            start = %created.start_time,
            end = %created.end_time,
            "Class session scheduled"
        );
        Ok(created)
    }

    pub async fn list_sessions(
        &self,
        lecturer: &User,
        course_id: i64,
    ) -> Result<Vec<ClassSession>, CourseServiceError> {
        self.owned_course(lecturer, course_id).await?;
        let sessions = self
            .session_repo
            .list_by_course(course_id)
            .await
            .context("Failed to list class sessions")?;
        Ok(sessions)
    }

    /// Delete a session along with its attendance records
    pub async fn delete_session(
        &self,
        lecturer: &User,
        session_id: i64,
    ) -> Result<(), CourseServiceError> {
        let session = self
            .session_repo
            .get_by_id(session_id)
            .await
            .context("Failed to get class session")?
            .ok_or_else(|| CourseServiceError::NotFound("Class session".to_string()))?;
        self.owned_course(lecturer, session.course_id).await?;

        self.session_repo
            .delete(session_id)
            .await
            .context("Failed to delete class session")?;

        if let Err(e) = self.cache.delete(&class_session_key(session_id)).await {
            tracing::warn!("Failed to invalidate cached session {}: {:#}", session_id, e);
        }

        tracing::info!(session_id, "Class session deleted");
        Ok(())
    }

    /// Enroll students in a course. Already-enrolled students are skipped;
    /// returns how many enrollments were added.
    pub async fn enroll_students(
        &self,
        lecturer: &User,
        course_id: i64,
        student_ids: &[i64],
    ) -> Result<usize, CourseServiceError> {
        self.owned_course(lecturer, course_id).await?;

        if student_ids.is_empty() {
            return Err(CourseServiceError::Validation(
                "student_ids cannot be empty".to_string(),
            ));
        }

        let mut ids = student_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        // All ids must be students before anything is written
        for id in &ids {
            let user = self
                .user_repo
                .get_by_id(*id)
                .await
                .context("Failed to get user")?;
            match user {
                Some(u) if u.is_student() => {}
                _ => {
                    return Err(CourseServiceError::Validation(format!(
                        "user {} is not a student",
                        id
                    )))
                }
            }
        }

        let now = self.clock.now();
        let mut added = 0;
        for id in ids {
            if self
                .enrollment_repo
                .enroll(id, course_id, now)
                .await
                .context("Failed to enroll student")?
            {
                added += 1;
            }
        }

        tracing::info!(course_id, added, "Students enrolled");
        Ok(added)
    }

    pub async fn list_enrollments(
        &self,
        lecturer: &User,
        course_id: i64,
    ) -> Result<Vec<EnrolledStudent>, CourseServiceError> {
        self.owned_course(lecturer, course_id).await?;
        let students = self
            .enrollment_repo
            .list_by_course(course_id)
            .await
            .context("Failed to list enrollments")?;
        Ok(students)
    }

    /// Remove an enrollment. Past attendance records are kept.
    pub async fn remove_enrollment(
        &self,
        lecturer: &User,
        course_id: i64,
        student_id: i64,
    ) -> Result<(), CourseServiceError> {
        self.owned_course(lecturer, course_id).await?;
        let removed = self
            .enrollment_repo
            .remove(student_id, course_id)
            .await
            .context("Failed to remove enrollment")?;
        if !removed {
            return Err(CourseServiceError::NotFound("Enrollment".to_string()));
        }
        Ok(())
    }

    /// Load a course and check the lecturer owns it
    pub async fn owned_course(
        &self,
        lecturer: &User,
        course_id: i64,
    ) -> Result<Course, CourseServiceError> {
        let course = self
            .course_repo
            .get_by_id(course_id)
            .await
            .context("Failed to get course")?
            .ok_or_else(|| CourseServiceError::NotFound("Course".to_string()))?;

        if course.lecturer_id != lecturer.id {
            return Err(CourseServiceError::Forbidden(
                "course belongs to another lecturer".to_string(),
            ));
        }
        Ok(course)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::db::repositories::{
        SqlxClassSessionRepository, SqlxCourseRepository, SqlxEnrollmentRepository,
        SqlxUserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::UserRole;
    use crate::services::clock::FixedClock;
    use chrono::{Duration, TimeZone, Utc};

    struct Fixture {
        service: CourseService,
        cache: Arc<MemoryCache>,
        lecturer: User,
        other_lecturer: User,
        student: User,
    }

    async fn make_user(repo: &Arc<dyn UserRepository>, name: &str, role: UserRole) -> User {
        let mut user = User::new(
            name.to_string(),
            format!("{}@campus.edu", name),
            name.to_string(),
            "hash".to_string(),
            role,
        );
        if role == UserRole::Student {
            user.registration_number = Some(format!("REG-{}", name));
        }
        repo.create(&user).await.unwrap()
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();

        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let lecturer = make_user(&user_repo, "grace", UserRole::Lecturer).await;
        let other_lecturer = make_user(&user_repo, "alan", UserRole::Lecturer).await;
        let student = make_user(&user_repo, "ada", UserRole::Student).await;

        let cache = crate::cache::create_cache(&CacheConfig::default());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
        ));
        let service = CourseService::new(
            SqlxCourseRepository::boxed(pool.clone()),
            SqlxClassSessionRepository::boxed(pool.clone()),
            SqlxEnrollmentRepository::boxed(pool),
            user_repo,
            cache.clone(),
            clock,
        );

        Fixture {
            service,
            cache,
            lecturer,
            other_lecturer,
            student,
        }
    }

    fn course_input(code: &str) -> CreateCourseInput {
        CreateCourseInput {
            name: "Distributed Systems".to_string(),
            code: code.to_string(),
        }
    }

    fn session_input(start_hour: u32, end_hour: u32) -> CreateClassSessionInput {
        CreateClassSessionInput {
            title: "Lecture 1".to_string(),
            start_time: Utc.with_ymd_and_hms(2026, 3, 2, start_hour, 0, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2026, 3, 2, end_hour, 0, 0).unwrap(),
            meeting_link: Some("  ".to_string()),
        }
    }

    #[tokio::test]
    async fn test_create_course_normalizes_code_and_rejects_duplicates() {
        let f = setup().await;

        let course = f
            .service
            .create_course(&f.lecturer, course_input(" cs401 "))
            .await
            .unwrap();
        assert_eq!(course.code, "CS401");

        let dup = f
            .service
            .create_course(&f.other_lecturer, course_input("CS401"))
            .await;
        assert!(matches!(dup, Err(CourseServiceError::Conflict(_))));

        assert_eq!(f.service.list_courses(&f.lecturer).await.unwrap().len(), 1);
        assert!(f.service.list_courses(&f.other_lecturer).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_session_requires_ordered_window_and_ownership() {
        let f = setup().await;
        let course = f
            .service
            .create_course(&f.lecturer, course_input("CS401"))
            .await
            .unwrap();

        let bad = f
            .service
            .create_session(&f.lecturer, course.id, session_input(11, 10))
            .await;
        assert!(matches!(bad, Err(CourseServiceError::Validation(_))));

        let foreign = f
            .service
            .create_session(&f.other_lecturer, course.id, session_input(10, 11))
            .await;
        assert!(matches!(foreign, Err(CourseServiceError::Forbidden(_))));

        let session = f
            .service
            .create_session(&f.lecturer, course.id, session_input(10, 11))
            .await
            .unwrap();
        assert!(session.meeting_link.is_none());
        assert_eq!(session.end_time - session.start_time, Duration::hours(1));
    }

    #[tokio::test]
    async fn test_delete_session_invalidates_cache() {
        let f = setup().await;
        let course = f
            .service
            .create_course(&f.lecturer, course_input("CS401"))
            .await
            .unwrap();
        let session = f
            .service
            .create_session(&f.lecturer, course.id, session_input(10, 11))
            .await
            .unwrap();
        f.cache
            .set(&class_session_key(session.id), &session)
            .await
            .unwrap();

        f.service.delete_session(&f.lecturer, session.id).await.unwrap();

        let cached: Option<ClassSession> =
            f.cache.get(&class_session_key(session.id)).await.unwrap();
        assert!(cached.is_none());
        assert!(f
            .service
            .list_sessions(&f.lecturer, course.id)
            .await
            .unwrap()
            .is_empty());

        let again = f.service.delete_session(&f.lecturer, session.id).await;
        assert!(matches!(again, Err(CourseServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_enroll_students_is_idempotent() {
        let f = setup().await;
        let course = f
            .service
            .create_course(&f.lecturer, course_input("CS401"))
            .await
            .unwrap();

        let added = f
            .service
            .enroll_students(&f.lecturer, course.id, &[f.student.id, f.student.id])
            .await
            .unwrap();
        assert_eq!(added, 1);

        let added = f
            .service
            .enroll_students(&f.lecturer, course.id, &[f.student.id])
            .await
            .unwrap();
        assert_eq!(added, 0);

        let roster = f.service.list_enrollments(&f.lecturer, course.id).await.unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].student_id, f.student.id);
    }

    #[tokio::test]
    async fn test_enroll_rejects_non_students() {
        let f = setup().await;
        let course = f
            .service
            .create_course(&f.lecturer, course_input("CS401"))
            .await
            .unwrap();

        let result = f
            .service
            .enroll_students(&f.lecturer, course.id, &[f.student.id, f.other_lecturer.id])
            .await;
        assert!(matches!(result, Err(CourseServiceError::Validation(_))));
        assert!(f
            .service
            .list_enrollments(&f.lecturer, course.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_remove_enrollment() {
        let f = setup().await;
        let course = f
            .service
            .create_course(&f.lecturer, course_input("CS401"))
            .await
            .unwrap();
        f.service
            .enroll_students(&f.lecturer, course.id, &[f.student.id])
            .await
            .unwrap();

        f.service
            .remove_enrollment(&f.lecturer, course.id, f.student.id)
            .await
            .unwrap();
        let missing = f
            .service
            .remove_enrollment(&f.lecturer, course.id, f.student.id)
            .await;
        assert!(matches!(missing, Err(CourseServiceError::NotFound(_))));
    }
}
