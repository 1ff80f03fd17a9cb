//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the queries for a specific entity.

pub mod attendance;
pub mod auth_session;
pub mod class_session;
pub mod course;
pub mod enrollment;
pub mod user;

pub use attendance::{AttendanceRepository, SqlxAttendanceRepository};
pub use auth_session::{AuthSessionRepository, SqlxAuthSessionRepository};
pub use class_session::{ClassSessionRepository, SqlxClassSessionRepository};
pub use course::{CourseRepository, SqlxCourseRepository};
pub use enrollment::{EnrollmentRepository, SqlxEnrollmentRepository};
pub use user::{SqlxUserRepository, UserRepository};

/// Whether an error chain bottoms out in a unique constraint violation
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<sqlx::Error>(),
            Some(sqlx::Error::Database(db)) if db.is_unique_violation()
        )
    })
}
