//! Class session repository
//!
//! Sessions are scheduled by the owning lecturer. Deleting a session removes
//! its attendance records through the foreign key cascade.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{ClassSession, LiveSession};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::sync::Arc;

/// Class session repository trait
#[async_trait]
pub trait ClassSessionRepository: Send + Sync {
    async fn create(&self, session: &ClassSession) -> Result<ClassSession>;

    async fn get_by_id(&self, id: i64) -> Result<Option<ClassSession>>;

    /// Sessions of a course, newest first
    async fn list_by_course(&self, course_id: i64) -> Result<Vec<ClassSession>>;

    /// Delete a session and, by cascade, its attendance
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Sessions live at `now` in the courses the student is enrolled in
    async fn list_live_for_student(
        &self,
        student_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<LiveSession>>;
}

/// SQLx-based class session repository
pub struct SqlxClassSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxClassSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ClassSessionRepository> {
        Arc::new(Self::new(pool))
    }
}

const SESSION_COLUMNS: &str =
    "cs.id, cs.course_id, cs.title, cs.start_time, cs.end_time, cs.meeting_link, cs.created_at";

const LIVE_FOR_STUDENT_SQL: &str = r#"
    SELECT cs.id, cs.course_id, cs.title, cs.start_time, cs.end_time, cs.meeting_link, cs.created_at,
           c.name AS course_name, c.code AS course_code,
           (SELECT COUNT(*) FROM attendance a WHERE a.session_id = cs.id AND a.student_id = e.student_id) AS marked
    FROM class_sessions cs
    JOIN courses c ON c.id = cs.course_id
    JOIN enrollments e ON e.course_id = cs.course_id
    WHERE e.student_id = ? AND cs.start_time <= ? AND cs.end_time >= ?
    ORDER BY cs.start_time
"#;

macro_rules! row_to_class_session {
    ($row:expr) => {
        ClassSession {
            id: $row.get("id"),
            course_id: $row.get("course_id"),
            title: $row.get("title"),
            start_time: $row.get("start_time"),
            end_time: $row.get("end_time"),
            meeting_link: $row.get("meeting_link"),
            created_at: $row.get("created_at"),
        }
    };
}

macro_rules! row_to_live_session {
    ($row:expr) => {{
        let marked: i64 = $row.get("marked");
        LiveSession {
            session: row_to_class_session!($row),
            course_name: $row.get("course_name"),
            course_code: $row.get("course_code"),
            marked: marked > 0,
        }
    }};
}

#[async_trait]
impl ClassSessionRepository for SqlxClassSessionRepository {
    async fn create(&self, session: &ClassSession) -> Result<ClassSession> {
        let sql = r#"
            INSERT INTO class_sessions (course_id, title, start_time, end_time, meeting_link, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
        "#;
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(session.course_id)
                .bind(&session.title)
                .bind(session.start_time)
                .bind(session.end_time)
                .bind(&session.meeting_link)
                .bind(session.created_at)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to create class session")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(session.course_id)
                .bind(&session.title)
                .bind(session.start_time)
                .bind(session.end_time)
                .bind(&session.meeting_link)
                .bind(session.created_at)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to create class session")?
                .last_insert_id() as i64,
        };
        Ok(ClassSession {
            id,
            ..session.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<ClassSession>> {
        let sql = format!("SELECT {} FROM class_sessions cs WHERE cs.id = ?", SESSION_COLUMNS);
        let session = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get class session")?
                .map(|row| row_to_class_session!(row)),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get class session")?
                .map(|row| row_to_class_session!(row)),
        };
        Ok(session)
    }

    async fn list_by_course(&self, course_id: i64) -> Result<Vec<ClassSession>> {
        let sql = format!(
            "SELECT {} FROM class_sessions cs WHERE cs.course_id = ? ORDER BY cs.start_time DESC",
            SESSION_COLUMNS
        );
        let sessions = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(course_id)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list class sessions")?
                .iter()
                .map(|row| row_to_class_session!(row))
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(course_id)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list class sessions")?
                .iter()
                .map(|row| row_to_class_session!(row))
                .collect(),
        };
        Ok(sessions)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let sql = "DELETE FROM class_sessions WHERE id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to delete class session")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to delete class session")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn list_live_for_student(
        &self,
        student_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<LiveSession>> {
        let sessions = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(LIVE_FOR_STUDENT_SQL)
                .bind(student_id)
                .bind(now)
                .bind(now)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list live sessions")?
                .iter()
                .map(|row| row_to_live_session!(row))
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(LIVE_FOR_STUDENT_SQL)
                .bind(student_id)
                .bind(now)
                .bind(now)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list live sessions")?
                .iter()
                .map(|row| row_to_live_session!(row))
                .collect(),
        };
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        CourseRepository, EnrollmentRepository, SqlxCourseRepository, SqlxEnrollmentRepository,
        SqlxUserRepository, UserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::{Course, User, UserRole};
    use chrono::{Duration, TimeZone};

    struct Fixture {
        repo: SqlxClassSessionRepository,
        enrollments: SqlxEnrollmentRepository,
        student_id: i64,
        course_id: i64,
        other_course_id: i64,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let users = SqlxUserRepository::new(pool.clone());
        let lecturer = users
            .create(&User::new("grace".into(), "g@campus.edu".into(), "Grace".into(), "h".into(), UserRole::Lecturer))
            .await
            .unwrap();
        let student = users
            .create(&User::new("ada".into(), "a@campus.edu".into(), "Ada".into(), "h".into(), UserRole::Student))
            .await
            .unwrap();
        let courses = SqlxCourseRepository::new(pool.clone());
        let mut course = Course {
            id: 0,
            name: "Compilers".into(),
            code: "CS420".into(),
            lecturer_id: lecturer.id,
            created_at: Utc::now(),
        };
        let course_id = courses.create(&course).await.unwrap().id;
        course.code = "CS430".into();
        let other_course_id = courses.create(&course).await.unwrap().id;

        let enrollments = SqlxEnrollmentRepository::new(pool.clone());
        enrollments.enroll(student.id, course_id, Utc::now()).await.unwrap();

        Fixture {
            repo: SqlxClassSessionRepository::new(pool),
            enrollments,
            student_id: student.id,
            course_id,
            other_course_id,
        }
    }

    fn session(course_id: i64, title: &str, start: DateTime<Utc>, minutes: i64) -> ClassSession {
        ClassSession {
            id: 0,
            course_id,
            title: title.to_string(),
            start_time: start,
            end_time: start + Duration::minutes(minutes),
            meeting_link: None,
            created_at: start,
        }
    }

    #[tokio::test]
    async fn test_create_get_delete() {
        let f = setup().await;
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();

        let mut input = session(f.course_id, "Week 1", start, 30);
        input.meeting_link = Some("https://meet.example.edu/cs420".into());
        let created = f.repo.create(&input).await.unwrap();

        let found = f.repo.get_by_id(created.id).await.unwrap().expect("exists");
        assert_eq!(found.title, "Week 1");
        assert_eq!(found.start_time, start);
        assert_eq!(found.end_time, start + Duration::minutes(30));
        assert_eq!(found.meeting_link.as_deref(), Some("https://meet.example.edu/cs420"));

        assert!(f.repo.delete(created.id).await.unwrap());
        assert!(!f.repo.delete(created.id).await.unwrap());
        assert!(f.repo.get_by_id(created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_live_only_enrolled_courses() {
        let f = setup().await;
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
        let now = start + Duration::minutes(15);

        f.repo.create(&session(f.course_id, "Live", start, 30)).await.unwrap();
        f.repo.create(&session(f.course_id, "Later", start + Duration::hours(2), 30)).await.unwrap();
        f.repo.create(&session(f.other_course_id, "Not enrolled", start, 30)).await.unwrap();

        let live = f.repo.list_live_for_student(f.student_id, now).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].session.title, "Live");
        assert_eq!(live[0].course_code, "CS420");
        assert!(!live[0].marked);

        // Enrolling in the other course exposes its session too
        f.enrollments.enroll(f.student_id, f.other_course_id, now).await.unwrap();
        let live = f.repo.list_live_for_student(f.student_id, now).await.unwrap();
        assert_eq!(live.len(), 2);
    }

    #[tokio::test]
    async fn test_list_by_course_newest_first() {
        let f = setup().await;
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
        f.repo.create(&session(f.course_id, "Week 1", start, 30)).await.unwrap();
        f.repo.create(&session(f.course_id, "Week 2", start + Duration::days(7), 30)).await.unwrap();

        let titles: Vec<String> = f
            .repo
            .list_by_course(f.course_id)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.title)
            .collect();
        assert_eq!(titles, vec!["Week 2", "Week 1"]);
    }
}
