//! Enrollment repository
//!
//! Enrollment rows gate the marking pipeline: a student with no row for a
//! course can never commit attendance for that course's sessions.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::EnrolledStudent;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::sync::Arc;

/// Enrollment repository trait
#[async_trait]
pub trait EnrollmentRepository: Send + Sync {
    /// Enroll a student; returns false when the pair already existed
    async fn enroll(&self, student_id: i64, course_id: i64, now: DateTime<Utc>) -> Result<bool>;

    async fn is_enrolled(&self, student_id: i64, course_id: i64) -> Result<bool>;

    /// Students enrolled in a course, ordered by name
    async fn list_by_course(&self, course_id: i64) -> Result<Vec<EnrolledStudent>>;

    /// Remove an enrollment; returns false when there was none
    async fn remove(&self, student_id: i64, course_id: i64) -> Result<bool>;
}

/// SQLx-based enrollment repository
pub struct SqlxEnrollmentRepository {
    pool: DynDatabasePool,
}

impl SqlxEnrollmentRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn EnrollmentRepository> {
        Arc::new(Self::new(pool))
    }
}

const LIST_BY_COURSE_SQL: &str = r#"
    SELECT u.id AS student_id, u.full_name, u.email, u.registration_number, e.created_at AS enrolled_at
    FROM enrollments e
    JOIN users u ON u.id = e.student_id
    WHERE e.course_id = ?
    ORDER BY u.full_name
"#;

macro_rules! row_to_enrolled_student {
    ($row:expr) => {
        EnrolledStudent {
            student_id: $row.get("student_id"),
            full_name: $row.get("full_name"),
            email: $row.get("email"),
            registration_number: $row.get("registration_number"),
            enrolled_at: $row.get("enrolled_at"),
        }
    };
}

#[async_trait]
impl EnrollmentRepository for SqlxEnrollmentRepository {
    async fn enroll(&self, student_id: i64, course_id: i64, now: DateTime<Utc>) -> Result<bool> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(
                r#"
                INSERT INTO enrollments (student_id, course_id, created_at)
                VALUES (?, ?, ?)
                ON CONFLICT (student_id, course_id) DO NOTHING
                "#,
            )
            .bind(student_id)
            .bind(course_id)
            .bind(now)
            .execute(self.pool.sqlite()?)
            .await
            .context("Failed to enroll student")?
            .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(
                r#"
                INSERT INTO enrollments (student_id, course_id, created_at)
                VALUES (?, ?, ?)
                ON DUPLICATE KEY UPDATE student_id = student_id
                "#,
            )
            .bind(student_id)
            .bind(course_id)
            .bind(now)
            .execute(self.pool.mysql()?)
            .await
            .context("Failed to enroll student")?
            .rows_affected(),
        };
        Ok(affected == 1)
    }

    async fn is_enrolled(&self, student_id: i64, course_id: i64) -> Result<bool> {
        let sql = "SELECT COUNT(*) AS count FROM enrollments WHERE student_id = ? AND course_id = ?";
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(student_id)
                .bind(course_id)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to check enrollment")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(student_id)
                .bind(course_id)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to check enrollment")?
                .get("count"),
        };
        Ok(count > 0)
    }

    async fn list_by_course(&self, course_id: i64) -> Result<Vec<EnrolledStudent>> {
        let students = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(LIST_BY_COURSE_SQL)
                .bind(course_id)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list enrollments")?
                .iter()
                .map(|row| row_to_enrolled_student!(row))
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(LIST_BY_COURSE_SQL)
                .bind(course_id)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list enrollments")?
                .iter()
                .map(|row| row_to_enrolled_student!(row))
                .collect(),
        };
        Ok(students)
    }

    async fn remove(&self, student_id: i64, course_id: i64) -> Result<bool> {
        let sql = "DELETE FROM enrollments WHERE student_id = ? AND course_id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(student_id)
                .bind(course_id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to remove enrollment")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(student_id)
                .bind(course_id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to remove enrollment")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }
}
