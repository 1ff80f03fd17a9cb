//! Course repository

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::Course;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Row;
use std::sync::Arc;

/// Course repository trait
#[async_trait]
pub trait CourseRepository: Send + Sync {
    /// Insert a course; a taken code surfaces as a unique violation
    async fn create(&self, course: &Course) -> Result<Course>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Course>>;

    /// Courses owned by a lecturer, ordered by code
    async fn list_by_lecturer(&self, lecturer_id: i64) -> Result<Vec<Course>>;
}

/// SQLx-based course repository
pub struct SqlxCourseRepository {
    pool: DynDatabasePool,
}

impl SqlxCourseRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CourseRepository> {
        Arc::new(Self::new(pool))
    }
}

macro_rules! row_to_course {
    ($row:expr) => {
        Course {
            id: $row.get("id"),
            name: $row.get("name"),
            code: $row.get("code"),
            lecturer_id: $row.get("lecturer_id"),
            created_at: $row.get("created_at"),
        }
    };
}

#[async_trait]
impl CourseRepository for SqlxCourseRepository {
    async fn create(&self, course: &Course) -> Result<Course> {
        let sql = "INSERT INTO courses (name, code, lecturer_id, created_at) VALUES (?, ?, ?, ?)";
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(&course.name)
                .bind(&course.code)
                .bind(course.lecturer_id)
                .bind(course.created_at)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to create course")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(&course.name)
                .bind(&course.code)
                .bind(course.lecturer_id)
                .bind(course.created_at)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to create course")?
                .last_insert_id() as i64,
        };
        Ok(Course {
            id,
            ..course.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Course>> {
        let sql = "SELECT id, name, code, lecturer_id, created_at FROM courses WHERE id = ?";
        let course = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get course")?
                .map(|row| row_to_course!(row)),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get course")?
                .map(|row| row_to_course!(row)),
        };
        Ok(course)
    }

    async fn list_by_lecturer(&self, lecturer_id: i64) -> Result<Vec<Course>> {
        let sql = "SELECT id, name, code, lecturer_id, created_at FROM courses WHERE lecturer_id = ? ORDER BY code";
        let courses = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(lecturer_id)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list courses")?
                .iter()
                .map(|row| row_to_course!(row))
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(lecturer_id)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list courses")?
                .iter()
                .map(|row| row_to_course!(row))
                .collect(),
        };
        Ok(courses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{is_unique_violation, SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{User, UserRole};
    use chrono::Utc;

    async fn setup() -> (SqlxCourseRepository, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let lecturer = SqlxUserRepository::new(pool.clone())
            .create(&User::new(
                "grace".to_string(),
                "grace@campus.edu".to_string(),
                "Grace Hopper".to_string(),
                "hash".to_string(),
                UserRole::Lecturer,
            ))
            .await
            .unwrap();
        (SqlxCourseRepository::new(pool), lecturer.id)
    }

    fn course(code: &str, lecturer_id: i64) -> Course {
        Course {
            id: 0,
            name: format!("Course {}", code),
            code: code.to_string(),
            lecturer_id,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_and_list_courses() {
        let (repo, lecturer_id) = setup().await;

        let cs = repo.create(&course("CS201", lecturer_id)).await.unwrap();
        repo.create(&course("CS101", lecturer_id)).await.unwrap();

        let found = repo.get_by_id(cs.id).await.unwrap().expect("course exists");
        assert_eq!(found.code, "CS201");

        let codes: Vec<String> = repo
            .list_by_lecturer(lecturer_id)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.code)
            .collect();
        assert_eq!(codes, vec!["CS101", "CS201"]);
        assert!(repo.list_by_lecturer(lecturer_id + 100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_code_rejected() {
        let (repo, lecturer_id) = setup().await;
        repo.create(&course("CS101", lecturer_id)).await.unwrap();

        let err = repo.create(&course("CS101", lecturer_id)).await.unwrap_err();
        assert!(is_unique_violation(&err));
    }
}
