//! Attendance repository
//!
//! The commit is a single conditional insert: the row is written only if the
//! session is live at the capture instant and the student is enrolled in its
//! course. The unique key on (student_id, session_id) settles concurrent
//! submissions for the same pair.

use crate::config::DatabaseDriver;
use crate::db::repositories::is_unique_violation;
use crate::db::DynDatabasePool;
use crate::models::{
    AttendanceFilter, AttendanceHistoryEntry, AttendanceRecord, CommitOutcome,
    LecturerAttendanceEntry, NewAttendance,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

/// Attendance repository trait
#[async_trait]
pub trait AttendanceRepository: Send + Sync {
    /// Whether a record already exists for the pair
    async fn exists_for(&self, student_id: i64, session_id: i64) -> Result<bool>;

    /// Insert the record if the session is live at `new.timestamp` and the
    /// student is enrolled in its course
    async fn insert_if_eligible(&self, new: &NewAttendance) -> Result<CommitOutcome>;

    async fn get_by_id(&self, id: i64) -> Result<Option<AttendanceRecord>>;

    /// Update only the `verified` flag
    async fn set_verified(&self, id: i64, verified: bool) -> Result<bool>;

    /// A student's records with session and course details, newest first
    async fn list_by_student(&self, student_id: i64) -> Result<Vec<AttendanceHistoryEntry>>;

    /// Records in the lecturer's courses, newest first
    async fn list_for_lecturer(
        &self,
        lecturer_id: i64,
        filter: &AttendanceFilter,
    ) -> Result<Vec<LecturerAttendanceEntry>>;
}

/// SQLx-based attendance repository
pub struct SqlxAttendanceRepository {
    pool: DynDatabasePool,
}

impl SqlxAttendanceRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn AttendanceRepository> {
        Arc::new(Self::new(pool))
    }
}

const RECORD_COLUMNS: &str = "id, student_id, session_id, timestamp, client_timestamp, signature_url, verified, integrity_tag, created_at";

const INSERT_IF_ELIGIBLE_SQLITE: &str = r#"
    INSERT INTO attendance (student_id, session_id, timestamp, client_timestamp, signature_url, verified, integrity_tag, created_at)
    SELECT ?, ?, ?, ?, ?, 0, ?, ?
    WHERE EXISTS (
        SELECT 1
        FROM class_sessions cs
        JOIN enrollments e ON e.course_id = cs.course_id
        WHERE cs.id = ? AND e.student_id = ? AND cs.start_time <= ? AND cs.end_time >= ?
    )
"#;

const INSERT_IF_ELIGIBLE_MYSQL: &str = r#"
    INSERT INTO attendance (student_id, session_id, timestamp, client_timestamp, signature_url, verified, integrity_tag, created_at)
    SELECT ?, ?, ?, ?, ?, FALSE, ?, ?
    FROM DUAL
    WHERE EXISTS (
        SELECT 1
        FROM class_sessions cs
        JOIN enrollments e ON e.course_id = cs.course_id
        WHERE cs.id = ? AND e.student_id = ? AND cs.start_time <= ? AND cs.end_time >= ?
    )
"#;

const HISTORY_SQL: &str = r#"
    SELECT a.id, a.session_id, cs.title AS session_title, c.name AS course_name, c.code AS course_code,
           a.timestamp, a.signature_url, a.verified
    FROM attendance a
    JOIN class_sessions cs ON cs.id = a.session_id
    JOIN courses c ON c.id = cs.course_id
    WHERE a.student_id = ?
    ORDER BY a.timestamp DESC
"#;

const LECTURER_SQL: &str = r#"
    SELECT a.id, a.student_id, u.full_name AS student_name, u.registration_number,
           a.session_id, cs.title AS session_title, c.id AS course_id, c.name AS course_name,
           a.timestamp, a.client_timestamp, a.signature_url, a.verified
    FROM attendance a
    JOIN users u ON u.id = a.student_id
    JOIN class_sessions cs ON cs.id = a.session_id
    JOIN courses c ON c.id = cs.course_id
    WHERE c.lecturer_id = ?
      AND (? IS NULL OR c.id = ?)
      AND (? IS NULL OR cs.id = ?)
    ORDER BY a.timestamp DESC
"#;

macro_rules! row_to_record {
    ($row:expr) => {
        AttendanceRecord {
            id: $row.get("id"),
            student_id: $row.get("student_id"),
            session_id: $row.get("session_id"),
            timestamp: $row.get("timestamp"),
            client_timestamp: $row.get("client_timestamp"),
            signature_url: $row.get("signature_url"),
            verified: $row.get("verified"),
            integrity_tag: $row.get("integrity_tag"),
            created_at: $row.get("created_at"),
        }
    };
}

macro_rules! row_to_history {
    ($row:expr) => {
        AttendanceHistoryEntry {
            id: $row.get("id"),
            session_id: $row.get("session_id"),
            session_title: $row.get("session_title"),
            course_name: $row.get("course_name"),
            course_code: $row.get("course_code"),
            timestamp: $row.get("timestamp"),
            signature_url: $row.get("signature_url"),
            verified: $row.get("verified"),
        }
    };
}

macro_rules! row_to_lecturer_entry {
    ($row:expr) => {
        LecturerAttendanceEntry {
            id: $row.get("id"),
            student_id: $row.get("student_id"),
            student_name: $row.get("student_name"),
            registration_number: $row.get("registration_number"),
            session_id: $row.get("session_id"),
            session_title: $row.get("session_title"),
            course_id: $row.get("course_id"),
            course_name: $row.get("course_name"),
            timestamp: $row.get("timestamp"),
            client_timestamp: $row.get("client_timestamp"),
            signature_url: $row.get("signature_url"),
            verified: $row.get("verified"),
        }
    };
}

macro_rules! bind_insert {
    ($sql:expr, $new:expr, $created_at:expr) => {
        sqlx::query($sql)
            .bind($new.student_id)
            .bind($new.session_id)
            .bind($new.timestamp)
            .bind($new.client_timestamp)
            .bind(&$new.signature_url)
            .bind(&$new.integrity_tag)
            .bind($created_at)
            .bind($new.session_id)
            .bind($new.student_id)
            .bind($new.timestamp)
            .bind($new.timestamp)
    };
}

#[async_trait]
impl AttendanceRepository for SqlxAttendanceRepository {
    async fn exists_for(&self, student_id: i64, session_id: i64) -> Result<bool> {
        let sql = "SELECT COUNT(*) AS count FROM attendance WHERE student_id = ? AND session_id = ?";
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(student_id)
                .bind(session_id)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to check attendance")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(student_id)
                .bind(session_id)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to check attendance")?
                .get("count"),
        };
        Ok(count > 0)
    }

    async fn insert_if_eligible(&self, new: &NewAttendance) -> Result<CommitOutcome> {
        let created_at = Utc::now();
        let inserted: Result<Option<i64>> = match self.pool.driver() {
            DatabaseDriver::Sqlite => bind_insert!(INSERT_IF_ELIGIBLE_SQLITE, new, created_at)
                .execute(self.pool.sqlite()?)
                .await
                .map(|r| (r.rows_affected() == 1).then(|| r.last_insert_rowid()))
                .context("Failed to commit attendance"),
            DatabaseDriver::Mysql => bind_insert!(INSERT_IF_ELIGIBLE_MYSQL, new, created_at)
                .execute(self.pool.mysql()?)
                .await
                .map(|r| (r.rows_affected() == 1).then(|| r.last_insert_id() as i64))
                .context("Failed to commit attendance"),
        };

        match inserted {
            Ok(Some(id)) => Ok(CommitOutcome::Inserted(AttendanceRecord {
                id,
                student_id: new.student_id,
                session_id: new.session_id,
                timestamp: new.timestamp,
                client_timestamp: new.client_timestamp,
                signature_url: new.signature_url.clone(),
                verified: false,
                integrity_tag: new.integrity_tag.clone(),
                created_at,
            })),
            Ok(None) => Ok(CommitOutcome::Rejected),
            Err(e) if is_unique_violation(&e) => Ok(CommitOutcome::Duplicate),
            Err(e) => Err(e),
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<AttendanceRecord>> {
        let sql = format!("SELECT {} FROM attendance WHERE id = ?", RECORD_COLUMNS);
        let record = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get attendance record")?
                .map(|row| row_to_record!(row)),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get attendance record")?
                .map(|row| row_to_record!(row)),
        };
        Ok(record)
    }

    async fn set_verified(&self, id: i64, verified: bool) -> Result<bool> {
        let sql = "UPDATE attendance SET verified = ? WHERE id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(verified)
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to update verification flag")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(verified)
                .bind(id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to update verification flag")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn list_by_student(&self, student_id: i64) -> Result<Vec<AttendanceHistoryEntry>> {
        let entries = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(HISTORY_SQL)
                .bind(student_id)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list attendance history")?
                .iter()
                .map(|row| row_to_history!(row))
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(HISTORY_SQL)
                .bind(student_id)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list attendance history")?
                .iter()
                .map(|row| row_to_history!(row))
                .collect(),
        };
        Ok(entries)
    }

    async fn list_for_lecturer(
        &self,
        lecturer_id: i64,
        filter: &AttendanceFilter,
    ) -> Result<Vec<LecturerAttendanceEntry>> {
        let entries = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(LECTURER_SQL)
                .bind(lecturer_id)
                .bind(filter.course_id)
                .bind(filter.course_id)
                .bind(filter.session_id)
                .bind(filter.session_id)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list attendance for lecturer")?
                .iter()
                .map(|row| row_to_lecturer_entry!(row))
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(LECTURER_SQL)
                .bind(lecturer_id)
                .bind(filter.course_id)
                .bind(filter.course_id)
                .bind(filter.session_id)
                .bind(filter.session_id)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list attendance for lecturer")?
                .iter()
                .map(|row| row_to_lecturer_entry!(row))
                .collect(),
        };
        Ok(entries)
    }
}
