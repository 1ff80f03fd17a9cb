//! Database migrations module
//!
//! Code-based migrations for Rollcall. All migrations are embedded directly in
//! Rust code as SQL strings, supporting both SQLite and MySQL databases for
//! single-binary deployment.
//!
//! # Usage
//!
//! ```ignore
//! use rollcall::db::{create_pool, migrations};
//!
//! let pool = create_pool(&config).await?;
//! migrations::run_migrations(&pool).await?;
//! ```
//!
//! Each migration is defined as a `Migration` struct containing:
//! - `version`: Unique version number for ordering
//! - `name`: Human-readable migration name
//! - `up_sqlite`: SQL for SQLite database
//! - `up_mysql`: SQL for MySQL database

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};

use super::DynDatabasePool;
use crate::config::DatabaseDriver;

/// A database migration with SQL for both SQLite and MySQL
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (must be unique and sequential)
    pub version: i32,
    /// Human-readable migration name
    pub name: &'static str,
    /// SQL statements for SQLite
    pub up_sqlite: &'static str,
    /// SQL statements for MySQL
    pub up_mysql: &'static str,
}

/// Migration record stored in the database
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// All migrations, embedded in the binary.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_users",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username VARCHAR(50) NOT NULL UNIQUE,
                email VARCHAR(255) NOT NULL UNIQUE,
                full_name VARCHAR(255) NOT NULL,
                password_hash VARCHAR(255) NOT NULL,
                role VARCHAR(20) NOT NULL DEFAULT 'student',
                registration_number VARCHAR(64) UNIQUE,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_users_role ON users(role);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                username VARCHAR(50) NOT NULL UNIQUE,
                email VARCHAR(255) NOT NULL UNIQUE,
                full_name VARCHAR(255) NOT NULL,
                password_hash VARCHAR(255) NOT NULL,
                role VARCHAR(20) NOT NULL DEFAULT 'student',
                registration_number VARCHAR(64) UNIQUE,
                created_at DATETIME(3) NOT NULL,
                updated_at DATETIME(3) NOT NULL
            );
            CREATE INDEX idx_users_role ON users(role);
        "#,
    },
    Migration {
        version: 2,
        name: "create_auth_sessions",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS auth_sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id INTEGER NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_auth_sessions_user_id ON auth_sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_auth_sessions_expires_at ON auth_sessions(expires_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS auth_sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id BIGINT NOT NULL,
                expires_at DATETIME(3) NOT NULL,
                created_at DATETIME(3) NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_auth_sessions_user_id ON auth_sessions(user_id);
            CREATE INDEX idx_auth_sessions_expires_at ON auth_sessions(expires_at);
        "#,
    },
    Migration {
        version: 3,
        name: "create_courses",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS courses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(255) NOT NULL,
                code VARCHAR(32) NOT NULL UNIQUE,
                lecturer_id INTEGER NOT NULL,
                created_at TIMESTAMP NOT NULL,
                FOREIGN KEY (lecturer_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_courses_lecturer_id ON courses(lecturer_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS courses (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                name VARCHAR(255) NOT NULL,
                code VARCHAR(32) NOT NULL UNIQUE,
                lecturer_id BIGINT NOT NULL,
                created_at DATETIME(3) NOT NULL,
                FOREIGN KEY (lecturer_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_courses_lecturer_id ON courses(lecturer_id);
        "#,
    },
    Migration {
        version: 4,
        name: "create_enrollments",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS enrollments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                student_id INTEGER NOT NULL,
                course_id INTEGER NOT NULL,
                created_at TIMESTAMP NOT NULL,
                UNIQUE (student_id, course_id),
                FOREIGN KEY (student_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_enrollments_course_id ON enrollments(course_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS enrollments (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                student_id BIGINT NOT NULL,
                course_id BIGINT NOT NULL,
                created_at DATETIME(3) NOT NULL,
                UNIQUE KEY uq_enrollments_student_course (student_id, course_id),
                FOREIGN KEY (student_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_enrollments_course_id ON enrollments(course_id);
        "#,
    },
    Migration {
        version: 5,
        name: "create_class_sessions",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS class_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                course_id INTEGER NOT NULL,
                title VARCHAR(255) NOT NULL,
                start_time TIMESTAMP NOT NULL,
                end_time TIMESTAMP NOT NULL,
                meeting_link VARCHAR(1024),
                created_at TIMESTAMP NOT NULL,
                CHECK (start_time < end_time),
                FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_class_sessions_course_id ON class_sessions(course_id);
            CREATE INDEX IF NOT EXISTS idx_class_sessions_window ON class_sessions(start_time, end_time);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS class_sessions (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                course_id BIGINT NOT NULL,
                title VARCHAR(255) NOT NULL,
                start_time DATETIME(3) NOT NULL,
                end_time DATETIME(3) NOT NULL,
                meeting_link VARCHAR(1024),
                created_at DATETIME(3) NOT NULL,
                CHECK (start_time < end_time),
                FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_class_sessions_course_id ON class_sessions(course_id);
            CREATE INDEX idx_class_sessions_window ON class_sessions(start_time, end_time);
        "#,
    },
    // The unique key on (student_id, session_id) is the duplicate guard
    Migration {
        version: 6,
        name: "create_attendance",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS attendance (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                student_id INTEGER NOT NULL,
                session_id INTEGER NOT NULL,
                timestamp TIMESTAMP NOT NULL,
                client_timestamp TIMESTAMP,
                signature_url VARCHAR(1024) NOT NULL,
                verified BOOLEAN NOT NULL DEFAULT 0,
                integrity_tag VARCHAR(64) NOT NULL,
                created_at TIMESTAMP NOT NULL,
                UNIQUE (student_id, session_id),
                FOREIGN KEY (student_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (session_id) REFERENCES class_sessions(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_attendance_session_id ON attendance(session_id);
            CREATE INDEX IF NOT EXISTS idx_attendance_timestamp ON attendance(timestamp);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS attendance (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                student_id BIGINT NOT NULL,
                session_id BIGINT NOT NULL,
                timestamp DATETIME(3) NOT NULL,
                client_timestamp DATETIME(3),
                signature_url VARCHAR(1024) NOT NULL,
                verified BOOLEAN NOT NULL DEFAULT FALSE,
                integrity_tag VARCHAR(64) NOT NULL,
                created_at DATETIME(3) NOT NULL,
                UNIQUE KEY uq_attendance_student_session (student_id, session_id),
                FOREIGN KEY (student_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (session_id) REFERENCES class_sessions(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_attendance_session_id ON attendance(session_id);
            CREATE INDEX idx_attendance_timestamp ON attendance(timestamp);
        "#,
    },
];

/// Run all pending migrations.
///
/// Applies every migration whose version is not yet recorded in `_migrations`.
///
/// # Returns
///
/// Number of migrations applied
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_migrations(pool).await?;
    let applied_versions: Vec<i32> = applied.iter().map(|m| m.version as i32).collect();

    let mut count = 0;

    for migration in MIGRATIONS {
        if !applied_versions.contains(&migration.version) {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            apply_migration(pool, migration)
                .await
                .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
            count += 1;
        }
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

/// Create the migrations tracking table if it doesn't exist
async fn create_migrations_table(pool: &DynDatabasePool) -> Result<()> {
    let sql = match pool.driver() {
        DatabaseDriver::Sqlite => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL
            )
            "#
        }
        DatabaseDriver::Mysql => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INT PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at DATETIME(3) NOT NULL
            )
            "#
        }
    };

    pool.execute(sql).await?;
    Ok(())
}

async fn get_applied_migrations(pool: &DynDatabasePool) -> Result<Vec<MigrationRecord>> {
    match pool.driver() {
        DatabaseDriver::Sqlite => get_applied_migrations_sqlite(pool.sqlite()?).await,
        DatabaseDriver::Mysql => get_applied_migrations_mysql(pool.mysql()?).await,
    }
}

async fn get_applied_migrations_sqlite(pool: &SqlitePool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| MigrationRecord {
            version: row.get("version"),
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        })
        .collect())
}

async fn get_applied_migrations_mysql(pool: &MySqlPool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let version: i32 = row.get("version");
            MigrationRecord {
                version: version as i64,
                name: row.get("name"),
                applied_at: row.get("applied_at"),
            }
        })
        .collect())
}

async fn apply_migration(pool: &DynDatabasePool, migration: &Migration) -> Result<()> {
    match pool.driver() {
        DatabaseDriver::Sqlite => apply_migration_sqlite(pool.sqlite()?, migration).await,
        DatabaseDriver::Mysql => apply_migration_mysql(pool.mysql()?, migration).await,
    }
}

async fn apply_migration_sqlite(pool: &SqlitePool, migration: &Migration) -> Result<()> {
    for statement in split_sql_statements(migration.up_sqlite) {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name, applied_at) VALUES (?, ?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .bind(Utc::now())
        .execute(pool)
        .await?;

    Ok(())
}

async fn apply_migration_mysql(pool: &MySqlPool, migration: &Migration) -> Result<()> {
    for statement in split_sql_statements(migration.up_mysql) {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name, applied_at) VALUES (?, ?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .bind(Utc::now())
        .execute(pool)
        .await?;

    Ok(())
}

/// Truncate SQL for error messages
fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split SQL into individual statements, skipping comment-only fragments
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty() && !is_comment_only(stmt))
        .collect()
}

/// Check if a string contains only SQL comments
fn is_comment_only(s: &str) -> bool {
    s.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

/// Get pending migrations count
pub async fn pending_count(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_migrations(pool).await?;
    Ok(MIGRATIONS.len().saturating_sub(applied.len()))
}
