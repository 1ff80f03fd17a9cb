//! Database layer
//!
//! Persistence for Rollcall. Supports:
//! - SQLite (default, for single-binary deployment)
//! - MySQL (for shared campus deployments)
//!
//! The driver is selected from configuration behind the `DatabasePool` trait.
//! The attendance table's unique (student_id, session_id) constraint is the
//! authoritative duplicate guard for the marking pipeline.
//!
//! # Usage
//!
//! ```ignore
//! use rollcall::config::DatabaseConfig;
//! use rollcall::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};
