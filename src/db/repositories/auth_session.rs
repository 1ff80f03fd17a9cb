//! Login session repository
//!
//! Database operations for bearer tokens issued by login.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::AuthSession;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::sync::Arc;

/// Login session repository trait
#[async_trait]
pub trait AuthSessionRepository: Send + Sync {
    /// Create a new session
    async fn create(&self, session: &AuthSession) -> Result<AuthSession>;

    /// Get session by ID (token)
    async fn get_by_id(&self, id: &str) -> Result<Option<AuthSession>>;

    /// Delete a session
    async fn delete(&self, id: &str) -> Result<()>;

    /// Delete sessions that expired before `now`
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// SQLx-based login session repository
pub struct SqlxAuthSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxAuthSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn AuthSessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl AuthSessionRepository for SqlxAuthSessionRepository {
    async fn create(&self, session: &AuthSession) -> Result<AuthSession> {
        let sql = "INSERT INTO auth_sessions (id, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(&session.id)
                    .bind(session.user_id)
                    .bind(session.expires_at)
                    .bind(session.created_at)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to create session")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(&session.id)
                    .bind(session.user_id)
                    .bind(session.expires_at)
                    .bind(session.created_at)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to create session")?;
            }
        }
        Ok(session.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<AuthSession>> {
        let sql = "SELECT id, user_id, expires_at, created_at FROM auth_sessions WHERE id = ?";
        let session = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get session by ID")?
                .map(|row| AuthSession {
                    id: row.get("id"),
                    user_id: row.get("user_id"),
                    expires_at: row.get("expires_at"),
                    created_at: row.get("created_at"),
                }),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get session by ID")?
                .map(|row| AuthSession {
                    id: row.get("id"),
                    user_id: row.get("user_id"),
                    expires_at: row.get("expires_at"),
                    created_at: row.get("created_at"),
                }),
        };
        Ok(session)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let sql = "DELETE FROM auth_sessions WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to delete session")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to delete session")?;
            }
        }
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let sql = "DELETE FROM auth_sessions WHERE expires_at < ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(now)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to delete expired sessions")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(now)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to delete expired sessions")?
                .rows_affected(),
        };
        Ok(affected)
    }
}
