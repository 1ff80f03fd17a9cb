//! User service
//!
//! Implements business logic for accounts and authentication:
//! - Login returning a bearer token in one synchronous call
//! - Logout and token validation
//! - Account creation for seeding and administration (there is no self-service signup)
//! - Student search for lecturers

use crate::config::AuthConfig;
use crate::db::repositories::{is_unique_violation, AuthSessionRepository, UserRepository};
use crate::models::{AuthSession, CreateUserInput, StudentSummary, User, UserRole};
use crate::services::clock::DynClock;
use crate::services::password::{hash_password, verify_password};
use crate::services::rate_limiter::AttemptLimiter;
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Maximum number of students returned by a search
const STUDENT_SEARCH_LIMIT: i64 = 50;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Authentication failed (invalid credentials)
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// Too many failed logins for this username
    #[error("Too many failed login attempts, try again later")]
    RateLimited,

    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Username, email or registration number already taken
    #[error("User already exists: {0}")]
    UserExists(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Input for user login
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub username_or_email: String,
    pub password: String,
}

impl LoginInput {
    pub fn new(username_or_email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username_or_email: username_or_email.into(),
            password: password.into(),
        }
    }
}

/// Credential returned by a successful login
#[derive(Debug, Clone, Serialize)]
pub struct LoginResult {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

/// User service for managing accounts and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn AuthSessionRepository>,
    clock: DynClock,
    login_limiter: AttemptLimiter,
    session_ttl: Duration,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn AuthSessionRepository>,
        clock: DynClock,
        config: &AuthConfig,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            clock,
            login_limiter: AttemptLimiter::new(
                config.max_login_attempts,
                Duration::minutes(config.login_window_minutes),
            ),
            session_ttl: Duration::hours(config.session_ttl_hours),
        }
    }

    /// Login with credentials
    ///
    /// Failed attempts are counted per username; once the limit is reached
    /// further attempts fail with `RateLimited` until the window slides.
    pub async fn login(&self, input: LoginInput) -> Result<LoginResult, UserServiceError> {
        let now = self.clock.now();
        let key = input.username_or_email.trim().to_string();

        if self.login_limiter.is_limited(&key, now).await {
            tracing::warn!(username = %key, "Login rate limited");
            return Err(UserServiceError::RateLimited);
        }

        let user = match self.find_user_by_username_or_email(&key).await? {
            Some(user) => user,
            None => {
                self.login_limiter.record(&key, now).await;
                return Err(UserServiceError::AuthenticationError(
                    "Invalid username or password".to_string(),
                ));
            }
        };

        let password_valid = verify_password(&input.password, &user.password_hash)
            .context("Failed to verify password")?;

        if !password_valid {
            self.login_limiter.record(&key, now).await;
            tracing::info!(user_id = user.id, "Login failed: wrong password");
            return Err(UserServiceError::AuthenticationError(
                "Invalid username or password".to_string(),
            ));
        }

        self.login_limiter.clear(&key).await;

        let session = AuthSession {
            id: Uuid::new_v4().to_string(),
            user_id: user.id,
            expires_at: now + self.session_ttl,
            created_at: now,
        };
        self.session_repo
            .create(&session)
            .await
            .context("Failed to create session")?;

        tracing::info!(user_id = user.id, role = %user.role, "User logged in");

        Ok(LoginResult {
            token: session.id,
            expires_at: session.expires_at,
            user,
        })
    }

    /// Logout (invalidate the token)
    pub async fn logout(&self, token: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(token)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// Validate a bearer token and return its user.
    ///
    /// Returns `None` for unknown or expired tokens; expired ones are removed.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let session = match self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired_at(self.clock.now()) {
            if let Err(e) = self.session_repo.delete(token).await {
                tracing::warn!("Failed to remove expired session: {:#}", e);
            }
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?;

        Ok(user)
    }

    /// Create an account
    pub async fn create_user(&self, input: CreateUserInput) -> Result<User, UserServiceError> {
        validate_create_input(&input)?;

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;
        let now = self.clock.now();
        let user = User {
            id: 0,
            username: input.username.trim().to_string(),
            email: input.email.trim().to_lowercase(),
            full_name: input.full_name.trim().to_string(),
            password_hash,
            role: input.role,
            registration_number: match input.role {
                UserRole::Student => input.registration_number.map(|r| r.trim().to_string()),
                UserRole::Lecturer => None,
            },
            created_at: now,
            updated_at: now,
        };

        match self.user_repo.create(&user).await {
            Ok(created) => Ok(created),
            Err(e) if is_unique_violation(&e) => Err(UserServiceError::UserExists(
                "username, email or registration number is already taken".to_string(),
            )),
            Err(e) => Err(UserServiceError::InternalError(e)),
        }
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        let user = self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?;
        Ok(user)
    }

    /// Search students by name, username or registration number
    pub async fn search_students(
        &self,
        query: &str,
    ) -> Result<Vec<StudentSummary>, UserServiceError> {
        let users = self
            .user_repo
            .search_students(query, STUDENT_SEARCH_LIMIT)
            .await
            .context("Failed to search students")?;
        Ok(users.iter().map(StudentSummary::from).collect())
    }

    /// Delete expired tokens and stale login-attempt buckets
    pub async fn cleanup(&self) -> Result<u64, UserServiceError> {
        let now = self.clock.now();
        let count = self
            .session_repo
            .delete_expired(now)
            .await
            .context("Failed to delete expired sessions")?;
        self.login_limiter.cleanup(now).await;
        Ok(count)
    }

    async fn find_user_by_username_or_email(
        &self,
        username_or_email: &str,
    ) -> Result<Option<User>, UserServiceError> {
        if let Some(user) = self
            .user_repo
            .get_by_username(username_or_email)
            .await
            .context("Failed to get user by username")?
        {
            return Ok(Some(user));
        }

        let user = self
            .user_repo
            .get_by_email(&username_or_email.to_lowercase())
            .await
            .context("Failed to get user by email")?;

        Ok(user)
    }
}

fn validate_create_input(input: &CreateUserInput) -> Result<(), UserServiceError> {
    if input.username.trim().is_empty() {
        return Err(UserServiceError::ValidationError(
            "Username cannot be empty".to_string(),
        ));
    }
    if input.full_name.trim().is_empty() {
        return Err(UserServiceError::ValidationError(
            "Full name cannot be empty".to_string(),
        ));
    }
    if !input.email.contains('@') {
        return Err(UserServiceError::ValidationError(
            "Invalid email format".to_string(),
        ));
    }
    if input.password.is_empty() {
        return Err(UserServiceError::ValidationError(
            "Password cannot be empty".to_string(),
        ));
    }
    if input.role == UserRole::Student
        && input
            .registration_number
            .as_deref()
            .map_or(true, |r| r.trim().is_empty())
    {
        return Err(UserServiceError::ValidationError(
            "Students need a registration number".to_string(),
        ));
    }
    Ok(())
}
