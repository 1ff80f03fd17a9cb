//! User model
//!
//! This module defines the User entity and related types. A user is either a
//! student, who marks attendance, or a lecturer, who owns courses and reviews
//! the records submitted for them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// User entity representing an account in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Username (unique)
    pub username: String,
    /// Email address (unique)
    pub email: String,
    /// Display name
    pub full_name: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// User role
    pub role: UserRole,
    /// Registration number (students only)
    pub registration_number: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new User with the given parameters.
    ///
    /// Note: The password should already be hashed before calling this function.
    /// Use `services::password::hash_password()` to hash the password.
    pub fn new(
        username: String,
        email: String,
        full_name: String,
        password_hash: String,
        role: UserRole,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // Will be set by the database
            username,
            email,
            full_name,
            password_hash,
            role,
            registration_number: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the user is a student
    pub fn is_student(&self) -> bool {
        self.role == UserRole::Student
    }

    /// Check if the user is a lecturer
    pub fn is_lecturer(&self) -> bool {
        self.role == UserRole::Lecturer
    }
}

/// User role for authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Marks attendance in the sessions of enrolled courses
    #[default]
    Student,
    /// Owns courses, schedules sessions and reviews attendance
    Lecturer,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Student => write!(f, "student"),
            UserRole::Lecturer => write!(f, "lecturer"),
        }
    }
}

impl FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "student" => Ok(UserRole::Student),
            "lecturer" => Ok(UserRole::Lecturer),
            _ => Err(anyhow::anyhow!("Invalid user role: {}", s)),
        }
    }
}

/// Input for creating a new user (before password hashing)
#[derive(Debug, Clone)]
pub struct CreateUserInput {
    pub username: String,
    pub email: String,
    pub full_name: String,
    /// Plaintext password (will be hashed)
    pub password: String,
    pub role: UserRole,
    /// Required for students, ignored for lecturers
    pub registration_number: Option<String>,
}

/// Student summary returned by the lecturer search
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StudentSummary {
    pub id: i64,
    pub full_name: String,
    pub email: String,
    pub registration_number: Option<String>,
}

impl From<&User> for StudentSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            full_name: user.full_name.clone(),
            email: user.email.clone(),
            registration_number: user.registration_number.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: UserRole) -> User {
        User::new(
            "jdoe".to_string(),
            "jdoe@campus.edu".to_string(),
            "Jane Doe".to_string(),
            "hash".to_string(),
            role,
        )
    }

    #[test]
    fn test_user_new() {
        let user = user(UserRole::Student);

        assert_eq!(user.id, 0);
        assert_eq!(user.username, "jdoe");
        assert_eq!(user.full_name, "Jane Doe");
        assert!(user.registration_number.is_none());
    }

    #[test]
    fn test_role_checks() {
        assert!(user(UserRole::Student).is_student());
        assert!(!user(UserRole::Student).is_lecturer());
        assert!(user(UserRole::Lecturer).is_lecturer());
        assert!(!user(UserRole::Lecturer).is_student());
    }

    #[test]
    fn test_user_role_display_and_parse() {
        assert_eq!(UserRole::Student.to_string(), "student");
        assert_eq!(UserRole::Lecturer.to_string(), "lecturer");
        assert_eq!(UserRole::from_str("LECTURER").unwrap(), UserRole::Lecturer);
        assert_eq!(UserRole::from_str("Student").unwrap(), UserRole::Student);
        assert!(UserRole::from_str("admin").is_err());
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let json = serde_json::to_value(user(UserRole::Student)).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "student");
    }

    #[test]
    fn test_student_summary_from_user() {
        let mut student = user(UserRole::Student);
        student.id = 7;
        student.registration_number = Some("REG-007".to_string());

        let summary = StudentSummary::from(&student);
        assert_eq!(summary.id, 7);
        assert_eq!(summary.registration_number.as_deref(), Some("REG-007"));
    }
}
