//! Course and enrollment models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Course owned by a single lecturer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub name: String,
    /// Upper-cased, unique
    pub code: String,
    pub lecturer_id: i64,
    pub created_at: DateTime<Utc>,
}

impl Course {
    /// Normalize a course code the way it is stored
    pub fn normalize_code(code: &str) -> String {
        code.trim().to_uppercase()
    }
}

/// Input for creating a course
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCourseInput {
    pub name: String,
    pub code: String,
}

/// A (student, course) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: i64,
    pub student_id: i64,
    pub course_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Enrollment joined with the student's details, for the lecturer roster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrolledStudent {
    pub student_id: i64,
    pub full_name: String,
    pub email: String,
    pub registration_number: Option<String>,
    pub enrolled_at: DateTime<Utc>,
}
