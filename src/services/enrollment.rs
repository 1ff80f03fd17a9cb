//! Enrollment gate
//!
//! Fails closed: no enrollment row means no marking. The caller is always the
//! authenticated user, so a client cannot claim someone else's enrollment.

use crate::db::repositories::EnrollmentRepository;
use crate::models::User;
use anyhow::{Context, Result};
use std::sync::Arc;

pub struct EnrollmentGate {
    enrollment_repo: Arc<dyn EnrollmentRepository>,
}

impl EnrollmentGate {
    pub fn new(enrollment_repo: Arc<dyn EnrollmentRepository>) -> Self {
        Self { enrollment_repo }
    }

    /// Whether the caller may mark attendance in the course
    pub async fn admits(&self, caller: &User, course_id: i64) -> Result<bool> {
        if !caller.is_student() {
            return Ok(false);
        }

        self.enrollment_repo
            .is_enrolled(caller.id, course_id)
            .await
            .context("Failed to check enrollment")
    }
}
