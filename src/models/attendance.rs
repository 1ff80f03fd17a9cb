//! Attendance record model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One committed attendance record per (student, session).
///
/// Immutable once written, except for `verified`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: i64,
    pub student_id: i64,
    pub session_id: i64,
    /// Server capture time
    pub timestamp: DateTime<Utc>,
    /// Time claimed by the client, informational only
    pub client_timestamp: Option<DateTime<Utc>>,
    pub signature_url: String,
    pub verified: bool,
    #[serde(skip_serializing)]
    pub integrity_tag: String,
    pub created_at: DateTime<Utc>,
}

/// Values the marking pipeline hands to the commit
#[derive(Debug, Clone)]
pub struct NewAttendance {
    pub student_id: i64,
    pub session_id: i64,
    pub timestamp: DateTime<Utc>,
    pub client_timestamp: Option<DateTime<Utc>>,
    pub signature_url: String,
    pub integrity_tag: String,
}

/// Result of the conditional commit insert
#[derive(Debug, Clone)]
pub enum CommitOutcome {
    Inserted(AttendanceRecord),
    /// The unique constraint on (student_id, session_id) fired
    Duplicate,
    /// No live session joined with an enrollment for this student
    Rejected,
}

/// A student's own record joined with session and course details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceHistoryEntry {
    pub id: i64,
    pub session_id: i64,
    pub session_title: String,
    pub course_name: String,
    pub course_code: String,
    pub timestamp: DateTime<Utc>,
    pub signature_url: String,
    pub verified: bool,
}

/// A record as listed for the owning lecturer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LecturerAttendanceEntry {
    pub id: i64,
    pub student_id: i64,
    pub student_name: String,
    pub registration_number: Option<String>,
    pub session_id: i64,
    pub session_title: String,
    pub course_id: i64,
    pub course_name: String,
    pub timestamp: DateTime<Utc>,
    pub client_timestamp: Option<DateTime<Utc>>,
    pub signature_url: String,
    pub verified: bool,
}

/// Filter for the lecturer listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttendanceFilter {
    pub course_id: Option<i64>,
    pub session_id: Option<i64>,
}
