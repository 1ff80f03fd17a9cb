//! Data models
//!
//! This module contains the data structures used throughout Rollcall.
//! Models represent:
//! - Database entities (User, AuthSession, Course, Enrollment, ClassSession, AttendanceRecord)
//! - Joined views returned by the API
//! - Inputs for create operations

mod attendance;
mod auth_session;
mod class_session;
mod course;
mod user;

pub use attendance::{
    AttendanceFilter, AttendanceHistoryEntry, AttendanceRecord, CommitOutcome,
    LecturerAttendanceEntry, NewAttendance,
};
pub use auth_session::AuthSession;
pub use class_session::{ClassSession, CreateClassSessionInput, LiveSession, WindowStatus};
pub use course::{Course, CreateCourseInput, EnrolledStudent, Enrollment};
pub use user::{CreateUserInput, StudentSummary, User, UserRole};
