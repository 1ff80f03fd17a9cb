//! Services layer - Business logic
//!
//! Services implement the rules of the system on top of the repositories:
//! - The attendance marking pipeline and its stages (window, enrollment,
//!   evidence, integrity tags)
//! - Course, session and enrollment management for lecturers
//! - Accounts and bearer-token authentication

pub mod attendance;
pub mod clock;
pub mod course;
pub mod enrollment;
pub mod evidence;
pub mod password;
pub mod rate_limiter;
pub mod receipt;
pub mod user;
pub mod window;

pub use attendance::{AttendanceService, MarkRequest, MarkingError, ReviewError};
pub use clock::{Clock, DynClock, FixedClock, SystemClock};
pub use course::{CourseService, CourseServiceError};
pub use enrollment::EnrollmentGate;
pub use evidence::{EvidenceCapture, EvidenceError, EvidenceStore, LocalEvidenceStore};
pub use password::{hash_password, verify_password};
pub use rate_limiter::AttemptLimiter;
pub use receipt::ReceiptSigner;
pub use user::{LoginInput, LoginResult, UserService, UserServiceError};
pub use window::{InactiveReason, SessionWindowEvaluator, WindowDecision};
