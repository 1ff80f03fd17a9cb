//! Class session model
//!
//! A class session is a scheduled meeting of a course. Students may only mark
//! attendance while the session window `[start_time, end_time]` contains the
//! server's current time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Scheduled meeting of a course
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassSession {
    pub id: i64,
    pub course_id: i64,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub meeting_link: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Position of an instant relative to a session window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowStatus {
    NotStarted,
    Live,
    Ended,
}

impl ClassSession {
    /// Where `now` falls relative to this session's window. Both bounds are inclusive.
    pub fn window_status(&self, now: DateTime<Utc>) -> WindowStatus {
        if now < self.start_time {
            WindowStatus::NotStarted
        } else if now > self.end_time {
            WindowStatus::Ended
        } else {
            WindowStatus::Live
        }
    }

    /// `start_time <= now <= end_time`
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.window_status(now) == WindowStatus::Live
    }
}

/// Input for scheduling a session
#[derive(Debug, Clone, Deserialize)]
pub struct CreateClassSessionInput {
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub meeting_link: Option<String>,
}

/// A live session as shown to a student
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveSession {
    pub session: ClassSession,
    pub course_name: String,
    pub course_code: String,
    /// Whether the caller already has a record for this session
    pub marked: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn session(start: DateTime<Utc>, end: DateTime<Utc>) -> ClassSession {
        ClassSession {
            id: 1,
            course_id: 1,
            title: "Lecture".to_string(),
            start_time: start,
            end_time: end,
            meeting_link: None,
            created_at: start,
        }
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 3, 2, 10, 30, 0).unwrap();
        let s = session(start, end);

        assert!(s.is_live(start));
        assert!(s.is_live(end));
        assert_eq!(s.window_status(start - Duration::milliseconds(1)), WindowStatus::NotStarted);
        assert_eq!(s.window_status(end + Duration::milliseconds(1)), WindowStatus::Ended);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn is_live_matches_interval(
            start_offset in -100_000i64..100_000,
            length in 0i64..50_000,
            now_offset in -200_000i64..200_000,
        ) {
            let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
            let start = base + Duration::seconds(start_offset);
            let end = start + Duration::seconds(length);
            let now = base + Duration::seconds(now_offset);

            let s = session(start, end);
            prop_assert_eq!(s.is_live(now), start <= now && now <= end);
        }
    }
}
