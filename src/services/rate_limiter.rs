//! Sliding-window attempt limiter
//!
//! Used twice: failed logins per username, and marking submissions per
//! student. Keys are compared case-insensitively.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Counts attempts per key inside a sliding window
pub struct AttemptLimiter {
    attempts: RwLock<HashMap<String, Vec<DateTime<Utc>>>>,
    max_attempts: usize,
    window: Duration,
}

impl AttemptLimiter {
    /// Allow at most `max_attempts` per key within `window`
    pub fn new(max_attempts: usize, window: Duration) -> Self {
        Self {
            attempts: RwLock::new(HashMap::new()),
            max_attempts,
            window,
        }
    }

    /// Whether the key has used up its attempts at `now`
    pub async fn is_limited(&self, key: &str, now: DateTime<Utc>) -> bool {
        let mut attempts = self.attempts.write().await;
        let cutoff = now - self.window;

        match attempts.get_mut(&key.to_lowercase()) {
            Some(times) => {
                times.retain(|time| *time > cutoff);
                times.len() >= self.max_attempts
            }
            None => false,
        }
    }

    /// Record one attempt for the key
    pub async fn record(&self, key: &str, now: DateTime<Utc>) {
        let mut attempts = self.attempts.write().await;
        attempts.entry(key.to_lowercase()).or_default().push(now);
    }

    /// Check and record in one step; returns false when the key is limited
    pub async fn try_acquire(&self, key: &str, now: DateTime<Utc>) -> bool {
        let mut attempts = self.attempts.write().await;
        let cutoff = now - self.window;
        let times = attempts.entry(key.to_lowercase()).or_default();
        times.retain(|time| *time > cutoff);

        if times.len() >= self.max_attempts {
            return false;
        }
        times.push(now);
        true
    }

    /// Forget the key (e.g. after a successful login)
    pub async fn clear(&self, key: &str) {
        self.attempts.write().await.remove(&key.to_lowercase());
    }

    /// Drop buckets with no attempts inside the window
    pub async fn cleanup(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.window;
        let mut attempts = self.attempts.write().await;
        let before = attempts.len();
        attempts.retain(|_, times| {
            times.retain(|time| *time > cutoff);
            !times.is_empty()
        });
        before - attempts.len()
    }
}
