//! Session window evaluator
//!
//! Decides whether a class session is accepting marks, using the server clock
//! only. Session rows are read through the in-process cache; the attendance
//! commit re-checks the window in storage, so a stale cache entry can only
//! cause an early rejection, never an out-of-window record.

use crate::cache::{class_session_key, CacheLayer, MemoryCache};
use crate::db::repositories::ClassSessionRepository;
use crate::models::{ClassSession, LiveSession, WindowStatus};
use crate::services::clock::DynClock;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Why a session is not accepting marks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InactiveReason {
    UnknownSession,
    NotYetStarted,
    AlreadyEnded,
}

impl InactiveReason {
    pub fn describe(&self) -> &'static str {
        match self {
            InactiveReason::UnknownSession => "session does not exist",
            InactiveReason::NotYetStarted => "session has not started yet",
            InactiveReason::AlreadyEnded => "session has already ended",
        }
    }
}

/// Outcome of evaluating a session at an instant
#[derive(Debug, Clone, PartialEq)]
pub enum WindowDecision {
    Live(ClassSession),
    NoActiveSession(InactiveReason),
}

pub struct SessionWindowEvaluator {
    session_repo: Arc<dyn ClassSessionRepository>,
    cache: Arc<MemoryCache>,
    clock: DynClock,
}

impl SessionWindowEvaluator {
    pub fn new(
        session_repo: Arc<dyn ClassSessionRepository>,
        cache: Arc<MemoryCache>,
        clock: DynClock,
    ) -> Self {
        Self {
            session_repo,
            cache,
            clock,
        }
    }

    /// Current server time
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Evaluate a session at the current server time
    pub async fn evaluate(&self, session_id: i64) -> Result<WindowDecision> {
        self.evaluate_at(session_id, self.clock.now()).await
    }

    /// Evaluate a session at a given instant
    pub async fn evaluate_at(&self, session_id: i64, now: DateTime<Utc>) -> Result<WindowDecision> {
        let session = match self.session(session_id).await? {
            Some(s) => s,
            None => return Ok(WindowDecision::NoActiveSession(InactiveReason::UnknownSession)),
        };

        Ok(match session.window_status(now) {
            WindowStatus::Live => WindowDecision::Live(session),
            WindowStatus::NotStarted => {
                WindowDecision::NoActiveSession(InactiveReason::NotYetStarted)
            }
            WindowStatus::Ended => WindowDecision::NoActiveSession(InactiveReason::AlreadyEnded),
        })
    }

    /// Sessions live now in the student's enrolled courses
    pub async fn live_for_student(&self, student_id: i64) -> Result<Vec<LiveSession>> {
        self.session_repo
            .list_live_for_student(student_id, self.clock.now())
            .await
            .context("Failed to list live sessions")
    }

    /// Drop a cached session so the next lookup reads storage
    pub async fn forget(&self, session_id: i64) {
        if let Err(e) = self.cache.delete(&class_session_key(session_id)).await {
            tracing::warn!("Failed to invalidate cached session {}: {:#}", session_id, e);
        }
    }

    /// Read-through lookup. Cache failures fall back to storage.
    pub async fn session(&self, session_id: i64) -> Result<Option<ClassSession>> {
        let key = class_session_key(session_id);

        match self.cache.get::<ClassSession>(&key).await {
            Ok(Some(session)) => return Ok(Some(session)),
            Ok(None) => {}
            Err(e) => tracing::warn!("Ignoring unreadable cache entry {}: {:#}", key, e),
        }

        let session = self
            .session_repo
            .get_by_id(session_id)
            .await
            .context("Failed to get class session")?;

        if let Some(ref s) = session {
            if let Err(e) = self.cache.set(&key, s).await {
                tracing::warn!("Failed to cache class session {}: {:#}", session_id, e);
            }
        }

        Ok(session)
    }
}
