//! Rollcall - campus attendance marking
//!
//! This library provides the core functionality for Rollcall: students mark
//! attendance for a live class session with a hand-drawn signature, and the
//! server accepts the mark only when the session window, enrollment and
//! evidence checks all pass.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
