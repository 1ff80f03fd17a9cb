//! API layer - HTTP handlers and routing
//!
//! All endpoints live under `/api/v1`:
//! - Auth endpoints (login, logout, current user)
//! - Student attendance endpoints (mark, evidence upload, live sessions, history)
//! - Lecturer endpoints (courses, sessions, enrollments, records, review)
//!
//! Stored signatures are served read-only under the evidence base URL.

pub mod attendance;
pub mod auth;
pub mod lecturer;
pub mod middleware;

use anyhow::Context;
use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::cache::create_cache;
use crate::config::Config;
use crate::db::repositories::{
    SqlxAttendanceRepository, SqlxAuthSessionRepository, SqlxClassSessionRepository,
    SqlxCourseRepository, SqlxEnrollmentRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::services::{
    AttendanceService, CourseService, DynClock, EnrollmentGate, EvidenceCapture,
    LocalEvidenceStore, ReceiptSigner, SessionWindowEvaluator, UserService,
};

pub use middleware::{ApiError, AppState, AuthenticatedUser, MaybeAuthenticated};

/// Wire repositories and services into the shared application state
pub fn build_state(
    config: &Config,
    pool: DynDatabasePool,
    clock: DynClock,
) -> anyhow::Result<AppState> {
    let cache = create_cache(&config.cache);

    let user_repo = SqlxUserRepository::boxed(pool.clone());
    let auth_session_repo = SqlxAuthSessionRepository::boxed(pool.clone());
    let course_repo = SqlxCourseRepository::boxed(pool.clone());
    let class_session_repo = SqlxClassSessionRepository::boxed(pool.clone());
    let enrollment_repo = SqlxEnrollmentRepository::boxed(pool.clone());
    let attendance_repo = SqlxAttendanceRepository::boxed(pool);

    let user_service = Arc::new(UserService::new(
        user_repo.clone(),
        auth_session_repo,
        clock.clone(),
        &config.auth,
    ));

    let course_service = Arc::new(CourseService::new(
        course_repo.clone(),
        class_session_repo.clone(),
        enrollment_repo.clone(),
        user_repo,
        cache.clone(),
        clock.clone(),
    ));

    let evidence = EvidenceCapture::new(
        Arc::new(LocalEvidenceStore::from_config(&config.evidence)),
        config.evidence.clone(),
    );
    let signer = ReceiptSigner::from_config(&config.attendance)
        .context("Failed to initialize receipt signer")?;

    let attendance_service = Arc::new(AttendanceService::new(
        SessionWindowEvaluator::new(class_session_repo, cache, clock),
        EnrollmentGate::new(enrollment_repo),
        evidence,
        signer,
        attendance_repo,
        course_repo,
        &config.attendance,
    ));

    Ok(AppState {
        user_service,
        course_service,
        attendance_service,
    })
}

/// Build the main API router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Lecturer routes (need lecturer role)
    let lecturer_routes = Router::new()
        .nest("/lecturer", lecturer::router())
        .route_layer(axum_middleware::from_fn(middleware::require_lecturer))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Protected routes (any authenticated user)
    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .nest("/attendance", attendance::protected_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_auth,
        ));

    // Public routes; marking authenticates inside the handler
    Router::new()
        .nest("/auth", auth::public_router())
        .nest("/attendance", attendance::marking_router())
        .merge(lecturer_routes)
        .merge(protected_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, config: &Config) -> anyhow::Result<Router> {
    let origin = config
        .server
        .cors_origin
        .parse::<HeaderValue>()
        .with_context(|| format!("Invalid CORS origin: {}", config.server.cors_origin))?;

    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true);

    let mut router = Router::new().nest("/api/v1", build_api_router(state.clone()));

    let base = config.evidence.public_base_url.trim_end_matches('/');
    if base.starts_with('/') && base.len() > 1 {
        router = router.nest_service(base, ServeDir::new(&config.evidence.path));
    } else {
        tracing::info!("Evidence is served externally at {}", base);
    }

    Ok(router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}
