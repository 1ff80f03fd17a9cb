//! Rollcall - campus attendance marking service

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rollcall::{
    api,
    config::Config,
    db,
    services::{DynClock, SystemClock},
};

/// How often expired tokens and stale limiter entries are dropped
const CLEANUP_INTERVAL_SECS: u64 = 300;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rollcall=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Rollcall...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    let clock: DynClock = Arc::new(SystemClock);
    let state = api::build_state(&config, pool, clock)?;
    tracing::info!("Services initialized");

    #[cfg(feature = "demo")]
    seed_demo(&state).await?;

    // Periodic cleanup of expired tokens and rate limiter entries
    {
        let users = state.user_service.clone();
        let attendance = state.attendance_service.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(tokio::time::Duration::from_secs(CLEANUP_INTERVAL_SECS));
            loop {
                interval.tick().await;
                match users.cleanup().await {
                    Ok(removed) if removed > 0 => {
                        tracing::debug!("Removed {} expired auth sessions", removed)
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Auth session cleanup failed: {}", e),
                }
                attendance.cleanup().await;
            }
        });
    }

    // Build router
    let app = api::build_router(state, &config)?;

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Demo mode: a lecturer, an enrolled student and a session that is live now
#[cfg(feature = "demo")]
async fn seed_demo(state: &api::AppState) -> Result<()> {
    use chrono::{Duration, Utc};
    use rollcall::models::{
        CreateClassSessionInput, CreateCourseInput, CreateUserInput, UserRole,
    };
    use rollcall::services::UserServiceError;

    let lecturer = match state
        .user_service
        .create_user(CreateUserInput {
            username: "lecturer".to_string(),
            email: "lecturer@rollcall.local".to_string(),
            full_name: "Demo Lecturer".to_string(),
            password: "demo123".to_string(),
            role: UserRole::Lecturer,
            registration_number: None,
        })
        .await
    {
        Ok(user) => user,
        Err(UserServiceError::UserExists(_)) => {
            tracing::info!("Demo mode: data already seeded");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let student = state
        .user_service
        .create_user(CreateUserInput {
            username: "student".to_string(),
            email: "student@rollcall.local".to_string(),
            full_name: "Demo Student".to_string(),
            password: "demo123".to_string(),
            role: UserRole::Student,
            registration_number: Some("DEMO-0001".to_string()),
        })
        .await?;

    let course = state
        .course_service
        .create_course(
            &lecturer,
            CreateCourseInput {
                name: "Introduction to Systems".to_string(),
                code: "SYS101".to_string(),
            },
        )
        .await?;

    let now = Utc::now();
    state
        .course_service
        .create_session(
            &lecturer,
            course.id,
            CreateClassSessionInput {
                title: "Demo lecture".to_string(),
                start_time: now - Duration::minutes(5),
                end_time: now + Duration::hours(2),
                meeting_link: None,
            },
        )
        .await?;
    state
        .course_service
        .enroll_students(&lecturer, course.id, &[student.id])
        .await?;

    tracing::info!("Demo mode: seeded lecturer/demo123 and student/demo123");
    Ok(())
}
