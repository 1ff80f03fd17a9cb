//! API middleware
//!
//! Contains:
//! - Application state shared by all handlers
//! - Authentication (bearer token or `session` cookie)
//! - Authorization (lecturer-only routes)
//! - The `ApiError` envelope and service error mapping

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::User;
use crate::services::attendance::{AttendanceService, MarkingError, ReviewError};
use crate::services::course::{CourseService, CourseServiceError};
use crate::services::user::{UserService, UserServiceError};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<UserService>,
    pub course_service: Arc<CourseService>,
    pub attendance_service: Arc<AttendanceService>,
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// Caller identity if a valid credential was presented.
///
/// Never rejects; handlers that need their own failure envelope use this
/// instead of `AuthenticatedUser`.
#[derive(Debug, Clone)]
pub struct MaybeAuthenticated(pub Option<User>);

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    /// Log the cause and hide it from the client
    pub fn internal(err: impl std::fmt::Display) -> Self {
        tracing::error!("Request failed: {}", err);
        Self::internal_error("Internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" | "TAMPERED_RECORD" => StatusCode::CONFLICT,
            "RATE_LIMITED" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(self)).into_response()
    }
}

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::AuthenticationError(_) => {
                ApiError::unauthorized("Invalid username or password")
            }
            UserServiceError::RateLimited => ApiError::with_details(
                "RATE_LIMITED",
                err.to_string(),
                serde_json::json!({ "scope": "login" }),
            ),
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::UserExists(msg) => ApiError::conflict(msg),
            UserServiceError::InternalError(e) => ApiError::internal(format!("{:#}", e)),
        }
    }
}

impl From<CourseServiceError> for ApiError {
    fn from(err: CourseServiceError) -> Self {
        match err {
            CourseServiceError::NotFound(_) => ApiError::not_found(err.to_string()),
            CourseServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            CourseServiceError::Validation(msg) => ApiError::validation_error(msg),
            CourseServiceError::Conflict(msg) => ApiError::conflict(msg),
            CourseServiceError::InternalError(e) => ApiError::internal(format!("{:#}", e)),
        }
    }
}

impl From<ReviewError> for ApiError {
    fn from(err: ReviewError) -> Self {
        match err {
            ReviewError::NotFound => ApiError::not_found(err.to_string()),
            ReviewError::Forbidden => ApiError::forbidden(err.to_string()),
            ReviewError::Tampered => ApiError::new("TAMPERED_RECORD", err.to_string()),
            ReviewError::InternalError(e) => ApiError::internal(format!("{:#}", e)),
        }
    }
}

/// Extract the bearer token or `session` cookie
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                let token = token.trim();
                if !token.is_empty() {
                    return Some(token.to_string());
                }
            }
        }
    }

    if let Some(cookie_header) = headers.get(header::COOKIE) {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                let cookie = cookie.trim();
                if let Some(token) = cookie.strip_prefix("session=") {
                    if !token.is_empty() {
                        return Some(token.to_string());
                    }
                }
            }
        }
    }

    None
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_session_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let user = state
        .user_service
        .validate_session(&token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired session"))?;

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// Lecturer authorization middleware; runs after `require_auth`
pub async fn require_lecturer(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !user.0.is_lecturer() {
        return Err(ApiError::forbidden("Lecturer privileges required"));
    }

    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// A missing or stale token is `None`; a failed lookup is a system error
impl FromRequestParts<AppState> for MaybeAuthenticated {
    type Rejection = MarkingError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>() {
            return Ok(MaybeAuthenticated(Some(user.0.clone())));
        }

        let token = match extract_session_token(&parts.headers) {
            Some(token) => token,
            None => return Ok(MaybeAuthenticated(None)),
        };

        match state.user_service.validate_session(&token).await {
            Ok(user) => Ok(MaybeAuthenticated(user)),
            Err(e) => {
                tracing::error!(code = "INTERNAL_ERROR", "Session validation failed: {}", e);
                Err(MarkingError::Internal(
                    anyhow::Error::new(e).context("Session validation failed"),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_token_from_bearer_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(extract_session_token(&headers).as_deref(), Some("abc"));
    }

    #[test]
    fn test_token_from_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; session=xyz"),
        );
        assert_eq!(extract_session_token(&headers).as_deref(), Some("xyz"));
    }

    #[test]
    fn test_no_token() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_session_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_session_token(&headers), None);
    }

    #[test]
    fn test_error_status_codes() {
        let status = |e: ApiError| e.into_response().status();
        assert_eq!(status(ApiError::unauthorized("x")), StatusCode::UNAUTHORIZED);
        assert_eq!(status(ApiError::conflict("x")), StatusCode::CONFLICT);
        assert_eq!(
            status(ApiError::from(UserServiceError::RateLimited)),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status(ApiError::from(ReviewError::Tampered)),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status(ApiError::from(CourseServiceError::NotFound("Course".into()))),
            StatusCode::NOT_FOUND
        );
    }
}
