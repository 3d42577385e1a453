//! HTTP API for the resource community
//!
//! Provides REST APIs for:
//! - Resources (browse, upload, download, reviews, favorites, progress)
//! - The caller's own wallet and history
//! - Bounty requests
//! - Moderation and administration
//! - Security middleware (bearer auth, rate limiting, headers)
//!
//! Handlers stay thin: they turn HTTP input into engine calls and engine
//! errors into status codes. All business rules live in [`crate::engine`].

pub mod admin;
pub mod auth;
pub mod middleware;
pub mod requests;
pub mod resources;
pub mod users;

pub use auth::{Claims, TokenVerifier};
pub use middleware::{
    auth_middleware, logging_middleware, rate_limit_middleware, security_headers_middleware,
    RateLimiter, SecurityMiddlewareConfig, SecurityState,
};

use axum::{
    extract::{DefaultBodyLimit, FromRequestParts},
    http::{request::Parts, StatusCode},
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::convert::Infallible;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::engine::{Caller, Engine};
use crate::error::EngineError;

/// Headroom for multipart framing and metadata fields on top of the file itself
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// API state shared by every handler
#[derive(Clone)]
pub struct ApiState {
    pub engine: Engine,
}

/// Engine error rendered as a JSON response
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            EngineError::DuplicateContent { .. } => StatusCode::CONFLICT,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Unauthorized => StatusCode::UNAUTHORIZED,
            EngineError::Forbidden(_) => StatusCode::FORBIDDEN,
            EngineError::InsufficientPoints { .. } => StatusCode::BAD_REQUEST,
            EngineError::InvalidTransition { .. } => StatusCode::CONFLICT,
            EngineError::MalwareDetected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::ScanFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::StorageFailure(_) | EngineError::PersistenceFailure(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            // Internal details stay in the log
            error!(error = %self.0, code = self.0.code(), "Request failed");
            "Internal server error".to_string()
        } else {
            self.0.to_string()
        };

        let mut body = json!({
            "error": message,
            "code": self.0.code(),
        });
        if let EngineError::DuplicateContent { existing_id } = &self.0 {
            body["resourceId"] = json!(existing_id);
        }

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Authenticated caller; rejects anonymous requests with 401
#[derive(Debug, Clone, Copy)]
pub struct AuthCaller(pub Caller);

impl<S: Send + Sync> FromRequestParts<S> for AuthCaller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Caller>()
            .copied()
            .map(AuthCaller)
            .ok_or(ApiError(EngineError::Unauthorized))
    }
}

/// Caller if a valid bearer token was presented
#[derive(Debug, Clone, Copy)]
pub struct MaybeCaller(pub Option<Caller>);

impl<S: Send + Sync> FromRequestParts<S> for MaybeCaller {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeCaller(parts.extensions.get::<Caller>().copied()))
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Assemble the full API with its middleware stack
pub fn create_router(engine: Engine, security: SecurityState) -> Router {
    let body_limit = engine.config().max_upload_bytes + MULTIPART_OVERHEAD_BYTES;
    let state = ApiState { engine };

    let api = Router::new()
        .nest("/resources", resources::router())
        .nest("/user", users::router())
        .nest("/requests", requests::router())
        .nest("/admin", admin::router())
        .with_state(state);

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(from_fn_with_state(security.clone(), auth_middleware))
        .layer(from_fn_with_state(security.clone(), logging_middleware))
        .layer(from_fn_with_state(security, rate_limit_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (EngineError::validation("x"), StatusCode::BAD_REQUEST),
            (
                EngineError::UnsupportedFormat(".exe".into()),
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ),
            (
                EngineError::DuplicateContent {
                    existing_id: Uuid::new_v4(),
                },
                StatusCode::CONFLICT,
            ),
            (EngineError::Unauthorized, StatusCode::UNAUTHORIZED),
            (EngineError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (
                EngineError::InsufficientPoints {
                    balance: 0,
                    required: 5,
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                EngineError::MalwareDetected {
                    threat: "Eicar".into(),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (EngineError::ScanFailure("down".into()), StatusCode::SERVICE_UNAVAILABLE),
            (
                EngineError::PersistenceFailure("db".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(ApiError(error).status(), status);
        }
    }

    #[tokio::test]
    async fn test_duplicate_body_carries_resource_id() {
        let id = Uuid::new_v4();
        let response = ApiError(EngineError::DuplicateContent { existing_id: id }).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "duplicate_content");
        assert_eq!(body["resourceId"], id.to_string());
    }

    #[tokio::test]
    async fn test_internal_errors_are_not_leaked() {
        let response =
            ApiError(EngineError::PersistenceFailure("password=hunter2".into())).into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(!text.contains("hunter2"));
    }
}
