use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::repositories::StoreError;
use crate::services::errors::LifecycleError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    detail: String,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    current: Option<String>,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized(&'static str),
    Forbidden(&'static str),
    Unprocessable(String),
    NotFound(String),
    /// Wrong lifecycle state; `current` is the state the record is in.
    State { detail: String, current: String },
    Conflict(String),
    ServiceUnavailable(String),
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }

    fn parts(self) -> (StatusCode, &'static str, String, Option<String>) {
        match self {
            Self::Unauthorized(message) => {
                (StatusCode::UNAUTHORIZED, "unauthorized", message.to_string(), None)
            }
            Self::Forbidden(message) => {
                (StatusCode::FORBIDDEN, "forbidden", message.to_string(), None)
            }
            Self::Unprocessable(message) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "validation", message, None)
            }
            Self::NotFound(message) => (StatusCode::NOT_FOUND, "not_found", message, None),
            Self::State { detail, current } => (StatusCode::CONFLICT, "state", detail, Some(current)),
            Self::Conflict(message) => (StatusCode::CONFLICT, "conflict", message, None),
            Self::ServiceUnavailable(message) => {
                (StatusCode::SERVICE_UNAVAILABLE, "store", message, None)
            }
            Self::Internal(message) => {
                tracing::error!(error = %message, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", message, None)
            }
        }
    }
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::Validation(message) => Self::Unprocessable(message),
            LifecycleError::State { message, current } => Self::State { detail: message, current },
            LifecycleError::Conflict(message) => Self::Conflict(message),
            LifecycleError::NotFound(message) => Self::NotFound(message),
            LifecycleError::Store(err) => {
                tracing::error!(error = %err, "Store unavailable");
                Self::ServiceUnavailable("Store unavailable, retry later".to_string())
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        LifecycleError::from(err).into()
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Unprocessable(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let challenge = matches!(self, ApiError::Unauthorized(_));
        let (status, kind, detail, current) = self.parts();
        let mut response =
            (status, Json(ErrorResponse { status: status.as_u16(), detail, kind, current }))
                .into_response();
        if challenge {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
