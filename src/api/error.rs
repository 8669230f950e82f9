//! HTTP error responses.
//!
//! Every failure leaves the API as
//! `{"type":"error","status":404,"code":"NotFound","message":"..."}` so
//! clients can branch on `code` without parsing messages.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use crate::auth::models::AuthError;
use crate::errors::KeelsonError;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

/// Wire shape of an error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    #[serde(rename = "type")]
    #[schema(example = "error")]
    pub kind: String,
    #[schema(example = 404)]
    pub status: u16,
    #[schema(example = "NotFound")]
    pub code: String,
    pub message: String,
}

impl ApiError {
    fn new<S: Into<String>>(status: StatusCode, code: &'static str, message: S) -> Self {
        Self { status, code, message: message.into() }
    }

    pub fn unauthorized<S: Into<String>>(msg: S) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized", msg)
    }

    pub fn bad_request<S: Into<String>>(msg: S) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "InvalidFormat", msg)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            kind: "error".to_string(),
            status: self.status.as_u16(),
            code: self.code.to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<KeelsonError> for ApiError {
    fn from(err: KeelsonError) -> Self {
        let status = StatusCode::from_u16(err.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        // Infrastructure details stay in the logs.
        let message = if status.is_server_error() {
            error!(error = %err, "request failed with internal error");
            "internal server error".to_string()
        } else {
            err.to_string()
        };

        Self::new(status, err.code(), message)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingBearer | AuthError::MalformedBearer | AuthError::TokenNotFound => {
                ApiError::unauthorized(err.to_string())
            }
            AuthError::Persistence(inner) => ApiError::from(inner),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(e) => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, "InvalidBodyContent", e.body_text())
            }
            other => ApiError::bad_request(other.body_text()),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::from(KeelsonError::from(errors))
    }
}
