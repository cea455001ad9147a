//! Response envelope shared by every control endpoint

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::store::StoreError;
use crate::CirrusError;

/// Outcome code carried in every response body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    Ok = 0,
    /// The request was taken; its effect completes asynchronously
    Accepted = 1,
    Failure = 2,
    BadRequest = 3,
}

impl Code {
    fn status(self) -> StatusCode {
        match self {
            Self::Ok => StatusCode::OK,
            Self::Accepted => StatusCode::ACCEPTED,
            Self::Failure => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadRequest => StatusCode::BAD_REQUEST,
        }
    }

    fn message(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Accepted => "accepted",
            Self::Failure => "failure",
            Self::BadRequest => "bad request",
        }
    }
}

/// Generic API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub code: u8,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    status: StatusCode,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self::with_code(Code::Ok, Some(data))
    }

    pub fn accepted(data: T) -> Self {
        Self::with_code(Code::Accepted, Some(data))
    }

    fn with_code(code: Code, data: Option<T>) -> Self {
        Self {
            code: code as u8,
            msg: code.message().to_string(),
            data,
            error: None,
            status: code.status(),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// Error side of a handler result
#[derive(Debug)]
pub struct ApiError {
    code: Code,
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            code: Code::BadRequest,
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            code: Code::Failure,
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    /// A well-formed request the daemon cannot honor in its current state
    pub fn conflict(message: impl Into<String>) -> Self {
        Self {
            code: Code::BadRequest,
            status: StatusCode::CONFLICT,
            message: message.into(),
        }
    }
}

impl From<CirrusError> for ApiError {
    fn from(err: CirrusError) -> Self {
        match err {
            CirrusError::InvalidRoot(_) => Self::bad_request(err.to_string()),
            CirrusError::InvalidTransition(_) => Self::conflict(err.to_string()),
            CirrusError::Store(StoreError::InvalidQuery(_)) => Self::bad_request(err.to_string()),
            other => Self::failure(other.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        CirrusError::from(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.code == Code::Failure {
            tracing::error!("Request failed: {}", self.message);
        } else {
            tracing::warn!("Request rejected: {}", self.message);
        }

        let body = ApiResponse::<()> {
            code: self.code as u8,
            msg: self.code.message().to_string(),
            data: None,
            error: Some(self.message),
            status: self.status,
        };
        (self.status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<ApiResponse<T>, ApiError>;
