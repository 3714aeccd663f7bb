use axum::{
    extract::multipart::MultipartError,
    response::{IntoResponse, Response},
    Json,
};
use http::StatusCode;
use serde::Serialize;
use tracing::{debug, error};

use crate::cover::CoverError;

pub type Error = anyhow::Error;
pub type Result<T, E = Error> = std::result::Result<T, E>;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Missing or invalid access token")]
    Unauthorized,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Unprocessable request: {0}")]
    UnprocessableRequest(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::Unauthorized => "unauthorized",
            ApiError::InvalidRequest(_)
            | ApiError::InvalidQuery(_)
            | ApiError::UnprocessableRequest(_) => "validation",
            ApiError::Unavailable(_) => "unavailable",
            ApiError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::InvalidRequest(_) | ApiError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            ApiError::UnprocessableRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            ApiError::Internal(detail) => {
                error!("Internal error: {detail}");
                "Internal server error".to_string()
            }
            ApiError::Unauthorized => self.to_string(),
            ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::Forbidden(msg)
            | ApiError::InvalidRequest(msg)
            | ApiError::InvalidQuery(msg)
            | ApiError::UnprocessableRequest(msg)
            | ApiError::Unavailable(msg) => msg.clone(),
        };
        let body = ErrorBody {
            error: self.kind(),
            message,
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<bookrev_dal::Error> for ApiError {
    fn from(e: bookrev_dal::Error) -> Self {
        use bookrev_dal::Error as DalError;
        debug!("Data layer error: {e}");
        match e {
            DalError::RecordNotFound(what) => ApiError::NotFound(format!("{what} not found")),
            DalError::DuplicateReview { .. } => {
                ApiError::Conflict("You have already reviewed this book".to_string())
            }
            DalError::FailedUpdate { .. } => ApiError::Conflict(e.to_string()),
            DalError::NotReviewOwner { .. } => {
                ApiError::Forbidden("You can change only your own reviews".to_string())
            }
            DalError::AdminRequired => ApiError::Forbidden(e.to_string()),
            DalError::MissingVersion => ApiError::InvalidRequest(e.to_string()),
            DalError::InvalidOrderByField(_) => ApiError::InvalidQuery(e.to_string()),
            DalError::DatabaseError(_) | DalError::MigrationError(_) => {
                ApiError::Internal(e.to_string())
            }
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        ApiError::InvalidRequest(format!("Invalid multipart request: {}", e.body_text()))
    }
}

impl From<CoverError> for ApiError {
    fn from(e: CoverError) -> Self {
        error!("Cover image hosting failed: {e}");
        ApiError::Unavailable("Image hosting is not available".to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e.to_string())
    }
}
