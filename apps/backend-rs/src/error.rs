use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failures raised by the agreement engine.
///
/// None of these are retried: each names a condition a person has to fix
/// (fill a field, settle an invoice, configure a series or category).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Precondition(String),

    #[error("{0}")]
    Configuration(String),
}

impl EngineError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Precondition(_) => "precondition",
            Self::Configuration(_) => "configuration",
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    UnprocessableEntity(String),

    #[error("{0}")]
    Internal(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            Self::UnprocessableEntity(_) => (StatusCode::UNPROCESSABLE_ENTITY, "unprocessable"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
            Self::Engine(error) => {
                let status = match error {
                    EngineError::Validation(_) => StatusCode::BAD_REQUEST,
                    EngineError::Precondition(_) => StatusCode::CONFLICT,
                    EngineError::Configuration(_) => StatusCode::UNPROCESSABLE_ENTITY,
                };
                (status, error.kind())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        let message = match &self {
            Self::Internal(detail) => {
                tracing::error!(error = %detail, "Internal error");
                "Internal error".to_string()
            }
            Self::Engine(EngineError::Configuration(detail)) => {
                tracing::error!(error = %detail, "Engine configuration error");
                detail.clone()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": message,
            "kind": kind,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
