use super::app_error::AppError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Error returned by the boundary commands.
///
/// Carries the HTTP status the hosting framework should answer with and the
/// JSON body to send, so routing code stays a one-liner.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Invalid request: {message}")]
    BadRequest { message: String },

    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Enhancement already in progress for {record_id}")]
    Conflict {
        record_id: String,
        held_by_user_id: String,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Body of a 409 response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConflictBody {
    pub error: String,
    pub enhancement_status: String,
    pub enhancement_user_id: String,
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest { .. } => 400,
            ApiError::NotFound { .. } => 404,
            ApiError::Conflict { .. } => 409,
            ApiError::Internal { .. } => 500,
        }
    }

    pub fn body(&self) -> Value {
        match self {
            ApiError::Conflict {
                held_by_user_id, ..
            } => {
                let body = ConflictBody {
                    error: self.to_string(),
                    enhancement_status: "in_progress".to_string(),
                    enhancement_user_id: held_by_user_id.clone(),
                };
                serde_json::to_value(body).unwrap_or_else(|_| json!({ "error": self.to_string() }))
            }
            _ => json!({ "error": self.to_string() }),
        }
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::LockConflict {
                record_id,
                held_by_user_id,
            } => ApiError::Conflict {
                record_id,
                held_by_user_id,
            },
            AppError::ValidationError(message) => ApiError::BadRequest { message },
            AppError::NotFound(resource) => ApiError::NotFound { resource },
            other => ApiError::Internal {
                message: other.to_string(),
            },
        }
    }
}
