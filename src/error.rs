// src/error.rs
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use std::fmt;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    InternalServerError(String),
    ValidationError(String),
    DatabaseError(sqlx::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    debug: Option<String>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::InternalServerError(msg) => write!(f, "Internal Server Error: {}", msg),
            ApiError::ValidationError(msg) => write!(f, "Validation Error: {}", msg),
            ApiError::DatabaseError(err) => write!(f, "Database Error: {}", err),
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    /// Message safe to show to an admin. Database internals stay out of it.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::DatabaseError(_) => "A database error occurred".to_string(),
            ApiError::InternalServerError(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        }
    }

    fn debug_detail(&self) -> Option<String> {
        if !cfg!(debug_assertions) {
            return None;
        }
        match self {
            ApiError::DatabaseError(err) => Some(err.to_string()),
            ApiError::InternalServerError(msg) => Some(msg.clone()),
            _ => None,
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::DatabaseError(_) | ApiError::InternalServerError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        if matches!(self, ApiError::DatabaseError(_) | ApiError::InternalServerError(_)) {
            log::error!("{}", self);
        }

        let error_response = ErrorResponse {
            success: false,
            message: self.public_message(),
            debug: self.debug_detail(),
        };

        HttpResponse::build(self.status_code()).json(error_response)
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::DatabaseError(err)
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::ValidationError(err.to_string())
    }
}

impl ApiError {
    pub fn donor_not_found(id: i64) -> Self {
        ApiError::NotFound(format!("Donor with ID '{}' not found", id))
    }

    pub fn unit_not_found(unit_id: &str) -> Self {
        ApiError::NotFound(format!("Inventory unit '{}' not found", unit_id))
    }

    pub fn request_not_found(id: i64) -> Self {
        ApiError::NotFound(format!("Blood request with ID '{}' not found", id))
    }

    pub fn invalid_filter(field: &str, value: &str) -> Self {
        ApiError::ValidationError(format!("Invalid value '{}' for filter '{}'", value, field))
    }

    pub fn invalid_transition(entity: &str, from: &str, to: &str) -> Self {
        ApiError::BadRequest(format!("Cannot change {} status from '{}' to '{}'", entity, from, to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::ValidationError("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::donor_not_found(7).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::DatabaseError(sqlx::Error::RowNotFound).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_database_error_message_is_generic() {
        let err = ApiError::DatabaseError(sqlx::Error::Protocol("table blood_inventory is locked".into()));
        assert_eq!(err.public_message(), "A database error occurred");
        assert!(err.to_string().contains("locked"));
    }

    #[test]
    fn test_invalid_filter_names_field() {
        let err = ApiError::invalid_filter("blood_type", "C+");
        assert!(err.public_message().contains("blood_type"));
        assert!(err.public_message().contains("C+"));
    }
}
