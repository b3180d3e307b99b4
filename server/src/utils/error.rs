use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, warn};
use validator::ValidationErrors;

use crate::store::StoreError;
use crate::uploads::UploadError;
use crate::utils::response::error as error_response;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(#[from] ValidationErrors),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Email already registered for this event")]
    DuplicateRegistration,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("Upload error: {0}")]
    UploadError(#[from] UploadError),

    #[error("Internal server error")]
    InternalServerError(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) | AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::DuplicateRegistration | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::StoreError(e) => match e {
                StoreError::PermissionDenied => StatusCode::FORBIDDEN,
                StoreError::NotFound => StatusCode::NOT_FOUND,
                StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                StoreError::Timeout => StatusCode::GATEWAY_TIMEOUT,
                StoreError::Conflict(_) | StoreError::AlreadyExists => StatusCode::CONFLICT,
                StoreError::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
                StoreError::FailedPrecondition(_) => StatusCode::UNPROCESSABLE_ENTITY,
                StoreError::DataLoss(_) | StoreError::Cancelled | StoreError::Internal(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            AppError::UploadError(e) => match e {
                UploadError::UnsupportedType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                UploadError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                UploadError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) | AppError::InvalidInput(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::DuplicateRegistration => "DUPLICATE_REGISTRATION",
            AppError::Conflict(_) => "CONFLICT",
            AppError::StoreError(_) => "STORE_ERROR",
            AppError::UploadError(_) => "UPLOAD_ERROR",
            AppError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Message safe to show to the end user.
    pub fn public_message(&self) -> String {
        match self {
            AppError::ValidationError(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg) => msg.clone(),
            AppError::InvalidInput(_) => "The provided input is invalid".to_string(),
            AppError::DuplicateRegistration => {
                "This email is already registered for this event".to_string()
            }
            AppError::StoreError(e) => e.user_message().to_string(),
            AppError::UploadError(UploadError::UnsupportedType(_)) => {
                "Accepted formats: .jpg, .jpeg, .png, .webp".to_string()
            }
            AppError::UploadError(UploadError::TooLarge { limit, .. }) => {
                format!("Maximum image size is {} MB", limit / (1024 * 1024))
            }
            AppError::UploadError(UploadError::Io(_)) => "Failed to upload image".to_string(),
            AppError::InternalServerError(_) => "An unexpected error occurred".to_string(),
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            AppError::InvalidInput(errors) => {
                let fields: serde_json::Map<String, Value> = errors
                    .field_errors()
                    .into_iter()
                    .map(|(field, errs)| {
                        let messages: Vec<String> = errs
                            .iter()
                            .map(|e| {
                                e.message
                                    .as_ref()
                                    .map(|m| m.to_string())
                                    .unwrap_or_else(|| e.code.to_string())
                            })
                            .collect();
                        (field.to_string(), json!(messages))
                    })
                    .collect();
                Some(json!({ "fields": fields }))
            }
            _ => None,
        }
    }

    fn log(&self) {
        match self {
            AppError::ValidationError(msg) | AppError::NotFound(msg) | AppError::Conflict(msg) => {
                warn!(error = ?self, message = %msg, "Request rejected");
            }
            AppError::InvalidInput(errors) => {
                warn!(error = %errors, "Request rejected");
            }
            AppError::DuplicateRegistration => {
                warn!("Duplicate guest registration");
            }
            AppError::StoreError(e) => {
                error!(error = ?e, "Store error");
            }
            AppError::UploadError(e) => {
                error!(error = ?e, "Upload error");
            }
            AppError::InternalServerError(msg) => {
                error!(message = %msg, "Internal server error");
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        // Log internal details
        self.log();

        error_response(code, self.public_message(), self.details(), status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Signup {
        #[validate(length(min = 3, message = "Name must be at least 3 characters"))]
        name: String,
    }

    #[test]
    fn test_store_errors_map_to_status() {
        assert_eq!(
            AppError::from(StoreError::Timeout).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            AppError::from(StoreError::AlreadyExists).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(StoreError::Internal("boom".into())).public_message(),
            "An error occurred. Please try again"
        );
    }

    #[test]
    fn test_invalid_input_exposes_field_messages() {
        let errors = Signup { name: "ab".into() }.validate().unwrap_err();
        let err = AppError::from(errors);

        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        let details = err.details().unwrap();
        assert_eq!(
            details["fields"]["name"][0],
            "Name must be at least 3 characters"
        );
    }

    #[test]
    fn test_internal_details_are_not_exposed() {
        let err = AppError::InternalServerError("connection string leaked".into());
        assert_eq!(err.public_message(), "An unexpected error occurred");
    }
}
