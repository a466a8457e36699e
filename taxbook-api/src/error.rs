/// Error handling for the API server
///
/// This module provides a unified error type that maps to HTTP responses.
/// All handlers should return `Result<T, ApiError>` which automatically
/// converts to appropriate HTTP status codes.
///
/// Tenant lifecycle errors map as follows:
///
/// | `TenantError`         | status |
/// |-----------------------|--------|
/// | `NotFound`            | 404    |
/// | `DuplicateTenant`     | 409    |
/// | `Validation`          | 422    |
/// | `Connectivity`        | 503    |
/// | `PartialProvisioning` | 500    |
/// | `Database`            | 500    |
///
/// # Example
///
/// ```ignore
/// use taxbook_api::error::{ApiError, ApiResult};
/// use axum::Json;
/// use serde_json::json;
///
/// async fn handler() -> ApiResult<Json<serde_json::Value>> {
///     // Business logic that can fail
///     let data = fetch_data().await?;
///     Ok(Json(json!({ "data": data })))
/// }
/// ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use taxbook_shared::error::{is_unique_violation, TenantError};
use taxbook_shared::models::InvoiceError;

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type
#[derive(Debug)]
pub enum ApiError {
    /// Bad request (400)
    BadRequest(String),

    /// Not found (404)
    NotFound(String),

    /// Conflict (409) - e.g., duplicate tax identifier
    Conflict(String),

    /// Unprocessable entity (422) - validation errors
    ValidationError(Vec<ValidationErrorDetail>),

    /// Internal server error (500)
    InternalError(String),

    /// Service unavailable (503)
    ServiceUnavailable(String),
}

/// Validation error detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    /// Field that failed validation
    pub field: String,

    /// Error message
    pub message: String,
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code (e.g., "not_found", "conflict")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// Optional validation errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl ApiError {
    /// Single-field validation error
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        ApiError::ValidationError(vec![ValidationErrorDetail {
            field: field.to_string(),
            message: message.into(),
        }])
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::ValidationError(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg, None),
            ApiError::ValidationError(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                "Request validation failed".to_string(),
                Some(errors),
            ),
            ApiError::InternalError(msg) => {
                // Log internal errors but don't expose details to clients
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            ApiError::ServiceUnavailable(msg) => {
                tracing::warn!("Service unavailable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "service_unavailable",
                    msg,
                    None,
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            details,
        });

        (status, body).into_response()
    }
}

/// Convert sqlx errors to API errors
impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                ApiError::ServiceUnavailable("Database unavailable".to_string())
            }
            ref e if is_unique_violation(e) => {
                ApiError::Conflict("Record already exists".to_string())
            }
            _ => ApiError::InternalError(format!("Database error: {}", err)),
        }
    }
}

/// Convert tenant lifecycle errors to API errors
impl From<TenantError> for ApiError {
    fn from(err: TenantError) -> Self {
        match err {
            TenantError::NotFound(key) => ApiError::NotFound(format!("Tenant not found: {}", key)),
            TenantError::DuplicateTenant(msg) => ApiError::Conflict(msg),
            TenantError::Validation(msg) => ApiError::invalid("tenant", msg),
            TenantError::Connectivity { database, .. } => {
                let target = if database.is_empty() {
                    "database server".to_string()
                } else {
                    format!("database `{}`", database)
                };
                ApiError::ServiceUnavailable(format!("Cannot reach {}", target))
            }
            err @ TenantError::PartialProvisioning { .. } => ApiError::InternalError(err.to_string()),
            TenantError::Database(e) => ApiError::InternalError(format!("Database error: {}", e)),
        }
    }
}

/// Convert invoice errors to API errors
impl From<InvoiceError> for ApiError {
    fn from(err: InvoiceError) -> Self {
        match err {
            InvoiceError::InvalidRate(rate) => {
                ApiError::invalid("rate", format!("Invalid tax rate: {}", rate))
            }
            InvoiceError::InvalidAmount(message) => ApiError::invalid("items", message),
            InvoiceError::NoItems => ApiError::invalid("items", "Invoice must have at least one item"),
            InvoiceError::DuplicateNumber(number) => {
                ApiError::Conflict(format!("Invoice number already exists: {}", number))
            }
            InvoiceError::Database(e) => e.into(),
        }
    }
}

/// Convert validator errors to API errors
impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut details: Vec<ValidationErrorDetail> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| ValidationErrorDetail {
                    field: field.to_string(),
                    message: e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string()),
                })
            })
            .collect();

        if details.is_empty() {
            // Nested (per-item) failures only show up in the summary
            details.push(ValidationErrorDetail {
                field: "request".to_string(),
                message: errors.to_string(),
            });
        }

        details.sort_by(|a, b| a.field.cmp(&b.field));
        ApiError::ValidationError(details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ApiError::BadRequest("Invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: Invalid input");

        let err = ApiError::NotFound("Tenant not found".to_string());
        assert_eq!(err.to_string(), "Not found: Tenant not found");
    }

    #[test]
    fn test_validation_error() {
        let errors = vec![
            ValidationErrorDetail {
                field: "seller_ntn_cnic".to_string(),
                message: "Tax identifier must be 1-50 characters".to_string(),
            },
            ValidationErrorDetail {
                field: "seller_business_name".to_string(),
                message: "Business name must be 1-255 characters".to_string(),
            },
        ];

        let err = ApiError::ValidationError(errors);
        assert_eq!(err.to_string(), "Validation failed: 2 errors");
    }

    fn status_of(err: TenantError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_tenant_error_status_codes() {
        use taxbook_shared::models::ProvisioningState;

        assert_eq!(status_of(TenantError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_of(TenantError::DuplicateTenant("x".into())), StatusCode::CONFLICT);
        assert_eq!(
            status_of(TenantError::Validation("x".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(TenantError::Connectivity {
                database: "tenant_a".into(),
                source: sqlx::Error::PoolTimedOut,
            }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(TenantError::partial(
                "tenant_a",
                ProvisioningState::DbCreated,
                TenantError::Database(sqlx::Error::PoolTimedOut),
            )),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_invoice_error_status_codes() {
        let status = ApiError::from(InvoiceError::NoItems).into_response().status();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let status = ApiError::from(InvoiceError::InvalidAmount("quantity must be positive: 0".into()))
            .into_response()
            .status();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let status = ApiError::from(InvoiceError::DuplicateNumber("INV-1".into()))
            .into_response()
            .status();
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
