//! Error handling for the Agro Inventory Platform
//!
//! Provides consistent error responses in Spanish and English

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::{DomainError, StockShortfall};
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Authentication errors
    #[error("Insufficient permissions")]
    InsufficientPermissions,

    // Validation errors
    #[error("Validation error: {message}")]
    Validation {
        field: String,
        message: String,
        message_es: String,
    },

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Ledger and engine errors
    #[error(transparent)]
    Domain(#[from] DomainError),

    // Store errors
    #[error("Store call timed out: {0}")]
    StoreTimeout(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field = errors
            .field_errors()
            .keys()
            .next()
            .map(|f| f.to_string())
            .unwrap_or_default();
        AppError::Validation {
            field,
            message: errors.to_string(),
            message_es: "Datos no válidos".to_string(),
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message_en: String,
    pub message_es: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<StockShortfall>>,
}

impl ErrorDetail {
    fn new(code: &str, message_en: String, message_es: String) -> Self {
        Self {
            code: code.to_string(),
            message_en,
            message_es,
            field: None,
            details: None,
        }
    }
}

fn shortfall_es(shortfall: &StockShortfall) -> String {
    format!(
        "{}: Stock insuficiente (Disponible: {} {}, Requerido: {} {})",
        shortfall.product_name, shortfall.available, shortfall.unit, shortfall.requested, shortfall.unit
    )
}

fn domain_response(error: &DomainError) -> (StatusCode, ErrorDetail) {
    let message_en = error.to_string();
    match error {
        DomainError::InvalidHectares(_) => (
            StatusCode::BAD_REQUEST,
            ErrorDetail {
                field: Some("hectares".to_string()),
                ..ErrorDetail::new(
                    "INVALID_HECTARES",
                    message_en,
                    "Las hectáreas deben ser mayores a 0".to_string(),
                )
            },
        ),
        DomainError::InvalidQuantity(product) => (
            StatusCode::BAD_REQUEST,
            ErrorDetail {
                field: Some("quantity".to_string()),
                ..ErrorDetail::new(
                    "INVALID_QUANTITY",
                    message_en,
                    format!("{}: La cantidad debe ser mayor a 0", product),
                )
            },
        ),
        DomainError::Validation { field, message } => (
            StatusCode::BAD_REQUEST,
            ErrorDetail {
                field: Some(field.clone()),
                ..ErrorDetail::new("VALIDATION_ERROR", message.clone(), format!("Dato no válido: {}", field))
            },
        ),
        DomainError::NotFound(resource) => (
            StatusCode::NOT_FOUND,
            ErrorDetail::new("NOT_FOUND", message_en, format!("No encontrado: {}", resource)),
        ),
        DomainError::AlreadyApplied(_) => (
            StatusCode::CONFLICT,
            ErrorDetail::new(
                "ALREADY_APPLIED",
                message_en,
                "Esta dosificación ya fue aplicada".to_string(),
            ),
        ),
        DomainError::StaleStock { .. } => (
            StatusCode::CONFLICT,
            ErrorDetail::new(
                "STALE_STOCK",
                message_en,
                "El stock cambió mientras se procesaba la operación, inténtalo de nuevo".to_string(),
            ),
        ),
        DomainError::InsufficientStock(shortfalls) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            ErrorDetail {
                details: Some(shortfalls.clone()),
                ..ErrorDetail::new(
                    "INSUFFICIENT_STOCK",
                    message_en,
                    shortfalls.iter().map(shortfall_es).collect::<Vec<_>>().join("; "),
                )
            },
        ),
        DomainError::UnresolvedProduct(product) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            ErrorDetail::new(
                "UNRESOLVED_PRODUCT",
                message_en,
                format!("{}: Producto no encontrado en inventario", product),
            ),
        ),
        DomainError::PresentationRequired(product) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            ErrorDetail {
                field: Some("presentation_id".to_string()),
                ..ErrorDetail::new(
                    "PRESENTATION_REQUIRED",
                    message_en,
                    format!("{}: Selecciona una presentación", product),
                )
            },
        ),
        DomainError::InvalidStateTransition { from, to } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            ErrorDetail::new(
                "INVALID_STATE_TRANSITION",
                message_en,
                format!("No se puede pasar de {} a {}", from, to),
            ),
        ),
        DomainError::SnapshotMismatch(_) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            ErrorDetail::new(
                "SNAPSHOT_MISMATCH",
                message_en,
                "El movimiento de stock no es consistente".to_string(),
            ),
        ),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = match &self {
            AppError::InsufficientPermissions => (
                StatusCode::FORBIDDEN,
                ErrorDetail::new(
                    "INSUFFICIENT_PERMISSIONS",
                    "You do not have permission to perform this action".to_string(),
                    "No tienes permiso para realizar esta acción".to_string(),
                ),
            ),
            AppError::Validation { field, message, message_es } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail {
                    field: Some(field.clone()),
                    ..ErrorDetail::new("VALIDATION_ERROR", message.clone(), message_es.clone())
                },
            ),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorDetail::new(
                    "NOT_FOUND",
                    format!("{} not found", resource),
                    format!("No encontrado: {}", resource),
                ),
            ),
            AppError::Domain(error) => domain_response(error),
            AppError::StoreTimeout(operation) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorDetail::new(
                    "STORE_TIMEOUT",
                    format!("The data store did not answer in time ({})", operation),
                    "El almacén de datos no respondió a tiempo".to_string(),
                ),
            ),
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new(
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                    "Ocurrió un error en la base de datos".to_string(),
                ),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("INTERNAL_ERROR", msg.clone(), "Error interno del servidor".to_string()),
            ),
        };

        // Log the error for debugging
        tracing::error!("Error: {:?}", self);

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
