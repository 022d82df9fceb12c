//! Error taxonomy for the fee engine.

use crate::models::ConflictReport;
use service_core::error::AppError;
use thiserror::Error;
use uuid::Uuid;

/// Errors returned by fee engine operations.
///
/// Every variant is returned to the caller; nothing is logged and swallowed.
/// Only [`FeeError::Transaction`] is safe to retry, and only by re-running the
/// whole create operation.
#[derive(Debug, Error)]
pub enum FeeError {
    #[error("Validation error on `{field}`: {message}")]
    Validation { field: String, message: String },

    #[error("Conflicting fee structures: {0}")]
    Conflict(ConflictReport),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("An adjustment already exists for student {student_id} in term {term_id}")]
    AdjustmentExists { student_id: Uuid, term_id: Uuid },

    #[error("Concurrent write lost: {0}")]
    Transaction(anyhow::Error),

    #[error("Database error: {0}")]
    Database(anyhow::Error),
}

impl FeeError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        FeeError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        FeeError::NotFound { entity, id }
    }

    /// Whether the caller may retry the operation as a whole.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FeeError::Transaction(_))
    }

    /// Stable label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            FeeError::Validation { .. } => "validation",
            FeeError::Conflict(_) => "conflict",
            FeeError::NotFound { .. } => "not_found",
            FeeError::AdjustmentExists { .. } => "adjustment_exists",
            FeeError::Transaction(_) => "transaction",
            FeeError::Database(_) => "database",
        }
    }

    /// Classify a sqlx error. Serialization failures and deadlocks become
    /// [`FeeError::Transaction`]; everything else is a database error.
    pub(crate) fn from_sqlx(context: &str, err: sqlx::Error) -> Self {
        let code = err
            .as_database_error()
            .and_then(|db| db.code().map(|c| c.into_owned()));
        match code.as_deref() {
            Some("40001") | Some("40P01") => {
                FeeError::Transaction(anyhow::anyhow!("{}: {}", context, err))
            }
            _ => FeeError::Database(anyhow::anyhow!("{}: {}", context, err)),
        }
    }
}

impl From<validator::ValidationErrors> for FeeError {
    /// Reports the first offending field, ordered by field name so the result
    /// does not depend on hash ordering.
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<(String, String)> = errors
            .field_errors()
            .into_iter()
            .filter_map(|(field, errs)| {
                errs.first().map(|e| {
                    let message = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string());
                    (field.to_string(), message)
                })
            })
            .collect();
        fields.sort();

        match fields.into_iter().next() {
            Some((field, message)) => FeeError::Validation { field, message },
            None => FeeError::validation("request", "invalid input"),
        }
    }
}

impl From<FeeError> for AppError {
    fn from(err: FeeError) -> Self {
        match err {
            FeeError::Validation { .. } => AppError::BadRequest(anyhow::anyhow!(err.to_string())),
            FeeError::Conflict(_) | FeeError::AdjustmentExists { .. } => {
                AppError::Conflict(anyhow::anyhow!(err.to_string()))
            }
            FeeError::NotFound { .. } => AppError::NotFound(anyhow::anyhow!(err.to_string())),
            FeeError::Transaction(_) => AppError::ServiceUnavailable,
            FeeError::Database(e) => AppError::DatabaseError(e),
        }
    }
}
