// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use crate::services::extraction::ExtractionError;
use crate::services::quota::QuotaStatus;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use validator::{ValidationErrors, ValidationErrorsKind};

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Upload quota exhausted")]
    QuotaExceeded(QuotaStatus),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Payment webhook verification failed: {0}")]
    PaymentVerification(String),

    #[error("Payment provider error: {0}")]
    PaymentProvider(String),

    #[error("Blob storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// JSON error response body
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    issues: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    quota_status: Option<QuotaStatus>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut issues = None;
        let mut quota_status = None;

        let (status, error, details) = match self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "invalid_credentials", None)
            }
            AppError::Validation(list) => {
                issues = Some(list);
                (StatusCode::BAD_REQUEST, "validation_failed", None)
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", Some(msg)),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", Some(msg)),
            AppError::QuotaExceeded(status) => {
                quota_status = Some(status);
                (
                    StatusCode::PAYMENT_REQUIRED,
                    "quota_exceeded",
                    Some("No uploads remaining; purchase more credits to continue".to_string()),
                )
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg)),
            AppError::Extraction(err) => {
                tracing::warn!(error = %err, "Extraction failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "processing_failed",
                    Some(err.to_string()),
                )
            }
            AppError::PaymentVerification(msg) => {
                tracing::warn!(reason = %msg, "Payment webhook rejected");
                (StatusCode::BAD_REQUEST, "webhook_verification_failed", None)
            }
            AppError::PaymentProvider(msg) => {
                tracing::error!(error = %msg, "Payment provider error");
                (StatusCode::BAD_GATEWAY, "payment_error", None)
            }
            AppError::Storage(msg) => {
                tracing::error!(error = %msg, "Blob storage error");
                (StatusCode::INTERNAL_SERVER_ERROR, "storage_error", None)
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
            issues,
            quota_status,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;

/// Flatten validator errors into `path: reason` strings using JSON field names.
pub fn collect_issues(prefix: &str, errors: &ValidationErrors, out: &mut Vec<String>) {
    for (field, kind) in errors.errors() {
        let path = format!("{}{}", prefix, camel_case(field));
        match kind {
            ValidationErrorsKind::Field(list) => {
                for err in list {
                    let reason = err.message.as_ref().unwrap_or(&err.code);
                    out.push(format!("{}: {}", path, reason));
                }
            }
            ValidationErrorsKind::Struct(inner) => {
                collect_issues(&format!("{}.", path), inner, out);
            }
            ValidationErrorsKind::List(entries) => {
                for (index, inner) in entries {
                    collect_issues(&format!("{}[{}].", path, index), inner, out);
                }
            }
        }
    }
}

fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Line {
        #[validate(length(min = 1, message = "is required"))]
        raw_name: String,
    }

    #[derive(Validate)]
    struct Sheet {
        #[validate(email)]
        contact_email: String,
        #[validate(nested)]
        items: Vec<Line>,
    }

    #[test]
    fn test_collect_issues_uses_json_paths() {
        let sheet = Sheet {
            contact_email: "nope".to_string(),
            items: vec![
                Line { raw_name: "Dolo 650".to_string() },
                Line { raw_name: String::new() },
            ],
        };
        let errors = sheet.validate().unwrap_err();

        let mut issues = Vec::new();
        collect_issues("body.", &errors, &mut issues);
        issues.sort();

        assert_eq!(
            issues,
            vec![
                "body.contactEmail: email".to_string(),
                "body.items[1].rawName: is required".to_string(),
            ]
        );
    }
}
