use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::database::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid request body")]
    MalformedPayload,

    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("Upload too large: {size} bytes (limit {limit} bytes)")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Missing timestamp parameter")]
    MissingTimestamp,

    #[error("Invalid timestamp parameter: {0}")]
    InvalidTimestamp(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Store unavailable")]
    Store(#[from] StoreError),

    #[error("Stored collection is corrupt")]
    Corrupt(#[from] serde_json::Error),
}

impl AppError {
    fn kind(&self) -> &'static str {
        match self {
            AppError::MalformedPayload
            | AppError::MissingFields(_)
            | AppError::MissingTimestamp
            | AppError::InvalidTimestamp(_)
            | AppError::UnknownAction(_) => "ValidationError",
            AppError::PayloadTooLarge { .. } => "PayloadTooLarge",
            AppError::MethodNotAllowed => "MethodNotSupported",
            AppError::Store(_) => "StoreError",
            AppError::Corrupt(_) => "SerializationError",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = match &self {
            AppError::MissingFields(fields) => json!({
                "error": "Missing required fields",
                "missing": fields,
            }),
            AppError::PayloadTooLarge { size, limit } => json!({
                "error": "Upload too large",
                "size": format_size(*size),
                "limit": format_size(*limit),
                "suggestion": "Please compress or resize your image before uploading",
            }),
            AppError::Store(inner) => {
                error!("store failure: {inner}");
                internal_body(&self)
            }
            AppError::Corrupt(inner) => {
                error!("corrupt stored collection: {inner}");
                internal_body(&self)
            }
            _ => json!({ "error": self.to_string() }),
        };

        let status = match self {
            AppError::MalformedPayload
            | AppError::MissingFields(_)
            | AppError::MissingTimestamp
            | AppError::InvalidTimestamp(_)
            | AppError::UnknownAction(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            AppError::Store(_) | AppError::Corrupt(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(body)).into_response()
    }
}

// 500 bodies stay generic; the detail already went to the log.
fn internal_body(err: &AppError) -> serde_json::Value {
    json!({
        "error": "Internal server error",
        "message": err.to_string(),
        "type": err.kind(),
    })
}

pub fn format_size(bytes: usize) -> String {
    const MB: usize = 1024 * 1024;
    const KB: usize = 1024;

    if bytes >= MB {
        format!("{:.2}MB", bytes as f64 / MB as f64)
    } else {
        format!("{:.0}KB", bytes as f64 / KB as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_format_human_readable() {
        assert_eq!(format_size(4 * 1024 * 1024), "4.00MB");
        assert_eq!(format_size(500 * 1024), "500KB");
    }

    #[test]
    fn error_kinds_map_to_taxonomy() {
        assert_eq!(AppError::MalformedPayload.kind(), "ValidationError");
        assert_eq!(
            AppError::PayloadTooLarge { size: 1, limit: 1 }.kind(),
            "PayloadTooLarge"
        );
        assert_eq!(AppError::MethodNotAllowed.kind(), "MethodNotSupported");
        assert_eq!(AppError::Store(StoreError::Timeout).kind(), "StoreError");
    }
}
