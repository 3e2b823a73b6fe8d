//! Error handling for the uplift gateway
//!
//! This module provides:
//! - A closed set of error kinds surfaced to callers as `{type, msg, ...}` payloads
//! - HTTP status mapping, applied only at the response boundary
//! - Normalization of unexpected failures into the generic `{type, msg}` shape
//! - Error telemetry by kind and operation

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::fmt;

// =============================================================================
// ERROR KINDS
// =============================================================================

/// Kinds of failure a request can end with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// A document URL was denied by the service fetch policy
    FetchForbidden,
    /// No document source was supplied at all
    UnprocessableEntity,
    /// The document bytes are neither JSON nor YAML
    JsonDecode,
    /// The context or document failed engine-side validation
    Validation,
    /// A requested profile URI is not in the registry
    UnknownProfile,
    /// A request parameter is missing or has an unrecognized value
    InvalidParameter,
    /// Any other failure, carrying the name of the failing operation type
    Generic(String),
    /// A failure inside the gateway itself (archive or serialization)
    Internal,
}

impl ErrorKind {
    /// The `type` value written to error payloads
    pub fn type_name(&self) -> &str {
        match self {
            ErrorKind::FetchForbidden => "FetchForbidden",
            ErrorKind::UnprocessableEntity => "UnprocessableEntity",
            ErrorKind::JsonDecode => "JSONDecodeError",
            ErrorKind::Validation => "ValidationError",
            ErrorKind::UnknownProfile => "UnknownProfileError",
            ErrorKind::InvalidParameter => "InvalidParameter",
            ErrorKind::Generic(name) => name.as_str(),
            ErrorKind::Internal => "InternalError",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ErrorKind::FetchForbidden => StatusCode::FORBIDDEN,
            ErrorKind::UnprocessableEntity | ErrorKind::InvalidParameter => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ErrorKind::JsonDecode
            | ErrorKind::Validation
            | ErrorKind::UnknownProfile
            | ErrorKind::Generic(_) => StatusCode::BAD_REQUEST,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error category for metrics
    pub fn category(&self) -> &'static str {
        match self {
            ErrorKind::FetchForbidden => "policy",
            ErrorKind::UnprocessableEntity | ErrorKind::InvalidParameter => "client_error",
            ErrorKind::JsonDecode | ErrorKind::Validation => "validation_error",
            ErrorKind::UnknownProfile => "resource_not_found",
            ErrorKind::Generic(_) => "engine_error",
            ErrorKind::Internal => "server_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

// =============================================================================
// API ERROR
// =============================================================================

/// Structured error returned by every request path.
///
/// `extra` holds kind-specific payload fields (for `ValidationError`: `index`,
/// `property`, `value` and `cause`). They are serialized next to `type` and `msg`.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    pub extra: Map<String, Value>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            extra: Map::new(),
        }
    }

    pub fn fetch_forbidden() -> Self {
        Self::new(
            ErrorKind::FetchForbidden,
            "Fetch is forbidden from the requested URL",
        )
    }

    pub fn no_json_source() -> Self {
        Self::new(ErrorKind::UnprocessableEntity, "No JSON source specified")
    }

    pub fn json_decode() -> Self {
        Self::new(ErrorKind::JsonDecode, "Invalid JSON input")
    }

    pub fn unknown_profile(uri: &str) -> Self {
        Self::new(
            ErrorKind::UnknownProfile,
            format!("Unknown profile URI {uri}"),
        )
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParameter, message)
    }

    pub fn generic(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Generic(type_name.into()), message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Attach an extra payload field
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }

    /// Normalize an unexpected failure into the generic `{type, msg}` shape.
    ///
    /// The full error chain is logged; only the outermost message reaches the caller.
    pub fn unexpected(operation: &str, error: &anyhow::Error) -> Self {
        tracing::error!(operation, error = ?error, "unexpected failure");
        Self::generic("Exception", error.to_string())
    }

    /// The `{type, msg, ...}` payload object
    pub fn payload(&self) -> Value {
        let mut payload = Map::new();
        payload.insert("type".into(), Value::from(self.kind.type_name()));
        payload.insert("msg".into(), Value::from(self.message.clone()));
        for (key, value) in &self.extra {
            payload.insert(key.clone(), value.clone());
        }
        Value::Object(payload)
    }

    /// Add this error to telemetry and to the current operation span
    pub fn track(&self, operation: &str) {
        crate::metrics::METRICS.record_error(operation, self.kind.type_name());
        crate::logging::record_error_type(self.kind.type_name());
        tracing::debug!(
            error_type = %self.kind,
            operation,
            category = self.kind.category(),
            "error recorded"
        );
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.kind.status();
        (status, Json(json!({ "detail": self.payload() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ErrorKind::FetchForbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ErrorKind::UnprocessableEntity.status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(ErrorKind::JsonDecode.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorKind::UnknownProfile.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ErrorKind::Generic("HTTPError".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_payload_includes_extra_fields() {
        let error = ApiError::new(ErrorKind::Validation, "bad context")
            .with_field("index", Value::Null)
            .with_field("property", "context");

        let payload = error.payload();
        assert_eq!(payload["type"], "ValidationError");
        assert_eq!(payload["msg"], "bad context");
        assert_eq!(payload["property"], "context");
        assert!(payload.get("index").is_some());
    }

    #[test]
    fn test_generic_kind_uses_type_name() {
        let error = ApiError::generic("HTTPError", "404 Not Found");
        assert_eq!(error.payload()["type"], "HTTPError");
        assert_eq!(error.to_string(), "HTTPError: 404 Not Found");
    }

    #[test]
    fn test_track_counts_by_operation_and_type() {
        let error = ApiError::new(ErrorKind::UnknownProfile, "Unknown profile URI x");
        let counter = crate::metrics::METRICS
            .errors_total
            .get_or_create(&crate::metrics::ErrorLabels {
                operation: "track_test".into(),
                error_type: "UnknownProfileError".into(),
            })
            .clone();

        error.track("track_test");
        error.track("track_test");
        assert_eq!(counter.get(), 2);
    }
}
