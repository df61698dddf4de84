//! Error types for mediatag-ingest
//!
//! `PipelineError` is the taxonomy every invocation fails with. Two variants are
//! permanent for the given input; the rest are expected to clear on redelivery
//! of the whole event.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::{LabelServiceError, StoreError};
use crate::types::ObjectRef;

/// Annotation sub-step that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationStep {
    Metadata,
    Tags,
}

impl std::fmt::Display for AnnotationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnnotationStep::Metadata => write!(f, "metadata"),
            AnnotationStep::Tags => write!(f, "tags"),
        }
    }
}

/// Pipeline error
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Notification payload has no records or an unreadable record
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    /// Detection service cannot decode the object as an image
    #[error("Unsupported image format for '{object}': {message}")]
    UnsupportedFormat { object: ObjectRef, message: String },

    /// Any other detection failure
    #[error("Label detection failed for '{object}': {source}")]
    DetectionService {
        object: ObjectRef,
        #[source]
        source: LabelServiceError,
    },

    /// Metadata or tag write-back failed
    #[error("Annotation write ({step}) failed for '{object}': {source}")]
    AnnotationWrite {
        object: ObjectRef,
        step: AnnotationStep,
        #[source]
        source: StoreError,
    },

    /// A tag record could not be written
    #[error("Index write failed for '{object}': {reason}")]
    IndexWrite { object: ObjectRef, reason: String },

    /// Group aggregation failed before or during its single write
    #[error("Aggregation failed for group '{group_id}': {reason}")]
    Aggregation { group_id: String, reason: String },
}

impl PipelineError {
    /// Whether redelivering the same event may succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            PipelineError::MalformedEvent(_) | PipelineError::UnsupportedFormat { .. }
        )
    }

    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::MalformedEvent(_) => "MALFORMED_EVENT",
            PipelineError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            PipelineError::DetectionService { .. } => "DETECTION_SERVICE_ERROR",
            PipelineError::AnnotationWrite { .. } => "ANNOTATION_WRITE_ERROR",
            PipelineError::IndexWrite { .. } => "INDEX_WRITE_ERROR",
            PipelineError::Aggregation { .. } => "AGGREGATION_ERROR",
        }
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invocation failed
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let ApiError::Pipeline(err) = self;

        // 422 tells the sender not to redeliver, 503 asks it to
        let status = if err.is_retryable() {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::UNPROCESSABLE_ENTITY
        };

        let body = Json(json!({
            "error": {
                "code": err.code(),
                "message": err.to_string(),
                "retryable": err.is_retryable(),
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
