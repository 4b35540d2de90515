//! Failure taxonomy for the upload pipeline.
//!
//! | Class | Variants | Retryable |
//! |---|---|---|
//! | [`ValidationError`] | `SizeExceeded`, `NotAnImage`, `UnsupportedType` | never: the user must pick another file |
//! | [`TransformError`] | `DecodeFailed`, `EncodeFailed` | yes: the same file may succeed on resubmission |
//! | [`UploadError`] | `NetworkFailure`, `StorageRejected` | yes, unless storage says otherwise |
//!
//! Cancellation is deliberately absent. A cancelled run is an outcome, not an
//! error, and is reported through [`Phase::Cancelled`](crate::pipeline::Phase).
//!
//! All variants carry owned data so a failure can be cloned into
//! [`PipelineState`](crate::pipeline::PipelineState) snapshots and serialized
//! for hosts.

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("File is {actual} bytes; the limit is {limit} bytes")]
    SizeExceeded { actual: u64, limit: u64 },
    #[error("File type {mime:?} is not an image")]
    NotAnImage { mime: String },
    #[error("Image type {mime:?} is not accepted")]
    UnsupportedType { mime: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "message", rename_all = "snake_case")]
pub enum TransformError {
    #[error("Failed to decode image: {0}")]
    DecodeFailed(String),
    #[error("Failed to encode image: {0}")]
    EncodeFailed(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UploadError {
    #[error("Network failure: {message}")]
    NetworkFailure { message: String },
    #[error("Storage rejected upload: {message}")]
    StorageRejected { message: String, retryable: bool },
}

impl UploadError {
    pub fn retryable(&self) -> bool {
        match self {
            UploadError::NetworkFailure { .. } => true,
            UploadError::StorageRejected { retryable, .. } => *retryable,
        }
    }
}

/// Coarse failure class, as surfaced to hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Transform,
    Upload,
}

/// Any failure a pipeline run can end in.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "error", rename_all = "snake_case")]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error(transparent)]
    Upload(#[from] UploadError),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Validation(_) => ErrorKind::Validation,
            PipelineError::Transform(_) => ErrorKind::Transform,
            PipelineError::Upload(_) => ErrorKind::Upload,
        }
    }

    pub fn retryable(&self) -> bool {
        match self {
            PipelineError::Validation(_) => false,
            PipelineError::Transform(_) => true,
            PipelineError::Upload(e) => e.retryable(),
        }
    }
}

/// Refusals from the controller's imperative entry points.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    #[error("Pipeline has been shut down")]
    ShutDown,
    #[error("Retry is disabled by configuration")]
    RetryDisabled,
    #[error("Nothing to retry")]
    NothingToRetry,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_is_never_retryable() {
        let err = PipelineError::from(ValidationError::SizeExceeded {
            actual: 10,
            limit: 5,
        });
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(!err.retryable());
    }

    #[test]
    fn transform_is_retryable() {
        let err = PipelineError::from(TransformError::DecodeFailed("truncated".into()));
        assert_eq!(err.kind(), ErrorKind::Transform);
        assert!(err.retryable());
    }

    #[test]
    fn upload_retryable_follows_storage_flag() {
        let network = PipelineError::from(UploadError::NetworkFailure {
            message: "reset".into(),
        });
        assert!(network.retryable());

        let rejected = PipelineError::from(UploadError::StorageRejected {
            message: "quota".into(),
            retryable: false,
        });
        assert_eq!(rejected.kind(), ErrorKind::Upload);
        assert!(!rejected.retryable());
    }

    #[test]
    fn size_exceeded_message_carries_both_sizes() {
        let err = ValidationError::SizeExceeded {
            actual: 10_485_760,
            limit: 5_242_880,
        };
        let msg = err.to_string();
        assert!(msg.contains("10485760"));
        assert!(msg.contains("5242880"));
    }

    #[test]
    fn serializes_with_kind_tag() {
        let err = PipelineError::from(ValidationError::NotAnImage {
            mime: "text/plain".into(),
        });
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "validation");
        assert_eq!(json["error"]["reason"], "not_an_image");
    }
}
