//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait is the rendering surface of the pipeline: it
//! defines the two operations every backend must support, identify and
//! resize (decode, resample, encode in one step).
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate. Tests use the recording `MockBackend` below so pipeline logic can be
//! exercised without real pixels.

use super::params::ResizeParams;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Encode failed: {0}")]
    Encode(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Trait for image processing backends.
///
/// Implementations must be `Send + Sync`: the pipeline runs them on tokio's
/// blocking pool.
pub trait ImageBackend: Send + Sync {
    /// Read pixel dimensions from encoded bytes.
    fn identify(&self, bytes: &[u8]) -> Result<Dimensions, BackendError>;

    /// Decode, resample to the target size, and encode.
    fn resize(&self, params: &ResizeParams) -> Result<Vec<u8>, BackendError>;
}
