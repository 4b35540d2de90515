//! High-level image operations.
//!
//! [`transform`] combines the dimension calculations with backend execution:
//! it decides whether a file is transformed at all, which size and format it
//! gets, and whether the result is worth keeping.

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::calculations::calculate_constrained_dimensions;
use super::params::{OutputFormat, Quality, ResizeParams};
use crate::config::UploadConfig;
use crate::error::TransformError;
use crate::types::{Blob, SourceFile, essence, extension_for_mime};
use serde::Serialize;
use std::sync::Arc;

/// MIME types that are uploaded exactly as selected.
///
/// Re-encoding would drop every frame but the first of an animation and would
/// rasterize a vector image.
const PASSTHROUGH_MIME_TYPES: &[&str] = &["image/gif", "image/svg+xml"];

/// Encoding of a transform result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "mime", rename_all = "snake_case")]
pub enum EncodedFormat {
    /// Re-encoded by the backend.
    Encoded(OutputFormat),
    /// The source bytes, untouched.
    Original(String),
}

/// Output of [`transform`], before it is registered with the tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct Transformed {
    pub blob: Blob,
    /// `None` for pass-through classes, which are never decoded.
    pub dimensions: Option<Dimensions>,
    pub format: EncodedFormat,
    /// Extension of the selected file, kept for pass-through key naming.
    pub source_extension: Option<String>,
}

impl Transformed {
    pub fn byte_len(&self) -> u64 {
        self.blob.len()
    }

    /// File extension for storage keys.
    pub fn extension(&self) -> String {
        match &self.format {
            EncodedFormat::Encoded(format) => format.extension().to_string(),
            EncodedFormat::Original(mime) => extension_for_mime(mime)
                .map(str::to_string)
                .or_else(|| self.source_extension.clone())
                .unwrap_or_else(|| "bin".to_string()),
        }
    }

    fn original(file: &SourceFile, dimensions: Option<Dimensions>) -> Self {
        Self {
            blob: file.as_blob(),
            dimensions,
            format: EncodedFormat::Original(essence(&file.mime_type)),
            source_extension: file.extension(),
        }
    }
}

pub fn is_passthrough(mime: &str) -> bool {
    PASSTHROUGH_MIME_TYPES.contains(&essence(mime).as_str())
}

fn map_backend_error(err: BackendError) -> TransformError {
    match err {
        BackendError::Decode(msg) => TransformError::DecodeFailed(msg),
        BackendError::Encode(msg) => TransformError::EncodeFailed(msg),
    }
}

/// Constrain, re-encode, and keep whichever of original/encoded is smaller.
///
/// 1. Pass-through classes (GIF, SVG) are returned untouched.
/// 2. Dimensions are read; failure is terminal (`DecodeFailed`).
/// 3. The image is resampled to fit `max_width × max_height` (never upscaled)
///    and encoded as PNG for PNG sources, JPEG at `compression_quality`
///    otherwise.
/// 4. If the encoded payload is not strictly smaller, the original bytes are
///    returned instead.
pub fn transform(
    backend: &dyn ImageBackend,
    file: &SourceFile,
    config: &UploadConfig,
) -> Result<Transformed, TransformError> {
    if is_passthrough(&file.mime_type) {
        return Ok(Transformed::original(file, None));
    }

    let source_dims = backend.identify(&file.bytes).map_err(map_backend_error)?;
    let (width, height) = calculate_constrained_dimensions(
        (source_dims.width, source_dims.height),
        (config.max_width, config.max_height),
    );
    let format = OutputFormat::for_source_mime(&file.mime_type);

    let encoded = backend
        .resize(&ResizeParams {
            source: Arc::clone(&file.bytes),
            width,
            height,
            format,
            quality: Quality::from_fraction(config.compression_quality),
        })
        .map_err(map_backend_error)?;

    if (encoded.len() as u64) >= file.byte_len {
        tracing::debug!(
            encoded = encoded.len(),
            original = file.byte_len,
            "re-encode did not shrink payload; keeping original"
        );
        return Ok(Transformed::original(file, Some(source_dims)));
    }

    Ok(Transformed {
        blob: Blob::new(encoded, format.mime_type()),
        dimensions: Some(Dimensions { width, height }),
        format: EncodedFormat::Encoded(format),
        source_extension: file.extension(),
    })
}
