//! Pre-flight checks on a selected file.
//!
//! Validation is pure and looks only at the declared size and MIME type, never
//! at pixel content. A file that passes can still fail to decode later; that
//! is a [`TransformError`](crate::error::TransformError), not a validation one.
//!
//! Checks run in order and stop at the first failure:
//!
//! 1. byte length ≤ `max_size_bytes` → else `SizeExceeded`
//! 2. MIME type in the `image/` class → else `NotAnImage`
//! 3. MIME type whitelisted (or `image/*` present) → else `UnsupportedType`

use crate::config::UploadConfig;
use crate::error::ValidationError;
use crate::types::{SourceFile, essence};

const IMAGE_WILDCARD: &str = "image/*";

pub fn validate(file: &SourceFile, config: &UploadConfig) -> Result<(), ValidationError> {
    let limit = config.max_size_bytes();
    if file.byte_len > limit {
        return Err(ValidationError::SizeExceeded {
            actual: file.byte_len,
            limit,
        });
    }

    let mime = essence(&file.mime_type);
    if !mime.starts_with("image/") {
        return Err(ValidationError::NotAnImage {
            mime: file.mime_type.clone(),
        });
    }

    let accepted = config
        .accepted_mime_types
        .iter()
        .map(|m| essence(m))
        .any(|m| m == IMAGE_WILDCARD || m == mime);
    if !accepted {
        return Err(ValidationError::UnsupportedType {
            mime: file.mime_type.clone(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(len: usize, mime: &str) -> SourceFile {
        SourceFile::new(vec![0u8; len], mime, "upload.bin")
    }

    fn config_mb(mb: f64) -> UploadConfig {
        UploadConfig {
            max_size_mb: mb,
            ..UploadConfig::default()
        }
    }

    #[test]
    fn accepts_whitelisted_image() {
        assert_eq!(validate(&file(1024, "image/png"), &UploadConfig::default()), Ok(()));
    }

    #[test]
    fn size_at_limit_is_accepted() {
        let config = config_mb(1.0);
        assert!(validate(&file(1024 * 1024, "image/png"), &config).is_ok());
    }

    #[test]
    fn oversized_reports_actual_and_limit() {
        let config = config_mb(5.0);
        let big = SourceFile::new(vec![0u8; 10 * 1024 * 1024], "image/jpeg", "big.jpg");

        assert_eq!(
            validate(&big, &config),
            Err(ValidationError::SizeExceeded {
                actual: 10 * 1024 * 1024,
                limit: 5 * 1024 * 1024,
            })
        );
    }

    #[test]
    fn size_is_checked_before_type() {
        let config = config_mb(0.001);
        let result = validate(&file(4096, "text/plain"), &config);
        assert!(matches!(result, Err(ValidationError::SizeExceeded { .. })));
    }

    #[test]
    fn rejects_non_image() {
        let result = validate(&file(10, "application/pdf"), &UploadConfig::default());
        assert_eq!(
            result,
            Err(ValidationError::NotAnImage {
                mime: "application/pdf".into()
            })
        );
    }

    #[test]
    fn rejects_image_not_in_whitelist() {
        let result = validate(&file(10, "image/tiff"), &UploadConfig::default());
        assert_eq!(
            result,
            Err(ValidationError::UnsupportedType {
                mime: "image/tiff".into()
            })
        );
    }

    #[test]
    fn wildcard_accepts_any_image() {
        let config = UploadConfig {
            accepted_mime_types: vec!["image/*".into()],
            ..UploadConfig::default()
        };
        assert!(validate(&file(10, "image/tiff"), &config).is_ok());
        assert!(matches!(
            validate(&file(10, "video/mp4"), &config),
            Err(ValidationError::NotAnImage { .. })
        ));
    }

    #[test]
    fn mime_comparison_ignores_case_and_parameters() {
        assert!(validate(&file(10, "Image/PNG; foo=bar"), &UploadConfig::default()).is_ok());
    }

    #[test]
    fn validation_is_idempotent() {
        let config = UploadConfig::default();
        for f in [
            file(10, "image/png"),
            file(10, "text/html"),
            file(10, "image/bmp"),
            file(6 * 1024 * 1024, "image/jpeg"),
        ] {
            assert_eq!(validate(&f, &config), validate(&f, &config));
        }
    }
}
