//! Crop stage boundary.
//!
//! When `crop_aspect_ratio` is configured, the pipeline pauses after the
//! transform and hands the result to a [`CropCoordinator`]. An interactive
//! host implements the trait over its crop UI; the coordinator answers with a
//! replacement blob or with [`CropOutcome::Cancelled`] when the user abandons
//! the crop.
//!
//! [`CenterCrop`] is a non-interactive coordinator that keeps the largest
//! centered region of the requested ratio. The CLI uses it, and it is the
//! controller's default.

use crate::imaging::calculations::calculate_center_crop;
use crate::imaging::{Dimensions, OutputFormat, Quality, is_passthrough};
use crate::types::{Blob, essence};
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageReader};
use std::io::Cursor;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CropError {
    #[error("Crop failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CropOutcome {
    Cropped {
        blob: Blob,
        dimensions: Option<Dimensions>,
    },
    /// The user abandoned the crop; not an error.
    Cancelled,
}

#[async_trait]
pub trait CropCoordinator: Send + Sync {
    /// Present `blob` for cropping to `aspect_ratio` (width / height).
    async fn crop(&self, blob: &Blob, aspect_ratio: f64) -> Result<CropOutcome, CropError>;
}

/// Crops the largest centered region of the requested ratio.
///
/// PNG input stays PNG; anything else is written as JPEG at `quality`.
/// Animated GIF and SVG content is handed back untouched.
#[derive(Debug, Clone, Copy)]
pub struct CenterCrop {
    pub quality: Quality,
}

impl CenterCrop {
    pub fn new(quality: Quality) -> Self {
        Self { quality }
    }

    fn crop_blocking(
        blob: &Blob,
        aspect_ratio: f64,
        quality: Quality,
    ) -> Result<CropOutcome, CropError> {
        let img = ImageReader::new(Cursor::new(&blob.bytes[..]))
            .with_guessed_format()
            .map_err(|e| CropError::Failed(e.to_string()))?
            .decode()
            .map_err(|e| CropError::Failed(e.to_string()))?;

        let (x, y, w, h) = calculate_center_crop((img.width(), img.height()), aspect_ratio);
        let cropped = img.crop_imm(x, y, w, h);

        let format = if essence(&blob.content_type) == "image/png" {
            OutputFormat::Png
        } else {
            OutputFormat::Jpeg
        };

        let mut buffer = Vec::new();
        match format {
            OutputFormat::Png => cropped.write_with_encoder(PngEncoder::new(&mut buffer)),
            OutputFormat::Jpeg => DynamicImage::ImageRgb8(cropped.to_rgb8()).write_with_encoder(
                JpegEncoder::new_with_quality(&mut buffer, quality.value() as u8),
            ),
        }
        .map_err(|e| CropError::Failed(e.to_string()))?;

        Ok(CropOutcome::Cropped {
            blob: Blob::new(buffer, format.mime_type()),
            dimensions: Some(Dimensions {
                width: w,
                height: h,
            }),
        })
    }
}

impl Default for CenterCrop {
    fn default() -> Self {
        Self::new(Quality::default())
    }
}

#[async_trait]
impl CropCoordinator for CenterCrop {
    async fn crop(&self, blob: &Blob, aspect_ratio: f64) -> Result<CropOutcome, CropError> {
        if is_passthrough(&blob.content_type) {
            return Ok(CropOutcome::Cropped {
                blob: blob.clone(),
                dimensions: None,
            });
        }
        let blob = blob.clone();
        let quality = self.quality;
        tokio::task::spawn_blocking(move || Self::crop_blocking(&blob, aspect_ratio, quality))
            .await
            .map_err(|e| CropError::Failed(format!("crop task failed: {e}")))?
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays scripted answers, recording the ratio it was asked for.
    pub struct ScriptedCropper {
        answers: Mutex<Vec<Result<CropOutcome, CropError>>>,
        pub calls: AtomicUsize,
        pub last_ratio: Mutex<Option<f64>>,
    }

    impl ScriptedCropper {
        pub fn new(mut answers: Vec<Result<CropOutcome, CropError>>) -> Self {
            answers.reverse();
            Self {
                answers: Mutex::new(answers),
                calls: AtomicUsize::new(0),
                last_ratio: Mutex::new(None),
            }
        }

        pub fn cancelling() -> Self {
            Self::new(vec![Ok(CropOutcome::Cancelled)])
        }

        pub fn returning(bytes: Vec<u8>) -> Self {
            Self::new(vec![Ok(CropOutcome::Cropped {
                blob: Blob::new(bytes, "image/jpeg"),
                dimensions: Some(Dimensions {
                    width: 100,
                    height: 100,
                }),
            })])
        }
    }

    #[async_trait]
    impl CropCoordinator for ScriptedCropper {
        async fn crop(&self, _blob: &Blob, aspect_ratio: f64) -> Result<CropOutcome, CropError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_ratio.lock().unwrap() = Some(aspect_ratio);
            self.answers
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Ok(CropOutcome::Cancelled))
        }
    }

    fn png_blob(width: u32, height: u32) -> Blob {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([1, 2, 3]));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        Blob::new(buf.into_inner(), "image/png")
    }

    #[tokio::test]
    async fn center_crop_square_from_landscape_png() {
        let outcome = CenterCrop::default()
            .crop(&png_blob(80, 40), 1.0)
            .await
            .unwrap();

        let CropOutcome::Cropped { blob, dimensions } = outcome else {
            panic!("expected a cropped blob");
        };
        assert_eq!(blob.content_type, "image/png");
        assert_eq!(
            dimensions,
            Some(Dimensions {
                width: 40,
                height: 40
            })
        );
        let decoded = image::load_from_memory(&blob.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (40, 40));
    }

    #[tokio::test]
    async fn center_crop_non_png_writes_jpeg() {
        let mut blob = png_blob(30, 60);
        blob.content_type = "image/webp".into();

        let outcome = CenterCrop::default().crop(&blob, 0.5).await.unwrap();
        let CropOutcome::Cropped { blob, .. } = outcome else {
            panic!("expected a cropped blob");
        };
        assert_eq!(blob.content_type, "image/jpeg");
        assert_eq!(&blob.bytes[0..2], &[0xFF, 0xD8]);
    }

    #[tokio::test]
    async fn center_crop_leaves_gif_and_svg_alone() {
        for (bytes, mime) in [
            (b"GIF89a\x01\x00".to_vec(), "image/gif"),
            (b"<svg xmlns=\"http://www.w3.org/2000/svg\"/>".to_vec(), "image/svg+xml"),
        ] {
            let blob = Blob::new(bytes, mime);
            let outcome = CenterCrop::default().crop(&blob, 1.0).await.unwrap();
            assert_eq!(
                outcome,
                CropOutcome::Cropped {
                    blob: blob.clone(),
                    dimensions: None
                }
            );
        }
    }

    #[tokio::test]
    async fn center_crop_garbage_fails() {
        let blob = Blob::new(b"nope".to_vec(), "image/png");
        let result = CenterCrop::default().crop(&blob, 1.0).await;
        assert!(matches!(result, Err(CropError::Failed(_))));
    }
}
