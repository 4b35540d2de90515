//! Image transformation — decode, constrain, re-encode.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::ImageReader::into_dimensions` |
//! | **Resize → JPEG/PNG** | Lanczos3 + `image` encoders |
//! | **Center crop** | `DynamicImage::crop_imm` |
//!
//! Layout:
//! - `calculations`: dimension math with no I/O (bounding box, crop rect)
//! - `params`: [`Quality`], [`OutputFormat`], [`ResizeParams`]
//! - `backend`: the [`ImageBackend`] seam; tests swap in a recording mock
//! - `rust_backend`: [`RustBackend`], the `image`-crate implementation
//! - `operations`: [`transform`], the only entry point the pipeline calls

pub mod backend;
pub(crate) mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use operations::{EncodedFormat, Transformed, is_passthrough, transform};
pub use params::{OutputFormat, Quality, ResizeParams};
pub use rust_backend::RustBackend;
