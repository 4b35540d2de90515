//! Payload types shared by every pipeline stage.
//!
//! Bytes are held in `Arc<[u8]>` so a file can be retained for retry,
//! registered with the [`ResourceTracker`](crate::tracker::ResourceTracker),
//! and handed to storage without copying.

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Immutable bytes plus the content type they are declared as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub bytes: Arc<[u8]>,
    pub content_type: String,
}

impl Blob {
    pub fn new(bytes: impl Into<Arc<[u8]>>, content_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.into(),
        }
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// The raw input selected (or pasted) by the user.
///
/// Only the name, MIME type and length are serialized; the payload stays
/// inside the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    #[serde(skip)]
    pub bytes: Arc<[u8]>,
    pub mime_type: String,
    pub byte_len: u64,
    pub filename: String,
}

impl SourceFile {
    pub fn new(
        bytes: impl Into<Arc<[u8]>>,
        mime_type: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        let bytes = bytes.into();
        Self {
            byte_len: bytes.len() as u64,
            bytes,
            mime_type: mime_type.into(),
            filename: filename.into(),
        }
    }

    /// Build a source from clipboard contents.
    ///
    /// Clipboard images have no filename, so one is synthesized from the MIME
    /// subtype: `image/png` → `pasted-image.png`.
    pub fn pasted(bytes: impl Into<Arc<[u8]>>, mime_type: impl Into<String>) -> Self {
        let mime_type = mime_type.into();
        let ext = extension_for_mime(&mime_type).unwrap_or("bin");
        let filename = format!("pasted-image.{ext}");
        Self::new(bytes, mime_type, filename)
    }

    /// Read a file from disk, guessing its MIME type from the extension.
    ///
    /// Unknown extensions are declared as `application/octet-stream` and will
    /// be rejected by validation rather than here.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let mime_type = mime_for_path(path).unwrap_or("application/octet-stream");
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(bytes, mime_type, filename))
    }

    pub fn as_blob(&self) -> Blob {
        Blob {
            bytes: Arc::clone(&self.bytes),
            content_type: self.mime_type.clone(),
        }
    }

    /// Lowercase extension of the original filename, if it has one.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.filename)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty())
            .map(str::to_ascii_lowercase)
    }
}

/// Strip parameters and normalize case: `Image/PNG; q=1` → `image/png`.
pub fn essence(mime: &str) -> String {
    mime.split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Canonical file extension for the image MIME types the pipeline knows.
pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    match essence(mime).as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/svg+xml" => Some("svg"),
        "image/avif" => Some("avif"),
        "image/bmp" => Some("bmp"),
        "image/tiff" => Some("tiff"),
        _ => None,
    }
}

fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if ext == "svg" {
        return Some("image/svg+xml");
    }
    image::ImageFormat::from_extension(&ext).map(|f| f.to_mime_type())
}
