//! Upload validation and staging
//!
//! The declared MIME type must agree with the file's magic bytes before
//! anything is written to disk. Staged files live in a `NamedTempFile` and
//! are removed when the `StagedUpload` is dropped.

use crate::error::OcrError;
use image::DynamicImage;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Accepted upload types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Pdf,
    Png,
    Jpeg,
}

impl InputKind {
    pub const ALL: [InputKind; 3] = [InputKind::Pdf, InputKind::Png, InputKind::Jpeg];

    /// Map a declared content type (parameters ignored) to a kind
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or_default().trim();
        match essence.to_ascii_lowercase().as_str() {
            "application/pdf" => Some(Self::Pdf),
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            _ => None,
        }
    }

    /// Identify a kind from magic bytes
    pub fn sniff(data: &[u8]) -> Option<Self> {
        if data.starts_with(b"%PDF-") {
            Some(Self::Pdf)
        } else if data.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(Self::Png)
        } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else {
            None
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => ".pdf",
            Self::Png => ".png",
            Self::Jpeg => ".jpg",
        }
    }

    pub fn is_pdf(&self) -> bool {
        matches!(self, Self::Pdf)
    }
}

/// Work out what an upload is
///
/// A missing or generic (`application/octet-stream`) content type falls back
/// to sniffing. A specific content type must be supported and must match the
/// bytes.
pub fn detect(declared: Option<&str>, data: &[u8]) -> Result<InputKind, OcrError> {
    if data.is_empty() {
        return Err(OcrError::CorruptFile("file is empty".to_string()));
    }

    let sniffed = InputKind::sniff(data);
    let declared = declared
        .map(str::trim)
        .filter(|mime| !mime.is_empty() && !mime.starts_with("application/octet-stream"));

    let Some(mime) = declared else {
        return sniffed.ok_or_else(|| {
            OcrError::UnsupportedFormat("content is not a PDF, PNG or JPEG file".to_string())
        });
    };

    let kind = InputKind::from_mime(mime).ok_or_else(|| {
        OcrError::UnsupportedFormat(format!("{} (expected PDF, PNG or JPEG)", mime))
    })?;

    match sniffed {
        Some(actual) if actual == kind => Ok(kind),
        Some(actual) => Err(OcrError::CorruptFile(format!(
            "declared as {} but content is {}",
            kind.mime(),
            actual.mime()
        ))),
        None => Err(OcrError::CorruptFile(format!(
            "content does not look like {}",
            kind.mime()
        ))),
    }
}

/// Reject uploads over the configured limit
pub fn ensure_within_limit(size: usize, max: usize) -> Result<(), OcrError> {
    if size > max {
        return Err(OcrError::FileTooLarge { size, max });
    }
    Ok(())
}

/// An upload written to a temporary file for the duration of one request
#[derive(Debug)]
pub struct StagedUpload {
    file: NamedTempFile,
    kind: InputKind,
}

impl StagedUpload {
    /// Detect the kind of `data` and stage it
    pub fn new(declared: Option<&str>, data: &[u8]) -> Result<Self, OcrError> {
        let kind = detect(declared, data)?;
        Self::from_bytes(kind, data)
    }

    /// Stage already validated bytes
    pub fn from_bytes(kind: InputKind, data: &[u8]) -> Result<Self, OcrError> {
        let mut file = tempfile::Builder::new()
            .prefix("docreader-")
            .suffix(kind.extension())
            .tempfile()
            .map_err(|e| OcrError::Internal(format!("Failed to create temp file: {}", e)))?;

        file.write_all(data)
            .and_then(|_| file.flush())
            .map_err(|e| OcrError::Internal(format!("Failed to write temp file: {}", e)))?;

        tracing::debug!(
            "Staged {} bytes of {} at {:?}",
            data.len(),
            kind.mime(),
            file.path()
        );

        Ok(Self { file, kind })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn kind(&self) -> InputKind {
        self.kind
    }

    /// Decode a staged PNG or JPEG
    pub fn load_image(&self) -> Result<DynamicImage, OcrError> {
        let format = match self.kind {
            InputKind::Png => image::ImageFormat::Png,
            InputKind::Jpeg => image::ImageFormat::Jpeg,
            InputKind::Pdf => {
                return Err(OcrError::Internal(
                    "a PDF must be rasterized page by page".to_string(),
                ))
            }
        };

        let data = std::fs::read(self.path())
            .map_err(|e| OcrError::Internal(format!("Failed to read staged file: {}", e)))?;
        image::load_from_memory_with_format(&data, format)
            .map_err(|e| OcrError::CorruptFile(format!("Failed to decode image: {}", e)))
    }
}
