//! PDF page rasterizers
//!
//! A rasterizer opens a PDF once and renders its pages one at a time, so a
//! long document never holds more than one page image in memory.

pub mod lopdf;
pub mod pdftoppm;

use crate::error::OcrError;
use image::DynamicImage;
use std::path::Path;
use std::sync::Arc;

/// Opens PDF documents for page-by-page rendering
pub trait PageRasterizer: Send + Sync {
    /// Returns the rasterizer identifier (e.g., "lopdf", "pdftoppm")
    fn name(&self) -> &'static str;

    /// Open the document at `path`
    fn open(&self, path: &Path) -> Result<Box<dyn PdfDocument>, OcrError>;
}

/// An opened PDF document
pub trait PdfDocument {
    /// Number of pages in the document
    fn page_count(&self) -> usize;

    /// Render the page at zero-based `index` at the document's native resolution
    fn render_page(&self, index: usize) -> Result<DynamicImage, OcrError>;
}

/// Look up a rasterizer by its configured name
pub fn from_name(name: &str) -> Result<Arc<dyn PageRasterizer>, OcrError> {
    match name.to_lowercase().as_str() {
        "lopdf" => Ok(Arc::new(lopdf::LopdfRasterizer)),
        "pdftoppm" => Ok(Arc::new(pdftoppm::PdftoppmRasterizer::default())),
        other => Err(OcrError::InitializationError(format!(
            "Unknown PDF rasterizer '{}' (expected lopdf or pdftoppm)",
            other
        ))),
    }
}
