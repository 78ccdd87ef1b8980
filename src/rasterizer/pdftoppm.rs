//! Rasterizer that shells out to poppler's `pdftoppm`
//!
//! Renders any page, including vector text, at 72 dpi (one pixel per PDF
//! point). Requires poppler-utils on the PATH.

use super::{PageRasterizer, PdfDocument};
use crate::error::OcrError;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// PDF user space resolution; no DPI override is applied
const NATIVE_DPI: u32 = 72;

/// Rasterizer backed by the `pdftoppm` command
#[derive(Debug, Clone)]
pub struct PdftoppmRasterizer {
    command: String,
}

impl PdftoppmRasterizer {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Default for PdftoppmRasterizer {
    fn default() -> Self {
        Self::new("pdftoppm")
    }
}

impl PageRasterizer for PdftoppmRasterizer {
    fn name(&self) -> &'static str {
        "pdftoppm"
    }

    fn open(&self, path: &Path) -> Result<Box<dyn PdfDocument>, OcrError> {
        // Page count comes from lopdf so a missing binary surfaces per page
        let page_count = lopdf::Document::load(path)
            .map_err(|e| OcrError::CorruptFile(format!("Failed to load PDF: {}", e)))?
            .get_pages()
            .len();

        Ok(Box::new(PdftoppmDocument {
            command: self.command.clone(),
            path: path.to_path_buf(),
            page_count,
        }))
    }
}

struct PdftoppmDocument {
    command: String,
    path: PathBuf,
    page_count: usize,
}

impl PdfDocument for PdftoppmDocument {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn render_page(&self, index: usize) -> Result<DynamicImage, OcrError> {
        let page = index + 1;
        let page_error = |reason: String| OcrError::RasterizationError { page, reason };

        if index >= self.page_count {
            return Err(page_error(format!(
                "document has {} pages",
                self.page_count
            )));
        }

        // Removed on drop, whether rendering succeeds or not
        let temp_dir =
            TempDir::new().map_err(|e| page_error(format!("failed to create temp dir: {}", e)))?;
        let output_prefix = temp_dir.path().join("page");
        let page_str = page.to_string();
        let dpi_str = NATIVE_DPI.to_string();

        let output = Command::new(&self.command)
            .args(["-png", "-r", &dpi_str, "-f", &page_str, "-l", &page_str, "-singlefile"])
            .arg(&self.path)
            .arg(&output_prefix)
            .output();

        match output {
            Ok(output) if output.status.success() => {}
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(page_error(format!(
                    "{} failed: {}",
                    self.command,
                    stderr.trim()
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(page_error(format!(
                    "{} not found (install poppler-utils)",
                    self.command
                )));
            }
            Err(e) => return Err(page_error(e.to_string())),
        }

        let image_path = output_prefix.with_extension("png");
        image::open(&image_path).map_err(|e| {
            page_error(format!("failed to read rendered page {:?}: {}", image_path, e))
        })
    }
}
