//! Leptess/Tesseract engine implementation
//!
//! Tesseract-based OCR engine. Better for noisy/messy images like phone photos.
//! Uses tesseract-static crate for static linking (no system dependencies).
//! Downloads tessdata (training data) on first use unless a tessdata
//! directory is configured.

use super::download::{cache_dir, ensure_downloaded};
use crate::config::Config;
use crate::engine::OcrEngine;
use crate::error::OcrError;
use image::DynamicImage;
use std::path::Path;
use tesseract_static::tesseract::Tesseract;

/// Tesseract OCR Engine
pub struct LeptessEngine {
    /// Path to tessdata directory
    tessdata_path: String,
}

impl LeptessEngine {
    /// Create a new Tesseract-based OCR engine
    pub fn new(config: &Config) -> Result<Self, OcrError> {
        let language = config.default_language.as_str();

        let tessdata_path = match &config.tessdata_path {
            Some(path) => path.clone(),
            None => ensure_tessdata_available(language)?,
        };

        // Validate that tessdata is accessible by doing a test initialization
        let test_tess = Tesseract::new(Some(&tessdata_path), Some(language)).map_err(|e| {
            OcrError::InitializationError(format!("Failed to initialize Tesseract: {}", e))
        })?;
        drop(test_tess);

        tracing::info!(
            "Leptess engine initialized (tessdata: {}, language: {})",
            tessdata_path,
            language
        );

        Ok(Self { tessdata_path })
    }

    fn has_traineddata(&self, language: &str) -> bool {
        Path::new(&self.tessdata_path)
            .join(format!("{}.traineddata", language))
            .exists()
    }
}

impl OcrEngine for LeptessEngine {
    fn name(&self) -> &'static str {
        "leptess"
    }

    fn description(&self) -> &'static str {
        "Tesseract OCR engine - better for noisy/messy images like phone photos"
    }

    fn recognize(&self, image: &DynamicImage, language: &str) -> Result<String, OcrError> {
        if !self.has_traineddata(language) {
            return Err(OcrError::InvalidRequest(format!(
                "No tessdata installed for language '{}'",
                language
            )));
        }

        // BMP is always supported by leptonica
        let rgb_img = image.to_rgb8();
        let (width, height) = rgb_img.dimensions();
        let mut bmp_data = Vec::new();
        rgb_img
            .write_to(&mut std::io::Cursor::new(&mut bmp_data), image::ImageFormat::Bmp)
            .map_err(|e| OcrError::RecognitionError(format!("Failed to convert to BMP: {}", e)))?;

        tracing::debug!(
            "Processing image: {}x{}, BMP size: {} bytes",
            width,
            height,
            bmp_data.len()
        );

        let mut tess = Tesseract::new(Some(&self.tessdata_path), Some(language)).map_err(|e| {
            OcrError::RecognitionError(format!("Failed to create Tesseract: {}", e))
        })?;

        tess = tess.set_image_from_mem(&bmp_data).map_err(|e| {
            OcrError::RecognitionError(format!(
                "Failed to set image ({}x{}, {} bytes): {}",
                width,
                height,
                bmp_data.len(),
                e
            ))
        })?;

        tess = tess
            .recognize()
            .map_err(|e| OcrError::RecognitionError(format!("Failed to recognize text: {}", e)))?;

        // Returned verbatim; Tesseract's own line breaks are kept
        tess.get_text()
            .map_err(|e| OcrError::RecognitionError(format!("Failed to get text: {}", e)))
    }

    fn supported_languages(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.tessdata_path) else {
            return Vec::new();
        };

        let mut languages: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                entry
                    .file_name()
                    .to_string_lossy()
                    .strip_suffix(".traineddata")
                    .map(|s| s.to_string())
            })
            .collect();
        languages.sort();
        languages
    }
}

/// Ensure tessdata is available in the cache, downloading if needed
fn ensure_tessdata_available(language: &str) -> Result<String, OcrError> {
    let dir = cache_dir(Some("tessdata"))?;
    let filename = format!("{}.traineddata", language);
    ensure_downloaded(&tessdata_url(language), &dir, &filename)?;

    // Tesseract expects the directory, not the file
    dir.to_str()
        .map(|s| s.to_string())
        .ok_or_else(|| OcrError::InitializationError("Invalid tessdata path".to_string()))
}

/// Get tessdata download URL for a language
fn tessdata_url(language: &str) -> String {
    // Use tessdata_fast for smaller, faster downloads
    format!(
        "https://github.com/tesseract-ocr/tessdata_fast/raw/main/{}.traineddata",
        language
    )
}
