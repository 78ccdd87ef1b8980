use crate::error::OcrError;
use image::DynamicImage;

/// Trait that all OCR engines must implement
///
/// Engines receive an already preprocessed raster and only recognize text;
/// file handling and PDF rasterization happen upstream.
pub trait OcrEngine: Send + Sync {
    /// Returns the engine identifier (e.g., "ocrs", "leptess")
    fn name(&self) -> &'static str;

    /// Returns a human-readable description of the engine
    fn description(&self) -> &'static str;

    /// Recognize the text in a single image
    fn recognize(&self, image: &DynamicImage, language: &str) -> Result<String, OcrError>;

    /// Get supported languages
    fn supported_languages(&self) -> Vec<String>;
}
