use crate::error::OcrError;
use image::DynamicImage;
use serde::Serialize;
use std::time::Instant;

use super::steps;

/// Preprocessing preset names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preset {
    /// Full sequence, including the Otsu confirmation pass and 1x1 morphology
    /// Steps: grayscale, contrast, deskew, adaptive_threshold, otsu, morphology, upscale
    #[default]
    Parity,
    /// Single thresholding pass, no morphology
    /// Steps: grayscale, contrast, deskew, adaptive_threshold, upscale
    Streamlined,
}

impl Preset {
    /// Parse from query parameter string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "parity" => Some(Self::Parity),
            "streamlined" => Some(Self::Streamlined),
            _ => None,
        }
    }

    /// Get the preset name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parity => "parity",
            Self::Streamlined => "streamlined",
        }
    }
}

/// Timing information for a single preprocessing step
#[derive(Debug, Clone, Serialize)]
pub struct StepTiming {
    pub name: String,
    pub time_ms: u64,
}

/// Result of preprocessing including timing stats
#[derive(Debug, Clone, Serialize)]
pub struct PreprocessingResult {
    /// Preprocessed image (not serialized)
    #[serde(skip)]
    pub image: DynamicImage,
    /// Total preprocessing time in milliseconds
    pub total_time_ms: u64,
    /// Preset used
    pub preset: String,
    /// Individual step timings
    pub steps: Vec<StepTiming>,
}

/// Preprocessing pipeline that turns a raw page into a binary, deskewed,
/// 2x upscaled image ready for recognition
#[derive(Debug, Clone, Copy, Default)]
pub struct Pipeline {
    preset: Preset,
}

impl Pipeline {
    pub fn new(preset: Preset) -> Self {
        Self { preset }
    }

    pub fn preset(&self) -> Preset {
        self.preset
    }

    /// Process an image according to the configured preset
    pub fn process(&self, image: DynamicImage) -> Result<PreprocessingResult, OcrError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(OcrError::PreprocessingError(format!(
                "image has no pixels ({}x{})",
                image.width(),
                image.height()
            )));
        }

        let start = Instant::now();
        let mut steps_timing = Vec::new();

        let mut img = image;
        img = self.run_step("grayscale", img, &mut steps_timing, steps::grayscale::apply)?;
        img = self.run_step("contrast", img, &mut steps_timing, steps::contrast::apply)?;
        img = self.run_step("deskew", img, &mut steps_timing, steps::deskew::apply)?;
        img = self.run_step(
            "adaptive_threshold",
            img,
            &mut steps_timing,
            steps::threshold::adaptive,
        )?;

        // Otsu on an already-binary image only confirms it
        if self.preset == Preset::Parity {
            img = self.run_step("otsu", img, &mut steps_timing, steps::threshold::otsu)?;
            img = self.run_step("morphology", img, &mut steps_timing, steps::denoise::apply)?;
        }

        img = self.run_step("upscale", img, &mut steps_timing, steps::resize::apply)?;

        Ok(PreprocessingResult {
            image: img,
            total_time_ms: start.elapsed().as_millis() as u64,
            preset: self.preset.as_str().to_string(),
            steps: steps_timing,
        })
    }

    fn run_step<F>(
        &self,
        name: &str,
        img: DynamicImage,
        timings: &mut Vec<StepTiming>,
        step_fn: F,
    ) -> Result<DynamicImage, OcrError>
    where
        F: FnOnce(DynamicImage) -> Result<DynamicImage, OcrError>,
    {
        let step_start = Instant::now();
        let result = step_fn(img)?;
        timings.push(StepTiming {
            name: name.to_string(),
            time_ms: step_start.elapsed().as_millis() as u64,
        });
        Ok(result)
    }
}
