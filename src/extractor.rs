//! Text extraction: preprocess each image or PDF page, then recognize it

use crate::engine::OcrEngine;
use crate::error::OcrError;
use crate::input::StagedUpload;
use crate::preprocessing::{Pipeline, StepTiming};
use crate::rasterizer::PageRasterizer;
use image::DynamicImage;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Per-page diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct PageReport {
    /// 1-based page number (always 1 for single images)
    pub page: usize,
    pub chars: usize,
    pub preprocessing_ms: u64,
    pub steps: Vec<StepTiming>,
}

/// Text recognized from one upload, in document order
#[derive(Debug, Clone, Serialize)]
pub struct ExtractedText {
    pub text: String,
    pub pages: Vec<PageReport>,
}

/// Runs the preprocessing pipeline and an OCR engine over an upload
#[derive(Clone)]
pub struct TextExtractor {
    engine: Arc<dyn OcrEngine>,
    rasterizer: Arc<dyn PageRasterizer>,
    pipeline: Pipeline,
    language: String,
    page_separator: String,
}

impl TextExtractor {
    pub fn new(
        engine: Arc<dyn OcrEngine>,
        rasterizer: Arc<dyn PageRasterizer>,
        pipeline: Pipeline,
        language: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            rasterizer,
            pipeline,
            language: language.into(),
            page_separator: String::new(),
        }
    }

    /// Text placed between consecutive pages (empty by default)
    pub fn with_page_separator(mut self, separator: impl Into<String>) -> Self {
        self.page_separator = separator.into();
        self
    }

    /// Same engine and rasterizer with a different preset and language
    pub fn with_options(&self, pipeline: Pipeline, language: &str) -> Self {
        Self {
            pipeline,
            language: language.to_string(),
            ..self.clone()
        }
    }

    /// Same settings with a different engine
    pub fn with_engine(self, engine: Arc<dyn OcrEngine>) -> Self {
        Self { engine, ..self }
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    pub fn rasterizer_name(&self) -> &'static str {
        self.rasterizer.name()
    }

    pub fn pipeline(&self) -> Pipeline {
        self.pipeline
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn supported_languages(&self) -> Vec<String> {
        self.engine.supported_languages()
    }

    /// Extract the text of a staged upload
    pub fn extract(&self, upload: &StagedUpload) -> Result<ExtractedText, OcrError> {
        if upload.kind().is_pdf() {
            self.extract_document(upload.path())
        } else {
            self.extract_image(upload.load_image()?)
        }
    }

    /// Preprocess and recognize a single image
    pub fn extract_image(&self, image: DynamicImage) -> Result<ExtractedText, OcrError> {
        self.check_language()?;
        let (text, report) = self.recognize_page(1, image)?;
        Ok(ExtractedText {
            text,
            pages: vec![report],
        })
    }

    /// Rasterize, preprocess and recognize every page of a PDF, in order
    ///
    /// The first page that fails aborts the whole document.
    pub fn extract_document(&self, path: &Path) -> Result<ExtractedText, OcrError> {
        self.check_language()?;

        let document = self.rasterizer.open(path)?;
        let page_count = document.page_count();
        let mut texts = Vec::with_capacity(page_count);
        let mut pages = Vec::with_capacity(page_count);

        for index in 0..page_count {
            tracing::debug!("Processing page {} of {}", index + 1, page_count);
            let image = document.render_page(index)?;
            let (text, report) = self.recognize_page(index + 1, image)?;
            texts.push(text);
            pages.push(report);
        }

        Ok(ExtractedText {
            text: texts.join(&self.page_separator),
            pages,
        })
    }

    fn recognize_page(
        &self,
        page: usize,
        image: DynamicImage,
    ) -> Result<(String, PageReport), OcrError> {
        let preprocessed = self.pipeline.process(image)?;
        let text = self.engine.recognize(&preprocessed.image, &self.language)?;

        let report = PageReport {
            page,
            chars: text.chars().count(),
            preprocessing_ms: preprocessed.total_time_ms,
            steps: preprocessed.steps,
        };
        Ok((text, report))
    }

    fn check_language(&self) -> Result<(), OcrError> {
        let supported = self.engine.supported_languages();
        if supported.iter().any(|lang| lang == &self.language) {
            return Ok(());
        }
        Err(OcrError::InvalidRequest(format!(
            "Language '{}' is not supported by {} (available: {})",
            self.language,
            self.engine.name(),
            supported.join(", ")
        )))
    }
}
