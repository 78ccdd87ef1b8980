use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("Failed to initialize OCR engine: {0}")]
    InitializationError(String),

    #[error("Text recognition failed: {0}")]
    RecognitionError(String),

    #[error("Failed to rasterize page {page}: {reason}")]
    RasterizationError { page: usize, reason: String },

    #[error("Preprocessing failed: {0}")]
    PreprocessingError(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),

    #[error("Unreadable or corrupt file: {0}")]
    CorruptFile(String),

    #[error("File too large: {size} bytes (max: {max} bytes)")]
    FileTooLarge { size: usize, max: usize },

    #[error("Missing file in request")]
    MissingFile,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("{stage} timed out after {secs}s")]
    Timeout { stage: &'static str, secs: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OcrError {
    /// Input errors abort the request before the pipeline runs.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            OcrError::UnsupportedFormat(_)
                | OcrError::CorruptFile(_)
                | OcrError::FileTooLarge { .. }
                | OcrError::MissingFile
                | OcrError::InvalidRequest(_)
        )
    }

    pub fn status_code(&self) -> StatusCode {
        self.status_and_code().0
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            OcrError::InitializationError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INIT_ERROR"),
            OcrError::RecognitionError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "RECOGNITION_ERROR")
            }
            OcrError::RasterizationError { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "RASTERIZATION_ERROR")
            }
            OcrError::PreprocessingError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "PREPROCESSING_ERROR")
            }
            OcrError::UnsupportedFormat(_) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, "UNSUPPORTED_FORMAT")
            }
            OcrError::CorruptFile(_) => (StatusCode::BAD_REQUEST, "CORRUPT_FILE"),
            OcrError::FileTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "FILE_TOO_LARGE"),
            OcrError::MissingFile => (StatusCode::BAD_REQUEST, "MISSING_FILE"),
            OcrError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            OcrError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT"),
            OcrError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

/// Failures of the speech renderer. These never invalidate extracted text.
#[derive(Error, Debug)]
pub enum SpeechError {
    #[error("The extracted text is empty.")]
    EmptyInput,

    #[error("Speech engine unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Speech synthesis failed: {0}")]
    SynthesisFailed(String),

    #[error("Audio file was not created at {}", path.display())]
    ArtifactNotWritten { path: PathBuf },

    #[error("Speech synthesis timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpeechError {
    /// Message shown next to the extracted text in the UI.
    pub fn user_message(&self) -> String {
        format!("Error converting text to speech: {}", self)
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            SpeechError::EmptyInput => (StatusCode::UNPROCESSABLE_ENTITY, "EMPTY_INPUT"),
            SpeechError::BackendUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SPEECH_UNAVAILABLE")
            }
            SpeechError::SynthesisFailed(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "SYNTHESIS_ERROR")
            }
            SpeechError::ArtifactNotWritten { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "ARTIFACT_NOT_WRITTEN")
            }
            SpeechError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT"),
            SpeechError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
        }
    }
}

/// Minimum-area rectangle fitting has no answer for this point set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    #[error("cannot fit a rectangle to {points} foreground point(s)")]
    Degenerate { points: usize },
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

fn error_response(status: StatusCode, code: &str, message: String) -> Response {
    let body = Json(ErrorResponse {
        error: message,
        code: code.to_string(),
    });

    (status, body).into_response()
}

impl IntoResponse for OcrError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        error_response(status, code, self.to_string())
    }
}

impl IntoResponse for SpeechError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        error_response(status, code, self.to_string())
    }
}
