use crate::config::Config;
use crate::engines::{EngineInfo, EngineRegistry};
use crate::error::{OcrError, SpeechError};
use crate::extractor::{ExtractedText, PageReport, TextExtractor};
use crate::html::{self, SpeechPanel};
use crate::input::{self, InputKind, StagedUpload};
use crate::preprocessing::{Pipeline, Preset};
use crate::rasterizer::{self, PageRasterizer};
use crate::speech::espeak::EspeakBackend;
use crate::speech::{SpeechBackend, SpeechOptions, SpeechRenderer};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::header,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Form, Router,
};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::trace::TraceLayer;

/// Room for multipart boundaries and headers on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<EngineRegistry>,
    pub extractor: TextExtractor,
    pub speech: SpeechRenderer,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire up the default engine, the configured rasterizer and a speech backend
    pub fn new(
        config: Config,
        registry: EngineRegistry,
        rasterizer: Arc<dyn PageRasterizer>,
        speech_backend: Arc<dyn SpeechBackend>,
    ) -> Result<Self, OcrError> {
        let engine = registry.default().ok_or_else(|| {
            OcrError::InitializationError("No default OCR engine".to_string())
        })?;

        let extractor = TextExtractor::new(
            engine,
            rasterizer,
            Pipeline::new(config.preset),
            config.default_language.clone(),
        )
        .with_page_separator(config.page_separator.clone());
        let speech = SpeechRenderer::new(speech_backend, SpeechOptions::from(&config.speech));

        Ok(Self {
            registry: Arc::new(registry),
            extractor,
            speech,
            config: Arc::new(config),
        })
    }

    /// Build everything from configuration, initializing the compiled-in engines
    pub fn from_config(config: Config) -> Result<Self, OcrError> {
        let registry = EngineRegistry::new(&config)?;
        let rasterizer = rasterizer::from_name(&config.rasterizer)?;
        let speech_backend = Arc::new(EspeakBackend::new(config.speech.command.clone()));
        Self::new(config, registry, rasterizer, speech_backend)
    }

    /// Run extraction on the blocking pool, bounded by the OCR timeout
    pub async fn extract(
        &self,
        extractor: TextExtractor,
        kind: InputKind,
        data: Vec<u8>,
    ) -> Result<ExtractedText, OcrError> {
        let secs = self.config.ocr_timeout_secs;
        // The staged file is owned by the task and removed whenever it ends
        let task = tokio::task::spawn_blocking(move || {
            let staged = StagedUpload::from_bytes(kind, &data)?;
            extractor.extract(&staged)
        });

        match tokio::time::timeout(Duration::from_secs(secs), task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(OcrError::Internal(format!("Extraction task failed: {}", e))),
            Err(_) => {
                tracing::warn!("OCR timed out after {}s", secs);
                Err(OcrError::Timeout { stage: "OCR", secs })
            }
        }
    }

    /// Run speech synthesis on the blocking pool, bounded by the speech timeout
    pub async fn synthesize(&self, text: String) -> Result<Vec<u8>, SpeechError> {
        let secs = self.config.speech_timeout_secs;
        let speech = self.speech.clone();
        let task = tokio::task::spawn_blocking(move || speech.render_to_bytes(&text));

        let result = match tokio::time::timeout(Duration::from_secs(secs), task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(SpeechError::SynthesisFailed(format!(
                "Synthesis task failed: {}",
                e
            ))),
            Err(_) => Err(SpeechError::Timeout { secs }),
        };

        if let Err(e) = &result {
            tracing::warn!("Speech synthesis failed: {}", e);
        }
        result
    }
}

/// OCR response
#[derive(Serialize)]
pub struct OcrResponse {
    pub text: String,
    pub pages: Vec<PageReport>,
    pub processing_time_ms: u64,
    pub engine: String,
    pub preset: String,
    pub language: String,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Server info response
#[derive(Serialize)]
pub struct InfoResponse {
    pub version: String,
    pub default_engine: String,
    pub engines: Vec<EngineInfo>,
    pub rasterizer: String,
    pub speech_backend: String,
    pub supported_formats: Vec<String>,
    pub supported_languages: Vec<String>,
    pub max_file_size_bytes: usize,
    pub default_language: String,
    pub preset: String,
}

#[derive(Debug, Deserialize)]
pub struct OcrQuery {
    pub preset: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SpeechRequest {
    pub text: String,
}

/// A file pulled out of a multipart form
struct Upload {
    data: Vec<u8>,
    content_type: Option<String>,
    language: Option<String>,
    engine: Option<String>,
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_file_size.saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/", get(handle_index))
        .route("/extract", post(handle_extract))
        .route("/synthesize", post(handle_synthesize))
        .route("/ocr", post(handle_ocr))
        .route("/speech", post(handle_speech))
        .route("/health", get(handle_health))
        .route("/info", get(handle_info))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::from_config(config)?;

    tracing::info!(
        "Using engine {}, rasterizer {}, preset {}",
        state.extractor.engine_name(),
        state.extractor.rasterizer_name(),
        state.extractor.pipeline().preset().as_str()
    );

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Read the `file` field (and optional `language`/`engine` fields)
async fn read_upload(mut multipart: Multipart, max_file_size: usize) -> Result<Upload, OcrError> {
    let mut upload: Option<(Vec<u8>, Option<String>)> = None;
    let mut language = None;
    let mut engine = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| OcrError::InvalidRequest(format!("Failed to parse multipart: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "file" => {
                let content_type = field.content_type().map(|s| s.to_string());
                let mut data = Vec::new();
                while let Some(chunk) = field.chunk().await.map_err(|e| {
                    OcrError::InvalidRequest(format!("Failed to read file data: {}", e))
                })? {
                    input::ensure_within_limit(data.len() + chunk.len(), max_file_size)?;
                    data.extend_from_slice(&chunk);
                }
                upload = Some((data, content_type));
            }
            "language" | "languages" => {
                let value = field.text().await.map_err(|e| {
                    OcrError::InvalidRequest(format!("Invalid language: {}", e))
                })?;
                language = Some(value.trim().to_string()).filter(|v| !v.is_empty());
            }
            "engine" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| OcrError::InvalidRequest(format!("Invalid engine: {}", e)))?;
                engine = Some(value.trim().to_string()).filter(|v| !v.is_empty());
            }
            _ => {
                // Ignore unknown fields
            }
        }
    }

    let (data, content_type) = upload.ok_or(OcrError::MissingFile)?;
    if data.is_empty() {
        return Err(OcrError::MissingFile);
    }

    Ok(Upload {
        data,
        content_type,
        language,
        engine,
    })
}

/// Serve the upload form
async fn handle_index() -> Html<String> {
    Html(html::index_page())
}

/// Handle form uploads from the index page
async fn handle_extract(State(state): State<AppState>, multipart: Multipart) -> Response {
    let start = Instant::now();

    let result = async {
        let upload = read_upload(multipart, state.config.max_file_size).await?;
        let kind = input::detect(upload.content_type.as_deref(), &upload.data)?;
        state
            .extract(state.extractor.clone(), kind, upload.data)
            .await
    }
    .await;

    match result {
        Ok(extracted) => {
            tracing::info!(
                "Extracted {} chars from {} page(s) in {}ms",
                extracted.text.len(),
                extracted.pages.len(),
                start.elapsed().as_millis()
            );
            Html(html::result_page(&extracted.text, SpeechPanel::None)).into_response()
        }
        Err(e) => {
            if e.is_input_error() {
                tracing::info!("Rejected upload: {}", e);
            } else {
                tracing::warn!("Extraction failed: {}", e);
            }
            let message = format!("Error extracting text: {}", e);
            (e.status_code(), Html(html::error_page(&message))).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SynthesizeForm {
    #[serde(default)]
    pub text: String,
}

/// Convert the displayed text to speech; failures keep the text on screen
async fn handle_synthesize(
    State(state): State<AppState>,
    Form(form): Form<SynthesizeForm>,
) -> Html<String> {
    let page = match state.synthesize(form.text.clone()).await {
        Ok(audio) => {
            let data_uri = format!(
                "data:audio/wav;base64,{}",
                base64::engine::general_purpose::STANDARD.encode(&audio)
            );
            html::result_page(&form.text, SpeechPanel::Audio(&data_uri))
        }
        Err(e) => html::result_page(&form.text, SpeechPanel::Error(&e.user_message())),
    };

    Html(page)
}

/// Handle OCR requests
async fn handle_ocr(
    State(state): State<AppState>,
    Query(query): Query<OcrQuery>,
    multipart: Multipart,
) -> Result<Json<OcrResponse>, OcrError> {
    let start = Instant::now();

    let preset = match query.preset.as_deref() {
        Some(name) => Preset::from_str(name).ok_or_else(|| {
            OcrError::InvalidRequest(format!(
                "Unknown preset '{}' (expected parity or streamlined)",
                name
            ))
        })?,
        None => state.extractor.pipeline().preset(),
    };

    let upload = read_upload(multipart, state.config.max_file_size).await?;
    let kind = input::detect(upload.content_type.as_deref(), &upload.data)?;

    let mut extractor = state.extractor.with_options(
        Pipeline::new(preset),
        upload
            .language
            .as_deref()
            .unwrap_or(&state.config.default_language),
    );
    if let Some(name) = upload.engine.as_deref() {
        let engine = state.registry.get(name).ok_or_else(|| {
            OcrError::InvalidRequest(format!(
                "Unknown engine '{}' (available: {})",
                name,
                state.registry.list().join(", ")
            ))
        })?;
        extractor = extractor.with_engine(engine);
    }

    let engine = extractor.engine_name().to_string();
    let language = extractor.language().to_string();
    let extracted = state.extract(extractor, kind, upload.data).await?;

    let processing_time_ms = start.elapsed().as_millis() as u64;

    tracing::info!(
        "OCR completed in {}ms using {}, {} page(s), text length: {}",
        processing_time_ms,
        engine,
        extracted.pages.len(),
        extracted.text.len()
    );

    Ok(Json(OcrResponse {
        text: extracted.text,
        pages: extracted.pages,
        processing_time_ms,
        engine,
        preset: preset.as_str().to_string(),
        language,
    }))
}

/// Synthesize speech and return the WAV bytes
async fn handle_speech(
    State(state): State<AppState>,
    Json(request): Json<SpeechRequest>,
) -> Result<Response, SpeechError> {
    let audio = state.synthesize(request.text).await?;
    Ok(([(header::CONTENT_TYPE, "audio/wav")], audio).into_response())
}

/// Handle health check requests
async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Handle info requests
async fn handle_info(State(state): State<AppState>) -> impl IntoResponse {
    Json(InfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        default_engine: state.registry.default_name().to_string(),
        engines: state.registry.info(),
        rasterizer: state.extractor.rasterizer_name().to_string(),
        speech_backend: state.speech.backend_name().to_string(),
        supported_formats: InputKind::ALL
            .iter()
            .map(|kind| kind.mime().to_string())
            .collect(),
        supported_languages: state.extractor.supported_languages(),
        max_file_size_bytes: state.config.max_file_size,
        default_language: state.config.default_language.clone(),
        preset: state.extractor.pipeline().preset().as_str().to_string(),
    })
}
