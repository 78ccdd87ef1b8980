use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use docreader::config::Config;
use docreader::engine::OcrEngine;
use docreader::engines::EngineRegistry;
use docreader::error::{OcrError, SpeechError};
use docreader::rasterizer;
use docreader::server::{router, AppState};
use docreader::speech::{SpeechBackend, SpeechSession, Voice};
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use serde_json::Value;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const BOUNDARY: &str = "docreader-test-boundary";
const RECOGNIZED: &str = "5 < 6 & done";

struct FixedEngine;

impl OcrEngine for FixedEngine {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn description(&self) -> &'static str {
        "always returns the same text"
    }

    fn recognize(&self, _image: &DynamicImage, _language: &str) -> Result<String, OcrError> {
        Ok(RECOGNIZED.to_string())
    }

    fn supported_languages(&self) -> Vec<String> {
        vec!["eng".to_string()]
    }
}

/// Outlasts the one-second OCR timeout used in tests
struct SlowEngine;

impl OcrEngine for SlowEngine {
    fn name(&self) -> &'static str {
        "slow"
    }

    fn description(&self) -> &'static str {
        "sleeps before answering"
    }

    fn recognize(&self, _image: &DynamicImage, _language: &str) -> Result<String, OcrError> {
        std::thread::sleep(Duration::from_secs(3));
        Ok(RECOGNIZED.to_string())
    }

    fn supported_languages(&self) -> Vec<String> {
        vec!["eng".to_string()]
    }
}

#[derive(Debug, Clone, Copy)]
enum SpeechMode {
    /// Writes a fixed WAV header
    Working,
    /// Fails to start
    Unavailable,
    /// Reports success without writing the file
    Silent,
    /// Sleeps past the one-second speech timeout
    Slow,
}

struct FakeSpeech {
    mode: SpeechMode,
}

struct FakeSession {
    mode: SpeechMode,
}

impl SpeechBackend for FakeSpeech {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn open(&self) -> Result<Box<dyn SpeechSession>, SpeechError> {
        match self.mode {
            SpeechMode::Unavailable => Err(SpeechError::BackendUnavailable(
                "speakers unplugged".to_string(),
            )),
            mode => Ok(Box::new(FakeSession { mode })),
        }
    }
}

impl SpeechSession for FakeSession {
    fn voices(&self) -> Vec<Voice> {
        Vec::new()
    }

    fn rate(&self) -> u32 {
        175
    }

    fn set_rate(&mut self, _rate: u32) {}

    fn set_voice(&mut self, _voice: &Voice) {}

    fn save_to_file(&mut self, _text: &str, path: &Path) -> Result<(), SpeechError> {
        match self.mode {
            SpeechMode::Silent => {}
            SpeechMode::Slow => {
                std::thread::sleep(Duration::from_secs(3));
                std::fs::write(path, b"RIFF\0\0\0\0WAVE")?;
            }
            _ => std::fs::write(path, b"RIFF\0\0\0\0WAVE")?,
        }
        Ok(())
    }

    fn speak(&mut self, _text: &str) -> Result<(), SpeechError> {
        Ok(())
    }
}

fn build_app(config: Config, engine: Arc<dyn OcrEngine>, speech: SpeechMode) -> Router {
    let registry = EngineRegistry::from_engines(vec![engine], None).unwrap();
    let rasterizer = rasterizer::from_name("lopdf").unwrap();
    let speech = Arc::new(FakeSpeech { mode: speech });
    router(AppState::new(config, registry, rasterizer, speech).unwrap())
}

fn app_with(config: Config, speech_available: bool) -> Router {
    let speech = if speech_available {
        SpeechMode::Working
    } else {
        SpeechMode::Unavailable
    };
    build_app(config, Arc::new(FixedEngine), speech)
}

fn app() -> Router {
    app_with(Config::default(), true)
}

fn png_bytes() -> Vec<u8> {
    let img = GrayImage::from_fn(24, 16, |x, _| Luma([if x % 6 == 0 { 30 } else { 220 }]));
    let mut data = Vec::new();
    DynamicImage::ImageLuma8(img)
        .write_to(&mut Cursor::new(&mut data), ImageFormat::Png)
        .unwrap();
    data
}

fn multipart_body(content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"scan\"\r\nContent-Type: {}\r\n\r\n",
            BOUNDARY, content_type
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn upload_request(uri: &str, content_type: &str, data: &[u8]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(content_type, data)))
        .unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn json_body(response: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

async fn text_body(response: axum::response::Response) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let response = app()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_info_describes_configuration() {
    let response = app()
        .oneshot(Request::get("/info").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["default_engine"], "fixed");
    assert_eq!(json["rasterizer"], "lopdf");
    assert_eq!(json["preset"], "parity");
    assert_eq!(json["default_language"], "eng");
    let formats: Vec<&str> = json["supported_formats"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    assert_eq!(formats, vec!["application/pdf", "image/png", "image/jpeg"]);
}

#[tokio::test]
async fn test_index_serves_upload_form() {
    let response = app()
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let html = text_body(response).await;
    assert!(html.contains(r#"action="/extract""#));
}

#[tokio::test]
async fn test_ocr_returns_text_and_page_report() {
    let response = app()
        .oneshot(upload_request("/ocr", "image/png", &png_bytes()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["text"], RECOGNIZED);
    assert_eq!(json["engine"], "fixed");
    assert_eq!(json["preset"], "parity");
    assert_eq!(json["language"], "eng");
    assert_eq!(json["pages"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_ocr_preset_query() {
    let response = app()
        .oneshot(upload_request(
            "/ocr?preset=streamlined",
            "image/png",
            &png_bytes(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["preset"], "streamlined");
    assert_eq!(json["pages"][0]["steps"].as_array().unwrap().len(), 5);

    let response = app()
        .oneshot(upload_request("/ocr?preset=bogus", "image/png", &png_bytes()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_ocr_rejects_unsupported_type() {
    let response = app()
        .oneshot(upload_request("/ocr", "image/gif", b"GIF89a\x01\x00\x01\x00"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let json = json_body(response).await;
    assert_eq!(json["code"], "UNSUPPORTED_FORMAT");
}

#[tokio::test]
async fn test_ocr_rejects_mismatched_content() {
    let response = app()
        .oneshot(upload_request("/ocr", "image/png", b"%PDF-1.4 not really"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["code"], "CORRUPT_FILE");
}

#[tokio::test]
async fn test_ocr_rejects_large_files() {
    let config = Config {
        max_file_size: 64,
        ..Config::default()
    };
    let response = app_with(config, true)
        .oneshot(upload_request("/ocr", "image/png", &vec![0x89; 500]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let json = json_body(response).await;
    assert_eq!(json["code"], "FILE_TOO_LARGE");
}

#[tokio::test]
async fn test_ocr_requires_a_file() {
    let body = format!(
        "--{}\r\nContent-Disposition: form-data; name=\"language\"\r\n\r\neng\r\n--{}--\r\n",
        BOUNDARY, BOUNDARY
    );
    let request = Request::builder()
        .method("POST")
        .uri("/ocr")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap();

    let response = app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["code"], "MISSING_FILE");
}

#[tokio::test]
async fn test_extract_page_shows_escaped_text() {
    let response = app()
        .oneshot(upload_request("/extract", "image/png", &png_bytes()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let html = text_body(response).await;
    assert!(html.contains("5 &lt; 6 &amp; done</textarea>"));
    assert!(html.contains(r#"action="/synthesize""#));
}

#[tokio::test]
async fn test_extract_page_reports_input_errors() {
    let response = app()
        .oneshot(upload_request("/extract", "text/plain", b"hello"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let html = text_body(response).await;
    assert!(html.contains("Error extracting text"));
}

fn synthesize_request(text: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/synthesize")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form_encode(text)))
        .unwrap()
}

/// Minimal application/x-www-form-urlencoded encoding for `text=...`
fn form_encode(text: &str) -> String {
    let mut encoded = String::from("text=");
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'*' => {
                encoded.push(byte as char)
            }
            b' ' => encoded.push('+'),
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

#[tokio::test]
async fn test_synthesize_embeds_audio() {
    let response = app()
        .oneshot(synthesize_request("Read me aloud"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let html = text_body(response).await;
    assert!(html.contains("data:audio/wav;base64,"));
    assert!(html.contains(">\nRead me aloud</textarea>"));
}

#[tokio::test]
async fn test_synthesize_failure_keeps_text() {
    let response = app_with(Config::default(), false)
        .oneshot(synthesize_request("Still here & readable"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let html = text_body(response).await;
    assert!(html.contains("Error converting text to speech: "));
    assert!(html.contains("speakers unplugged"));
    assert!(html.contains(">\nStill here &amp; readable</textarea>"));
    assert!(!html.contains("<audio"));
}

#[tokio::test]
async fn test_synthesize_reports_missing_audio_file() {
    let response = build_app(Config::default(), Arc::new(FixedEngine), SpeechMode::Silent)
        .oneshot(synthesize_request("Nothing came out"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let html = text_body(response).await;
    assert!(html.contains("Error converting text to speech: Audio file was not created"));
    assert!(html.contains(">\nNothing came out</textarea>"));
    assert!(!html.contains("<audio"));
}

#[tokio::test]
async fn test_synthesize_timeout_keeps_text() {
    let config = Config {
        speech_timeout_secs: 1,
        ..Config::default()
    };
    let response = build_app(config, Arc::new(FixedEngine), SpeechMode::Slow)
        .oneshot(synthesize_request("Too slow to say"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let html = text_body(response).await;
    assert!(html.contains("Speech synthesis timed out after 1s"));
    assert!(html.contains(">\nToo slow to say</textarea>"));
    assert!(!html.contains("<audio"));
}

#[tokio::test]
async fn test_ocr_timeout_is_gateway_timeout() {
    let config = Config {
        ocr_timeout_secs: 1,
        ..Config::default()
    };
    let response = build_app(config, Arc::new(SlowEngine), SpeechMode::Working)
        .oneshot(upload_request("/ocr", "image/png", &png_bytes()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    let json = json_body(response).await;
    assert_eq!(json["code"], "TIMEOUT");
}

#[tokio::test]
async fn test_extract_timeout_shows_error_page() {
    let config = Config {
        ocr_timeout_secs: 1,
        ..Config::default()
    };
    let response = build_app(config, Arc::new(SlowEngine), SpeechMode::Working)
        .oneshot(upload_request("/extract", "image/png", &png_bytes()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    let html = text_body(response).await;
    assert!(html.contains("timed out"));
}

#[tokio::test]
async fn test_synthesize_empty_text_is_reported() {
    let response = app().oneshot(synthesize_request("   ")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let html = text_body(response).await;
    assert!(html.contains("The extracted text is empty."));
}

fn speech_request(text: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/speech")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::json!({ "text": text }).to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_speech_returns_wav() {
    let response = app().oneshot(speech_request("Hello")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "audio/wav"
    );
    assert_eq!(body_bytes(response).await, b"RIFF\0\0\0\0WAVE");
}

#[tokio::test]
async fn test_speech_rejects_empty_text() {
    let response = app().oneshot(speech_request("")).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = json_body(response).await;
    assert_eq!(json["code"], "EMPTY_INPUT");
}

#[tokio::test]
async fn test_speech_backend_unavailable() {
    let response = app_with(Config::default(), false)
        .oneshot(speech_request("Hello"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
