//! Speech synthesis for extracted text
//!
//! A backend opens a short-lived session per call; nothing about the
//! synthesizer (voice, rate) is shared between requests.

pub mod espeak;

use crate::config::SpeechConfig;
use crate::error::SpeechError;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A voice offered by a synthesizer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Voice {
    /// Identifier passed back to the synthesizer
    pub id: String,
    /// Human-readable name, including gender when the synthesizer reports it
    pub name: String,
}

/// Factory for synthesizer sessions
pub trait SpeechBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Acquire a fresh session with default voice and rate
    fn open(&self) -> Result<Box<dyn SpeechSession>, SpeechError>;
}

/// One synthesizer session, released when dropped
pub trait SpeechSession {
    fn voices(&self) -> Vec<Voice>;

    /// Current rate in the synthesizer's own units
    fn rate(&self) -> u32;

    fn set_rate(&mut self, rate: u32);

    fn set_voice(&mut self, voice: &Voice);

    /// Synthesize `text` into an audio file at `path`
    fn save_to_file(&mut self, text: &str, path: &Path) -> Result<(), SpeechError>;

    /// Synthesize `text` to the default audio output
    fn speak(&mut self, text: &str) -> Result<(), SpeechError>;
}

/// Voice and rate preferences
#[derive(Debug, Clone)]
pub struct SpeechOptions {
    pub voice_hint: String,
    pub rate_factor: f32,
}

impl Default for SpeechOptions {
    fn default() -> Self {
        Self {
            voice_hint: "female".to_string(),
            rate_factor: 0.6,
        }
    }
}

impl From<&SpeechConfig> for SpeechOptions {
    fn from(config: &SpeechConfig) -> Self {
        Self {
            voice_hint: config.voice_hint.clone(),
            rate_factor: config.rate_factor,
        }
    }
}

/// Audio written by the renderer
#[derive(Debug, Clone, Serialize)]
pub struct AudioArtifact {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub mime: &'static str,
}

/// First voice whose name contains `hint`, ignoring case
pub fn select_voice<'a>(voices: &'a [Voice], hint: &str) -> Option<&'a Voice> {
    if hint.is_empty() {
        return None;
    }
    let hint = hint.to_lowercase();
    voices
        .iter()
        .find(|voice| voice.name.to_lowercase().contains(&hint))
}

/// Scale a default rate, never going below 1
pub fn scaled_rate(default_rate: u32, factor: f32) -> u32 {
    let scaled = (default_rate as f64 * factor as f64).round();
    if scaled.is_finite() && scaled >= 1.0 {
        scaled.min(u32::MAX as f64) as u32
    } else {
        1
    }
}

/// Turns text into speech through a backend
#[derive(Clone)]
pub struct SpeechRenderer {
    backend: Arc<dyn SpeechBackend>,
    options: SpeechOptions,
}

impl SpeechRenderer {
    pub fn new(backend: Arc<dyn SpeechBackend>, options: SpeechOptions) -> Self {
        Self { backend, options }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Write speech for `text` to `output_path`
    pub fn render(&self, text: &str, output_path: &Path) -> Result<AudioArtifact, SpeechError> {
        ensure_not_empty(text)?;
        let mut session = self.open_session()?;

        session.save_to_file(text, output_path)?;

        let metadata = match std::fs::metadata(output_path) {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => {
                return Err(SpeechError::ArtifactNotWritten {
                    path: output_path.to_path_buf(),
                })
            }
        };

        tracing::info!(
            "Synthesized {} chars to {:?} ({} bytes)",
            text.chars().count(),
            output_path,
            metadata.len()
        );

        Ok(AudioArtifact {
            path: output_path.to_path_buf(),
            size_bytes: metadata.len(),
            mime: "audio/wav",
        })
    }

    /// Render into a temporary directory and return the audio bytes
    pub fn render_to_bytes(&self, text: &str) -> Result<Vec<u8>, SpeechError> {
        ensure_not_empty(text)?;
        let staging = TempDir::new()?;
        let artifact = self.render(text, &staging.path().join("speech.wav"))?;
        Ok(std::fs::read(&artifact.path)?)
    }

    /// Read `text` aloud on the default audio output
    pub fn speak(&self, text: &str) -> Result<(), SpeechError> {
        ensure_not_empty(text)?;
        let mut session = self.open_session()?;
        session.speak(text)
    }

    fn open_session(&self) -> Result<Box<dyn SpeechSession>, SpeechError> {
        let mut session = self.backend.open()?;

        let voices = session.voices();
        match select_voice(&voices, &self.options.voice_hint) {
            Some(voice) => {
                tracing::debug!("Using voice {}", voice.name);
                session.set_voice(voice);
            }
            None => tracing::debug!(
                "No voice matches '{}', keeping the default",
                self.options.voice_hint
            ),
        }

        let rate = scaled_rate(session.rate(), self.options.rate_factor);
        session.set_rate(rate);

        Ok(session)
    }
}

fn ensure_not_empty(text: &str) -> Result<(), SpeechError> {
    if text.trim().is_empty() {
        return Err(SpeechError::EmptyInput);
    }
    Ok(())
}
