use crate::preprocessing::Preset;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "docreader-server")]
#[command(about = "Extract text from scanned documents and read it aloud")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Host address to bind to
    #[arg(long, env = "OCR_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "OCR_PORT", default_value = "9292")]
    pub port: u16,

    /// Language passed to the OCR engine (e.g., "eng")
    #[arg(long, env = "OCR_DEFAULT_LANGUAGE", default_value = "eng")]
    pub default_language: String,

    /// Maximum file size in bytes (default: 50MB)
    #[arg(long, env = "OCR_MAX_FILE_SIZE", default_value = "52428800")]
    pub max_file_size: usize,

    /// Path to tessdata directory (downloaded to the cache if not set)
    #[arg(long, env = "TESSDATA_PREFIX")]
    pub tessdata_path: Option<String>,

    /// OCR engine to use (defaults to the first compiled-in engine)
    #[arg(long, env = "OCR_ENGINE")]
    pub engine: Option<String>,

    /// PDF rasterizer: "lopdf" (built in) or "pdftoppm" (poppler-utils)
    #[arg(long, env = "OCR_RASTERIZER", default_value = "lopdf")]
    pub rasterizer: String,

    /// Preprocessing preset: "parity" or "streamlined"
    #[arg(long, env = "OCR_PRESET", default_value = "parity")]
    pub preset: String,

    /// Text inserted between the OCR output of consecutive PDF pages
    #[arg(long, env = "OCR_PAGE_SEPARATOR", default_value = "")]
    pub page_separator: String,

    /// Upper bound for one extraction request, in seconds
    #[arg(long, env = "OCR_TIMEOUT_SECS", default_value = "120")]
    pub ocr_timeout_secs: u64,

    /// Upper bound for one speech synthesis request, in seconds
    #[arg(long, env = "SPEECH_TIMEOUT_SECS", default_value = "60")]
    pub speech_timeout_secs: u64,

    /// Speech synthesizer executable (espeak-ng compatible)
    #[arg(long, env = "SPEECH_COMMAND", default_value = "espeak-ng")]
    pub speech_command: String,

    /// Multiplier applied to the synthesizer's default speaking rate
    #[arg(long, env = "SPEECH_RATE_FACTOR", default_value = "0.6")]
    pub speech_rate_factor: f32,

    /// Preferred voice, matched case-insensitively against voice names
    #[arg(long, env = "SPEECH_VOICE_HINT", default_value = "female")]
    pub speech_voice_hint: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve,

    /// Extract text from a single file and print it
    Extract {
        /// PDF, PNG or JPEG file to read
        file: PathBuf,

        /// Read the extracted text aloud
        #[arg(long)]
        speak: bool,

        /// Also write the speech audio to this path
        #[arg(long)]
        audio_out: Option<PathBuf>,
    },
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub default_language: String,
    pub max_file_size: usize,
    pub tessdata_path: Option<String>,
    pub engine: Option<String>,
    pub rasterizer: String,
    pub preset: Preset,
    pub page_separator: String,
    pub ocr_timeout_secs: u64,
    pub speech_timeout_secs: u64,
    pub speech: SpeechConfig,
}

/// Speech renderer settings
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    pub command: String,
    pub rate_factor: f32,
    pub voice_hint: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            command: "espeak-ng".to_string(),
            rate_factor: 0.6,
            voice_hint: "female".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9292,
            default_language: "eng".to_string(),
            max_file_size: 52_428_800,
            tessdata_path: None,
            engine: None,
            rasterizer: "lopdf".to_string(),
            preset: Preset::default(),
            page_separator: String::new(),
            ocr_timeout_secs: 120,
            speech_timeout_secs: 60,
            speech: SpeechConfig::default(),
        }
    }
}

impl TryFrom<Args> for Config {
    type Error = anyhow::Error;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let preset = Preset::from_str(&args.preset)
            .ok_or_else(|| anyhow::anyhow!("Unknown preprocessing preset: {}", args.preset))?;

        Ok(Self {
            host: args.host,
            port: args.port,
            default_language: args.default_language,
            max_file_size: args.max_file_size,
            tessdata_path: args.tessdata_path,
            engine: args.engine,
            rasterizer: args.rasterizer,
            preset,
            page_separator: args.page_separator,
            ocr_timeout_secs: args.ocr_timeout_secs,
            speech_timeout_secs: args.speech_timeout_secs,
            speech: SpeechConfig {
                command: args.speech_command,
                rate_factor: args.speech_rate_factor,
                voice_hint: args.speech_voice_hint,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_cli_defaults() {
        let args = Args::parse_from(["docreader-server"]);
        let config = Config::try_from(args).unwrap();
        let defaults = Config::default();

        assert_eq!(config.port, defaults.port);
        assert_eq!(config.default_language, "eng");
        assert_eq!(config.preset, Preset::Parity);
        assert_eq!(config.page_separator, "");
        assert_eq!(config.speech.voice_hint, "female");
        assert!((config.speech.rate_factor - 0.6).abs() < f32::EPSILON);
    }

    #[test]
    fn test_unknown_preset_rejected() {
        let args = Args::parse_from(["docreader-server", "--preset", "fancy"]);
        assert!(Config::try_from(args).is_err());
    }

    #[test]
    fn test_extract_subcommand() {
        let args = Args::parse_from(["docreader-server", "extract", "scan.png", "--speak"]);
        match args.command {
            Some(Command::Extract { file, speak, audio_out }) => {
                assert_eq!(file, PathBuf::from("scan.png"));
                assert!(speak);
                assert!(audio_out.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
