//! espeak-ng command-line synthesizer
//!
//! Text is passed on stdin so it never has to survive shell quoting or
//! argument length limits. Audio is written as WAV with `-w`.

use super::{SpeechBackend, SpeechSession, Voice};
use crate::error::SpeechError;
use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, Stdio};

/// espeak-ng's default speaking rate, in words per minute
pub const DEFAULT_RATE: u32 = 175;

/// Backend that runs an espeak-ng compatible executable
#[derive(Debug, Clone)]
pub struct EspeakBackend {
    command: String,
}

impl EspeakBackend {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Default for EspeakBackend {
    fn default() -> Self {
        Self::new("espeak-ng")
    }
}

impl SpeechBackend for EspeakBackend {
    fn name(&self) -> &'static str {
        "espeak-ng"
    }

    fn open(&self) -> Result<Box<dyn SpeechSession>, SpeechError> {
        let output = Command::new(&self.command).arg("--voices").output();

        let voices = match output {
            Ok(output) if output.status.success() => {
                parse_voice_list(&String::from_utf8_lossy(&output.stdout))
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(SpeechError::BackendUnavailable(format!(
                    "{} --voices failed: {}",
                    self.command,
                    stderr.trim()
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SpeechError::BackendUnavailable(format!(
                    "{} not found (install espeak-ng)",
                    self.command
                )));
            }
            Err(e) => return Err(SpeechError::Io(e)),
        };

        tracing::debug!("{} offers {} voices", self.command, voices.len());

        Ok(Box::new(EspeakSession {
            command: self.command.clone(),
            voices,
            voice: None,
            rate: DEFAULT_RATE,
        }))
    }
}

struct EspeakSession {
    command: String,
    voices: Vec<Voice>,
    voice: Option<String>,
    rate: u32,
}

impl EspeakSession {
    fn run(&self, text: &str, output_path: Option<&Path>) -> Result<(), SpeechError> {
        let mut command = Command::new(&self.command);
        command.args(["-s", &self.rate.to_string()]);
        if let Some(voice) = &self.voice {
            command.args(["-v", voice]);
        }
        if let Some(path) = output_path {
            command.arg("-w").arg(path);
        }
        command
            .arg("--stdin")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SpeechError::BackendUnavailable(format!("{} not found", self.command))
            } else {
                SpeechError::Io(e)
            }
        })?;

        send_text(&mut child, text)?;

        let output = child.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SpeechError::SynthesisFailed(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        Ok(())
    }
}

/// Feed the text on stdin and close it; on failure the child is killed and
/// reaped before the error is returned
fn send_text(child: &mut Child, text: &str) -> Result<(), SpeechError> {
    let Some(mut stdin) = child.stdin.take() else {
        return Ok(());
    };
    if let Err(e) = stdin.write_all(text.as_bytes()) {
        drop(stdin);
        if let Err(kill_error) = child.kill() {
            tracing::debug!("Failed to kill synthesizer: {}", kill_error);
        }
        child.wait()?;
        return Err(SpeechError::Io(e));
    }
    Ok(())
}

impl SpeechSession for EspeakSession {
    fn voices(&self) -> Vec<Voice> {
        self.voices.clone()
    }

    fn rate(&self) -> u32 {
        self.rate
    }

    fn set_rate(&mut self, rate: u32) {
        self.rate = rate;
    }

    fn set_voice(&mut self, voice: &Voice) {
        self.voice = Some(voice.id.clone());
    }

    fn save_to_file(&mut self, text: &str, path: &Path) -> Result<(), SpeechError> {
        self.run(text, Some(path))
    }

    fn speak(&mut self, text: &str) -> Result<(), SpeechError> {
        self.run(text, None)
    }
}

/// Parse the table printed by `espeak-ng --voices`
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File                 Other Languages
///  5  af              --/M      Afrikaans          gmw/af
///  5  en-us           --/F      English_(America)  gmw/en-US
/// ```
///
/// The language code becomes the voice id. The display name carries the
/// gender spelled out so it can be matched by hints like "female".
pub fn parse_voice_list(output: &str) -> Vec<Voice> {
    output
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("Pty"))
        .skip(1)
        .filter_map(|line| {
            let mut columns = line.split_whitespace();
            let _priority = columns.next()?;
            let language = columns.next()?;
            let age_gender = columns.next()?;
            let name = columns.next()?;

            let gender = match age_gender.rsplit('/').next() {
                Some("F") => "female",
                Some("M") => "male",
                _ => "unspecified",
            };

            Some(Voice {
                id: language.to_string(),
                name: format!("{} ({}, {})", name.replace('_', " "), language, gender),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VOICES: &str = "\
Pty Language       Age/Gender VoiceName          File                 Other Languages
 5  af              --/M      Afrikaans          gmw/af
 5  en-gb           --/M      English_(Great_Britain) gmw/en            (en 2)
 5  en-us           --/F      English_(America)  gmw/en-US            (en 3)
 5  eo              --/-      Esperanto          art/eo
";

    #[test]
    fn test_parse_voice_list() {
        let voices = parse_voice_list(VOICES);
        assert_eq!(voices.len(), 4);
        assert_eq!(voices[0].id, "af");
        assert_eq!(voices[0].name, "Afrikaans (af, male)");
        assert_eq!(voices[1].name, "English (Great Britain) (en-gb, male)");
        assert_eq!(voices[2].id, "en-us");
        assert!(voices[2].name.contains("female"));
        assert!(voices[3].name.contains("unspecified"));
    }

    #[test]
    fn test_parse_ignores_noise() {
        assert!(parse_voice_list("").is_empty());
        assert!(parse_voice_list("espeak-ng: no voices\n").is_empty());
        let voices = parse_voice_list("Pty Language Age/Gender VoiceName File\n 5 xx\n");
        assert!(voices.is_empty());
    }

    #[test]
    fn test_female_hint_finds_female_voice() {
        let voices = parse_voice_list(VOICES);
        let chosen = super::super::select_voice(&voices, "female").unwrap();
        assert_eq!(chosen.id, "en-us");
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_text_write_reaps_child() {
        // Closes stdin right away, then would linger for a long time
        let mut child = Command::new("sh")
            .args(["-c", "exec 0<&-; sleep 30"])
            .stdin(Stdio::piped())
            .spawn()
            .unwrap();
        let started = std::time::Instant::now();

        let text = "x".repeat(4 * 1024 * 1024);
        let result = send_text(&mut child, &text);

        assert!(matches!(result, Err(SpeechError::Io(_))));
        assert!(child.try_wait().unwrap().is_some());
        assert!(started.elapsed() < std::time::Duration::from_secs(20));
    }

    #[cfg(unix)]
    #[test]
    fn test_send_text_closes_stdin() {
        let mut child = Command::new("cat")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()
            .unwrap();

        send_text(&mut child, "hello").unwrap();

        // cat only exits once stdin is closed
        assert!(child.wait().unwrap().success());
    }

    #[test]
    fn test_missing_binary_is_unavailable() {
        let backend = EspeakBackend::new("docreader-missing-espeak");
        assert!(matches!(
            backend.open(),
            Err(SpeechError::BackendUnavailable(_))
        ));
    }
}
