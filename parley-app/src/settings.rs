//! Persistent application settings (JSON file, environment overrides).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    /// Microphone name to prefer; `None` uses the system default.
    pub preferred_input_device: Option<String>,
    /// Seconds of silence that end an utterance.
    pub sensitivity_secs: f32,
    /// Samples below which an utterance never starts a turn.
    pub min_turn_samples: usize,
    /// RMS threshold for the energy classifier.
    pub classifier_threshold: f32,
    /// Language hint for transcription.
    pub language: String,
    /// OpenAI-compatible transcription endpoint.
    pub transcription_api_url: String,
    pub transcription_model: String,
    /// API key for the transcription endpoint. The
    /// `PARLEY_TRANSCRIPTION_API_KEY` / `GROQ_API_KEY` environment variables
    /// take precedence.
    pub transcription_api_key: Option<String>,
    /// Response model id (Gemini).
    pub response_model: String,
    /// API key for the response model. `PARLEY_API_KEY` / `GEMINI_API_KEY`
    /// take precedence.
    pub response_api_key: Option<String>,
    /// Upper bound, in seconds, on each external call in a turn.
    pub turn_timeout_secs: u64,
    pub piper_binary: PathBuf,
    pub piper_voice: PathBuf,
    /// Directory for synthesized replies.
    pub audio_dir: PathBuf,
    /// Short WAV played once when listening begins.
    pub ready_cue: Option<PathBuf>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            preferred_input_device: None,
            sensitivity_secs: 0.5,
            min_turn_samples: 12_000,
            classifier_threshold: 0.02,
            language: "en".into(),
            transcription_api_url: parley_core::providers::transcription::DEFAULT_API_URL.into(),
            transcription_model: parley_core::providers::transcription::DEFAULT_MODEL.into(),
            transcription_api_key: None,
            response_model: parley_core::providers::gemini::DEFAULT_MODEL.into(),
            response_api_key: None,
            turn_timeout_secs: 60,
            piper_binary: PathBuf::from("piper"),
            piper_voice: PathBuf::from("piper/en_GB-alan-medium.onnx"),
            audio_dir: PathBuf::from("audio"),
            ready_cue: Some(PathBuf::from("beep.wav")),
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.sensitivity_secs = self.sensitivity_secs.clamp(0.1, 5.0);
        self.min_turn_samples = self.min_turn_samples.clamp(0, 160_000);
        self.classifier_threshold = self.classifier_threshold.clamp(0.001, 0.5);
        self.turn_timeout_secs = self.turn_timeout_secs.clamp(5, 600);
        self.language = self.language.trim().to_ascii_lowercase();
        if self.language.is_empty() {
            self.language = "en".into();
        }
        self.preferred_input_device = self
            .preferred_input_device
            .as_ref()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());
        // A missing cue file is treated as "no cue" rather than an error.
        if let Some(cue) = &self.ready_cue {
            if !cue.exists() {
                self.ready_cue = None;
            }
        }
    }

    pub fn turn_timeout(&self) -> Duration {
        Duration::from_secs(self.turn_timeout_secs)
    }

    /// Resolve the response-model API key: environment first, settings file
    /// second.
    pub fn resolve_response_api_key(&self) -> Option<String> {
        env_key("PARLEY_API_KEY")
            .or_else(|| env_key("GEMINI_API_KEY"))
            .or_else(|| self.response_api_key.clone())
    }

    /// Resolve the transcription API key: environment first, settings file
    /// second, falling back to the response key for single-vendor setups.
    pub fn resolve_transcription_api_key(&self) -> Option<String> {
        env_key("PARLEY_TRANSCRIPTION_API_KEY")
            .or_else(|| env_key("GROQ_API_KEY"))
            .or_else(|| self.transcription_api_key.clone())
    }
}

fn env_key(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Default settings location: `$PARLEY_CONFIG`, falling back to
/// `parley.json` in the working directory.
pub fn default_settings_path() -> PathBuf {
    std::env::var("PARLEY_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("parley.json"))
}

/// Load settings from `path`, falling back to defaults when the file is
/// missing or unreadable.
pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => match serde_json::from_str::<AppSettings>(&raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "settings file invalid — using defaults");
                AppSettings::default()
            }
        },
        Err(_) => AppSettings::default(),
    };
    settings.normalize();
    settings
}

/// Persist settings as pretty JSON.
pub fn save_settings(path: &Path, settings: &AppSettings) -> anyhow::Result<()> {
    let raw = serde_json::to_string_pretty(settings)?;
    fs::write(path, raw)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_survive_a_round_trip() {
        let settings = AppSettings::default();
        let raw = serde_json::to_string(&settings).unwrap();
        let parsed: AppSettings = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.min_turn_samples, settings.min_turn_samples);
        assert_eq!(parsed.language, settings.language);
    }

    #[test]
    fn unknown_file_falls_back_to_defaults() {
        let settings = load_settings(Path::new("definitely-not-here.json"));
        assert_eq!(settings.min_turn_samples, 12_000);
    }

    #[test]
    fn normalize_clamps_out_of_range_values() {
        let mut settings = AppSettings {
            sensitivity_secs: 99.0,
            turn_timeout_secs: 1,
            language: "  EN ".into(),
            ..AppSettings::default()
        };
        settings.normalize();
        assert_eq!(settings.sensitivity_secs, 5.0);
        assert_eq!(settings.turn_timeout_secs, 5);
        assert_eq!(settings.language, "en");
    }
}
