//! HTTP transcription against an OpenAI-compatible `audio/transcriptions`
//! endpoint (Groq, OpenAI, or a local whisper server all speak this shape).

use std::time::Duration;

use anyhow::Context;
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;
use tracing::{debug, info};

use super::Transcriber;
use crate::error::{ParleyError, Result};
use crate::wav::write_temp_wav;

/// Default endpoint: Groq's hosted whisper, fast and OpenAI-compatible.
pub const DEFAULT_API_URL: &str = "https://api.groq.com/openai/v1/audio/transcriptions";
pub const DEFAULT_MODEL: &str = "whisper-large-v3";

#[derive(Debug, Clone)]
pub struct HttpTranscriberConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    /// Upper bound on one transcription round trip.
    pub timeout: Duration,
}

impl HttpTranscriberConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_url: DEFAULT_API_URL.into(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.into(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Uploads utterance audio as a temporary WAV and returns the recognised
/// text.
pub struct HttpTranscriber {
    config: HttpTranscriberConfig,
    client: Client,
}

impl HttpTranscriber {
    pub fn new(config: HttpTranscriberConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build transcription HTTP client")?;
        Ok(Self { config, client })
    }
}

impl Transcriber for HttpTranscriber {
    fn transcribe(&self, samples: &[i16], sample_rate: u32, language: &str) -> Result<String> {
        let wav = write_temp_wav(samples, sample_rate)?;
        let bytes = std::fs::read(wav.path())?;
        debug!(
            samples = samples.len(),
            wav_bytes = bytes.len(),
            "uploading utterance for transcription"
        );

        let file_part = Part::bytes(bytes)
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .map_err(|e| ParleyError::Transcription(format!("invalid mime: {e}")))?;

        let form = Form::new()
            .part("file", file_part)
            .text("model", self.config.model.clone())
            .text("language", language.to_string());

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .map_err(|e| ParleyError::Transcription(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(ParleyError::Transcription(format!(
                "HTTP {status}: {body}"
            )));
        }

        let data: serde_json::Value = response
            .json()
            .map_err(|e| ParleyError::Transcription(format!("malformed response: {e}")))?;

        let text = data
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .trim()
            .to_string();

        info!(chars = text.len(), "transcription complete");
        Ok(text)
    }
}
