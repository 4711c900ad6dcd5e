//! Gemini `generateContent` response model.
//!
//! The whole session renders into a single role-tagged text block, so the
//! request is a plain one-part prompt rather than Gemini's structured chat
//! history — the model continues the `<|assistant|>` cue at the end of the
//! block.

use std::time::Duration;

use anyhow::Context;
use reqwest::blocking::Client;
use serde_json::json;
use tracing::{debug, info};

use super::ResponseModel;
use crate::error::{ParleyError, Result};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    /// Upper bound on one generation round trip.
    pub timeout: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.into(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.into(),
            timeout: Duration::from_secs(60),
        }
    }
}

pub struct GeminiModel {
    config: GeminiConfig,
    client: Client,
}

impl GeminiModel {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build response-model HTTP client")?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.api_base, self.config.model
        )
    }
}

/// Pull the reply text out of a `generateContent` response body.
fn extract_reply(data: &serde_json::Value) -> Option<String> {
    let parts = data
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();

    if text.trim().is_empty() {
        None
    } else {
        Some(text.trim().to_string())
    }
}

impl ResponseModel for GeminiModel {
    fn generate(&self, prompt: &str) -> Result<String> {
        debug!(prompt_chars = prompt.len(), "requesting reply");

        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.config.api_key.as_str())])
            .json(&body)
            .send()
            .map_err(|e| ParleyError::ResponseModel(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(ParleyError::ResponseModel(format!(
                "HTTP {status}: {body}"
            )));
        }

        let data: serde_json::Value = response
            .json()
            .map_err(|e| ParleyError::ResponseModel(format!("malformed response: {e}")))?;

        let reply = extract_reply(&data).ok_or_else(|| {
            ParleyError::ResponseModel("response contained no candidate text".into())
        })?;

        info!(chars = reply.len(), "reply generated");
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_single_part_reply() {
        let data = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "  Hello there. " }] }
            }]
        });
        assert_eq!(extract_reply(&data).as_deref(), Some("Hello there."));
    }

    #[test]
    fn joins_multiple_parts() {
        let data = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "Hello " }, { "text": "again." }] }
            }]
        });
        assert_eq!(extract_reply(&data).as_deref(), Some("Hello again."));
    }

    #[test]
    fn rejects_empty_or_missing_candidates() {
        assert!(extract_reply(&json!({})).is_none());
        assert!(extract_reply(&json!({ "candidates": [] })).is_none());
        let blank = json!({
            "candidates": [{ "content": { "parts": [{ "text": "   " }] } }]
        });
        assert!(extract_reply(&blank).is_none());
    }
}
