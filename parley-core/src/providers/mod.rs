//! External capability seams.
//!
//! The dispatcher only knows these four traits; the concrete providers — an
//! OpenAI-compatible transcription endpoint, the Gemini response model, a
//! piper TTS subprocess and an ffplay playback subprocess — live behind
//! them. All calls are blocking: the dispatch context is a dedicated
//! `spawn_blocking` thread and every provider is expected to bound its own
//! work with a timeout.

pub mod gemini;
pub mod piper;
pub mod transcription;

pub use gemini::GeminiModel;
pub use piper::{FfplayPlayback, PiperSynthesizer};
pub use transcription::HttpTranscriber;

use std::path::{Path, PathBuf};

use crate::error::Result;

/// Speech-to-text capability.
pub trait Transcriber: Send + Sync + 'static {
    /// Transcribe mono 16-bit PCM. An empty or whitespace-only result is a
    /// valid outcome (nothing intelligible was said), not an error.
    fn transcribe(&self, samples: &[i16], sample_rate: u32, language: &str) -> Result<String>;
}

/// Hosted conversational response capability.
pub trait ResponseModel: Send + Sync + 'static {
    /// Produce a reply for a fully rendered prompt block.
    fn generate(&self, prompt: &str) -> Result<String>;
}

/// Text-to-speech synthesis capability.
pub trait SpeechSynthesizer: Send + Sync + 'static {
    /// Synthesize `text`, returning the audio file written.
    fn synthesize(&self, text: &str) -> Result<PathBuf>;
}

/// Audio playback capability. `play` blocks until playback finishes.
pub trait Playback: Send + Sync + 'static {
    fn play(&self, audio: &Path) -> Result<()>;
}
