//! # parley-core
//!
//! Reusable voice-conversation engine SDK.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → AudioCapture → SPSC RingBuffer → listen loop (spawn_blocking)
//!                                                    │
//!                                      classify → SpeechSegmenter
//!                                                    │  sealed Utterance
//!                                            handoff channel (FIFO)
//!                                                    │
//!                                    dispatch loop (spawn_blocking, muted turn)
//!                                                    │
//!                          transcribe → Session → respond → Session → speak
//!                                                    │
//!                                  broadcast::Sender<ConversationEvent>
//! ```
//!
//! The audio callback is zero-alloc. All heap work happens on the listen
//! thread; all slow external calls happen on the dispatch thread behind the
//! mute gate, so the assistant never hears itself.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod classify;
pub mod convo;
pub mod diagnostics;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod events;
pub mod providers;
pub mod segment;
pub mod turn;
pub mod wav;

// Convenience re-exports for downstream crates
pub use classify::{Classification, EnergyClassifier, FrameClassifier};
pub use convo::{ConversationMessage, Role, Session};
pub use engine::{EngineConfig, ParleyEngine, ProviderSet};
pub use error::ParleyError;
pub use events::{ConversationEvent, EngineStatus, EngineStatusEvent};
pub use providers::{
    FfplayPlayback, GeminiModel, HttpTranscriber, Playback, PiperSynthesizer, ResponseModel,
    SpeechSynthesizer, Transcriber,
};
pub use segment::{SegmentSink, SegmenterConfig, SpeechSegmenter, Utterance};
pub use turn::{ListeningState, TurnGate, TurnGuard};
