//! Event types broadcast to engine subscribers.
//!
//! The engine exposes two `tokio::sync::broadcast` channels: one for the
//! conversation itself (what was heard, what was answered) and one for
//! lifecycle status changes. Clients render these however they like — the
//! console host prints them, a GUI could stream them over IPC.

use serde::{Deserialize, Serialize};

use crate::convo::Role;

/// Emitted when a turn contributes a message to the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    pub role: Role,
    /// The raw message text (no preamble, no role tags).
    pub text: String,
}

/// Emitted when the engine state changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatusEvent {
    pub status: EngineStatus,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

/// Current state of the Parley engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// Engine created but `start()` not yet called.
    Idle,
    /// Capturing audio and waiting for user speech.
    Listening,
    /// A turn is in flight; the capture path is muted.
    Processing,
    /// Capture stopped; engine may be restarted.
    Stopped,
    /// Unrecoverable error — restart required.
    Error,
}
