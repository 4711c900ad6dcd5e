//! Turn-taking mute/unmute control.
//!
//! While the assistant is transcribing, thinking, or speaking, the capture
//! path must not treat incoming audio as user speech — otherwise the
//! assistant's own playback re-triggers the segmenter. `TurnGate` is the
//! single `ListeningState` cell: written only by the turn lifecycle
//! (dispatcher + engine startup), read lock-free by the listen loop.
//!
//! Muting is always scoped: `TurnGuard` mutes on acquisition and restores
//! Listening when dropped, so every exit path of a turn — success, soft
//! skip, or error — unmutes. A permanently muted pipeline is the one failure
//! mode this module exists to rule out.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

/// Whether the capture path is routing classifications into the segmenter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListeningState {
    /// Frames flow into the segmenter.
    Listening,
    /// A turn is in flight; frames are discarded at the gate.
    Muted,
}

/// Shared listening flag. Single logical writer, many readers.
#[derive(Debug)]
pub struct TurnGate {
    listening: AtomicBool,
    /// Set once the first Listening entry has been observed.
    entered_once: AtomicBool,
}

impl TurnGate {
    /// Gates start muted; the engine resumes them once capture is live.
    pub fn new() -> Self {
        Self {
            listening: AtomicBool::new(false),
            entered_once: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> ListeningState {
        if self.listening.load(Ordering::Acquire) {
            ListeningState::Listening
        } else {
            ListeningState::Muted
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Acquire)
    }

    /// Enter Muted. Idempotent.
    pub fn mute(&self) {
        self.listening.store(false, Ordering::Release);
    }

    /// Enter Listening. Returns `true` on the very first entry since
    /// construction — callers use this to play the ready cue exactly once.
    pub fn resume(&self) -> bool {
        self.listening.store(true, Ordering::Release);
        !self.entered_once.swap(true, Ordering::AcqRel)
    }
}

impl Default for TurnGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped Muted acquisition: mutes on construction, resumes on drop.
///
/// Hold this for the duration of a turn. Dropping it — normally, after an
/// early return, or during unwind — restores Listening unconditionally.
pub struct TurnGuard<'a> {
    gate: &'a TurnGate,
}

impl<'a> TurnGuard<'a> {
    pub fn acquire(gate: &'a TurnGate) -> Self {
        gate.mute();
        debug!("pipeline muted for turn");
        Self { gate }
    }
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.gate.resume();
        debug!("pipeline resumed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_starts_muted() {
        let gate = TurnGate::new();
        assert_eq!(gate.state(), ListeningState::Muted);
    }

    #[test]
    fn first_resume_reports_first_entry_only_once() {
        let gate = TurnGate::new();
        assert!(gate.resume());
        gate.mute();
        assert!(!gate.resume());
        assert!(!gate.resume());
    }

    #[test]
    fn guard_mutes_for_its_scope_and_resumes_on_drop() {
        let gate = TurnGate::new();
        gate.resume();

        {
            let _turn = TurnGuard::acquire(&gate);
            assert_eq!(gate.state(), ListeningState::Muted);
        }
        assert_eq!(gate.state(), ListeningState::Listening);
    }

    #[test]
    fn guard_resumes_on_early_error_return() {
        fn failing_turn(gate: &TurnGate) -> Result<(), &'static str> {
            let _turn = TurnGuard::acquire(gate);
            Err("model call failed")
        }

        let gate = TurnGate::new();
        gate.resume();
        assert!(failing_turn(&gate).is_err());
        assert!(gate.is_listening());
    }

    #[test]
    fn guard_resumes_during_unwind() {
        let gate = TurnGate::new();
        gate.resume();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _turn = TurnGuard::acquire(&gate);
            panic!("turn blew up");
        }));
        assert!(result.is_err());
        assert!(gate.is_listening());
    }
}
