//! Shared observability counters for the listen and dispatch contexts.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Lock-free counters updated from both pipeline threads.
#[derive(Default)]
pub struct EngineDiagnostics {
    /// Frames cut from the capture stream.
    pub frames_in: AtomicUsize,
    /// Frames discarded because the pipeline was muted.
    pub frames_discarded_muted: AtomicUsize,
    /// Frames classified as voice.
    pub frames_voiced: AtomicUsize,
    /// Utterances sealed by the segmenter.
    pub utterances_sealed: AtomicUsize,
    /// Utterances dropped for being under the minimum turn length.
    pub utterances_skipped_short: AtomicUsize,
    /// Stale utterances drained from the queue at mute time.
    pub stale_drained: AtomicUsize,
    /// Turns that produced a transcription with no recognisable text.
    pub empty_transcriptions: AtomicUsize,
    /// Turns that ran to completion (reply appended, spoken or not).
    pub turns_completed: AtomicUsize,
    /// Turns aborted by a provider failure.
    pub turns_failed: AtomicUsize,
}

impl EngineDiagnostics {
    pub fn reset(&self) {
        self.frames_in.store(0, Ordering::Relaxed);
        self.frames_discarded_muted.store(0, Ordering::Relaxed);
        self.frames_voiced.store(0, Ordering::Relaxed);
        self.utterances_sealed.store(0, Ordering::Relaxed);
        self.utterances_skipped_short.store(0, Ordering::Relaxed);
        self.stale_drained.store(0, Ordering::Relaxed);
        self.empty_transcriptions.store(0, Ordering::Relaxed);
        self.turns_completed.store(0, Ordering::Relaxed);
        self.turns_failed.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            frames_in: self.frames_in.load(Ordering::Relaxed),
            frames_discarded_muted: self.frames_discarded_muted.load(Ordering::Relaxed),
            frames_voiced: self.frames_voiced.load(Ordering::Relaxed),
            utterances_sealed: self.utterances_sealed.load(Ordering::Relaxed),
            utterances_skipped_short: self.utterances_skipped_short.load(Ordering::Relaxed),
            stale_drained: self.stale_drained.load(Ordering::Relaxed),
            empty_transcriptions: self.empty_transcriptions.load(Ordering::Relaxed),
            turns_completed: self.turns_completed.load(Ordering::Relaxed),
            turns_failed: self.turns_failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DiagnosticsSnapshot {
    pub frames_in: usize,
    pub frames_discarded_muted: usize,
    pub frames_voiced: usize,
    pub utterances_sealed: usize,
    pub utterances_skipped_short: usize,
    pub stale_drained: usize,
    pub empty_transcriptions: usize,
    pub turns_completed: usize,
    pub turns_failed: usize,
}
