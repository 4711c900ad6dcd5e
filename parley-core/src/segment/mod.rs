//! Silence-run speech segmentation.
//!
//! `SpeechSegmenter` consumes one `(Frame, Classification)` pair at a time
//! and detects utterance boundaries from silence run length:
//!
//! ```text
//!            voice                       silence × threshold
//! Silence ──────────► Speaking ───────────────────────────► Silence
//!            │                                      │
//!       on_speech_start                    on_speech_end(utterance)
//! ```
//!
//! Only voiced frames are retained; silence gaps shorter than the threshold
//! are consumed but never stored, so one maximal voiced span yields exactly
//! one sealed `Utterance`. The voiced-frame buffer is bounded — a very long
//! span silently evicts its oldest frames rather than erroring.

use std::collections::VecDeque;

use tracing::debug;

use crate::audio::frame::{Frame, FrameFormat};
use crate::classify::{Classification, ClassificationHistory};

/// Classifications retained for diagnostics.
pub const DEFAULT_HISTORY_FRAMES: usize = 50;

/// Voiced-frame buffer bound: 2000 frames ≈ 20 s at 10 ms frames.
pub const DEFAULT_MAX_BUFFERED_FRAMES: usize = 2000;

/// A sealed run of voiced frames, contiguous in capture order.
#[derive(Debug, Clone)]
pub struct Utterance {
    samples: Vec<i16>,
    frame_count: usize,
    sample_rate: u32,
}

impl Utterance {
    fn seal(frames: &mut VecDeque<Frame>, sample_rate: u32) -> Self {
        let frame_count = frames.len();
        let mut samples = Vec::with_capacity(frames.iter().map(Frame::len).sum());
        for frame in frames.drain(..) {
            samples.extend_from_slice(frame.samples());
        }
        Self {
            samples,
            frame_count,
            sample_rate,
        }
    }

    /// Concatenated PCM of every voiced frame, in capture order.
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    #[cfg(test)]
    pub(crate) fn from_samples(samples: Vec<i16>, frame_count: usize, sample_rate: u32) -> Self {
        Self {
            samples,
            frame_count,
            sample_rate,
        }
    }
}

/// Receives segment boundary events.
///
/// The segmenter knows nothing about who is listening; the engine's sink
/// pushes sealed utterances onto the handoff channel, tests collect them in
/// a `Vec`.
pub trait SegmentSink {
    fn on_speech_start(&mut self);
    fn on_speech_end(&mut self, utterance: Utterance);
}

/// Segmentation parameters.
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    /// Seconds of continuous silence that end an utterance. Default: 0.5.
    pub sensitivity_secs: f32,
    /// Bound on buffered voiced frames. Default: 2000.
    pub max_buffered_frames: usize,
    /// Bound on the diagnostic classification history. Default: 50.
    pub history_frames: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            sensitivity_secs: 0.5,
            max_buffered_frames: DEFAULT_MAX_BUFFERED_FRAMES,
            history_frames: DEFAULT_HISTORY_FRAMES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentState {
    Silence,
    Speaking,
}

/// The segmentation state machine.
pub struct SpeechSegmenter {
    state: SegmentState,
    /// Silence frames required to close an utterance.
    silence_frame_threshold: u32,
    /// Consecutive silence frames observed while Speaking.
    silence_run: u32,
    /// Voiced frames of the open utterance, oldest first.
    voiced: VecDeque<Frame>,
    max_buffered_frames: usize,
    sample_rate: u32,
    history: ClassificationHistory,
}

impl SpeechSegmenter {
    pub fn new(config: &SegmenterConfig, format: FrameFormat) -> Self {
        let threshold =
            (config.sensitivity_secs * format.frames_per_second() as f32).ceil() as u32;
        Self {
            state: SegmentState::Silence,
            silence_frame_threshold: threshold.max(1),
            silence_run: 0,
            voiced: VecDeque::with_capacity(config.max_buffered_frames.min(256)),
            max_buffered_frames: config.max_buffered_frames,
            sample_rate: format.sample_rate,
            history: ClassificationHistory::new(config.history_frames),
        }
    }

    /// Silence frames required to close an utterance.
    pub fn silence_frame_threshold(&self) -> u32 {
        self.silence_frame_threshold
    }

    pub fn is_speaking(&self) -> bool {
        self.state == SegmentState::Speaking
    }

    /// Diagnostic view of recent classifications.
    pub fn history(&self) -> &ClassificationHistory {
        &self.history
    }

    /// Advance the state machine by one (frame, classification) pair.
    pub fn process(
        &mut self,
        frame: Frame,
        classification: Classification,
        sink: &mut dyn SegmentSink,
    ) {
        match (self.state, classification) {
            (SegmentState::Silence, Classification::Voice) => {
                self.state = SegmentState::Speaking;
                self.silence_run = 0;
                sink.on_speech_start();
                self.buffer_frame(frame);
            }

            (SegmentState::Speaking, Classification::Voice) => {
                self.silence_run = 0;
                self.buffer_frame(frame);
            }

            (SegmentState::Speaking, Classification::Silence) => {
                // Sub-threshold gaps are consumed, never stored.
                if self.silence_run >= self.silence_frame_threshold {
                    self.close_utterance(sink);
                } else {
                    self.silence_run += 1;
                }
            }

            (SegmentState::Silence, Classification::Silence) => {}
        }

        self.history.record(classification);
    }

    /// Abandon any open utterance without emitting it.
    ///
    /// Used when the pipeline mutes mid-span: frames arriving while muted are
    /// discarded, so the pre-mute accumulation can no longer form a
    /// contiguous utterance.
    pub fn reset(&mut self) {
        if !self.voiced.is_empty() {
            debug!(
                discarded_frames = self.voiced.len(),
                "abandoning open utterance"
            );
        }
        self.state = SegmentState::Silence;
        self.silence_run = 0;
        self.voiced.clear();
    }

    fn buffer_frame(&mut self, frame: Frame) {
        if self.voiced.len() == self.max_buffered_frames {
            // Bounded memory: oldest frame goes, utterance continues.
            self.voiced.pop_front();
        }
        self.voiced.push_back(frame);
    }

    fn close_utterance(&mut self, sink: &mut dyn SegmentSink) {
        if !self.voiced.is_empty() {
            let utterance = Utterance::seal(&mut self.voiced, self.sample_rate);
            debug!(
                frames = utterance.frame_count(),
                samples = utterance.sample_count(),
                "utterance sealed"
            );
            sink.on_speech_end(utterance);
        }
        self.voiced.clear();
        self.silence_run = 0;
        self.state = SegmentState::Silence;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Collects events for assertions.
    #[derive(Default)]
    struct Recorder {
        starts: usize,
        sealed: Vec<Utterance>,
    }

    impl SegmentSink for Recorder {
        fn on_speech_start(&mut self) {
            self.starts += 1;
        }

        fn on_speech_end(&mut self, utterance: Utterance) {
            self.sealed.push(utterance);
        }
    }

    fn format() -> FrameFormat {
        FrameFormat::default()
    }

    fn segmenter(sensitivity_secs: f32, max_frames: usize) -> SpeechSegmenter {
        SpeechSegmenter::new(
            &SegmenterConfig {
                sensitivity_secs,
                max_buffered_frames: max_frames,
                history_frames: DEFAULT_HISTORY_FRAMES,
            },
            format(),
        )
    }

    fn voice_frame(value: i16) -> Frame {
        Frame::new(vec![value; 160], 16_000)
    }

    fn silence_frame() -> Frame {
        Frame::new(vec![0i16; 160], 16_000)
    }

    fn feed(seg: &mut SpeechSegmenter, sink: &mut Recorder, voiced: usize, silent: usize) {
        for _ in 0..voiced {
            seg.process(voice_frame(1000), Classification::Voice, sink);
        }
        for _ in 0..silent {
            seg.process(silence_frame(), Classification::Silence, sink);
        }
    }

    #[test]
    fn default_threshold_is_50_frames() {
        let seg = segmenter(0.5, 2000);
        assert_eq!(seg.silence_frame_threshold(), 50);
    }

    #[test]
    fn all_silence_never_fires_events() {
        let mut seg = segmenter(0.5, 2000);
        let mut sink = Recorder::default();
        feed(&mut seg, &mut sink, 0, 500);
        assert_eq!(sink.starts, 0);
        assert!(sink.sealed.is_empty());
        assert!(!seg.is_speaking());
    }

    #[test]
    fn single_span_seals_once_after_threshold_silence() {
        let mut seg = segmenter(0.5, 2000);
        let mut sink = Recorder::default();
        // 80 voice frames then 60 silence frames → one utterance of
        // 80 × 160 = 12800 samples.
        feed(&mut seg, &mut sink, 80, 60);
        assert_eq!(sink.starts, 1);
        assert_eq!(sink.sealed.len(), 1);
        assert_eq!(sink.sealed[0].frame_count(), 80);
        assert_eq!(sink.sealed[0].sample_count(), 12_800);
        assert!(!seg.is_speaking());
    }

    #[test]
    fn sub_threshold_gap_merges_into_one_utterance() {
        let mut seg = segmenter(0.5, 2000);
        let mut sink = Recorder::default();
        // 40 voice, 20 silence (< 50), 40 voice, 60 silence → one utterance
        // of 80 voiced frames; the gap is consumed, not stored.
        feed(&mut seg, &mut sink, 40, 20);
        feed(&mut seg, &mut sink, 40, 60);
        assert_eq!(sink.starts, 1);
        assert_eq!(sink.sealed.len(), 1);
        assert_eq!(sink.sealed[0].frame_count(), 80);
        assert_eq!(sink.sealed[0].sample_count(), 80 * 160);
    }

    #[test]
    fn seal_count_equals_maximal_voiced_spans() {
        let mut seg = segmenter(0.5, 2000);
        let mut sink = Recorder::default();
        for _ in 0..3 {
            feed(&mut seg, &mut sink, 30, 70);
        }
        assert_eq!(sink.starts, 3);
        assert_eq!(sink.sealed.len(), 3);
    }

    #[test]
    fn utterance_contains_only_voiced_samples() {
        let mut seg = segmenter(0.5, 2000);
        let mut sink = Recorder::default();

        seg.process(voice_frame(7), Classification::Voice, &mut sink);
        seg.process(voice_frame(9), Classification::Voice, &mut sink);
        // one silent gap frame, below threshold
        seg.process(silence_frame(), Classification::Silence, &mut sink);
        seg.process(voice_frame(11), Classification::Voice, &mut sink);
        feed(&mut seg, &mut sink, 0, 60);

        let utterance = &sink.sealed[0];
        assert_eq!(utterance.frame_count(), 3);
        let expected: Vec<i16> = [7i16, 9, 11]
            .iter()
            .flat_map(|v| std::iter::repeat(*v).take(160))
            .collect();
        assert_eq!(utterance.samples(), expected.as_slice());
    }

    #[test]
    fn overflow_evicts_oldest_frames() {
        let mut seg = segmenter(0.5, 2000);
        let mut sink = Recorder::default();
        // 2500 voiced frames with distinct payloads, then closing silence.
        for i in 0..2500i32 {
            let value = (i % 3000) as i16;
            seg.process(
                Frame::new(vec![value; 160], 16_000),
                Classification::Voice,
                &mut sink,
            );
        }
        feed(&mut seg, &mut sink, 0, 60);

        let utterance = &sink.sealed[0];
        assert_eq!(utterance.frame_count(), 2000);
        assert_eq!(utterance.sample_count(), 2000 * 160);
        // Oldest 500 evicted: the first retained frame carries value 500.
        assert_eq!(utterance.samples()[0], 500);
        assert_eq!(utterance.samples()[utterance.sample_count() - 1], 2499);
    }

    #[test]
    fn history_records_every_pair_regardless_of_branch() {
        let mut seg = segmenter(0.5, 2000);
        let mut sink = Recorder::default();
        feed(&mut seg, &mut sink, 3, 4);
        assert_eq!(seg.history().len(), 7);
        assert_eq!(seg.history().voiced_count(), 3);
    }

    #[test]
    fn reset_abandons_open_utterance_without_event() {
        let mut seg = segmenter(0.5, 2000);
        let mut sink = Recorder::default();
        feed(&mut seg, &mut sink, 10, 0);
        assert!(seg.is_speaking());

        seg.reset();
        assert!(!seg.is_speaking());
        // Closing silence afterwards must not resurrect the abandoned span.
        feed(&mut seg, &mut sink, 0, 60);
        assert_eq!(sink.starts, 1);
        assert!(sink.sealed.is_empty());
    }

    #[test]
    fn silence_exactly_at_threshold_keeps_speaking_one_more_frame() {
        // The counter increments through threshold-1, so sealing happens on
        // the frame after the run reaches the threshold.
        let mut seg = segmenter(0.1, 2000); // threshold = 10
        let mut sink = Recorder::default();
        feed(&mut seg, &mut sink, 5, 10);
        assert!(seg.is_speaking(), "run == threshold has not yet sealed");
        seg.process(silence_frame(), Classification::Silence, &mut sink);
        assert!(!seg.is_speaking());
        assert_eq!(sink.sealed.len(), 1);
    }
}
