//! Energy-based classifier using an RMS threshold + optional hangover.
//!
//! ## Algorithm
//!
//! 1. Compute RMS of the frame's PCM samples, normalised to [0, 1].
//! 2. RMS ≥ `threshold` → `Voice`, hangover counter reloaded.
//! 3. RMS < `threshold` while hangover counter > 0 → `Voice`, counter
//!    decremented (prevents clipping syllable endings).
//! 4. Otherwise → `Silence`.
//!
//! With `hangover_frames = 0` (the default) the classifier is a pure
//! per-frame function; the segmenter's own silence-run tolerance handles
//! word-gap smoothing.

use super::{Classification, FrameClassifier};
use crate::audio::frame::Frame;

/// A simple energy-based voice classifier.
#[derive(Debug, Clone)]
pub struct EnergyClassifier {
    /// Normalised RMS threshold. Frames above this are considered voice.
    /// Typical range: 0.01–0.05 for a quiet microphone.
    threshold: f32,
    /// Consecutive below-threshold frames still reported as `Voice` after
    /// real speech ends.
    hangover_frames: u32,
    /// Current hangover countdown.
    hangover_counter: u32,
}

impl EnergyClassifier {
    /// # Parameters
    /// - `threshold`: RMS level above which a frame counts as voice.
    ///   Default: `0.02`.
    /// - `hangover_frames`: silent frames to extend voice detection.
    ///   Default: `0`.
    pub fn new(threshold: f32, hangover_frames: u32) -> Self {
        Self {
            threshold,
            hangover_frames,
            hangover_counter: 0,
        }
    }

    /// Root-mean-square of 16-bit PCM, normalised to [0, 1].
    fn rms(samples: &[i16]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = samples
            .iter()
            .map(|s| {
                let normalised = *s as f64 / i16::MAX as f64;
                normalised * normalised
            })
            .sum();
        (sum_sq / samples.len() as f64).sqrt() as f32
    }
}

impl Default for EnergyClassifier {
    fn default() -> Self {
        Self::new(0.02, 0)
    }
}

impl FrameClassifier for EnergyClassifier {
    fn classify(&mut self, frame: &Frame) -> Classification {
        let rms = Self::rms(frame.samples());

        if rms >= self.threshold {
            self.hangover_counter = self.hangover_frames;
            Classification::Voice
        } else if self.hangover_counter > 0 {
            self.hangover_counter -= 1;
            Classification::Voice
        } else {
            Classification::Silence
        }
    }

    fn reset(&mut self) {
        self.hangover_counter = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn silent_frame(len: usize) -> Frame {
        Frame::new(vec![0i16; len], 16_000)
    }

    fn loud_frame(amplitude: i16, len: usize) -> Frame {
        Frame::new(vec![amplitude; len], 16_000)
    }

    #[test]
    fn silence_below_threshold() {
        let mut classifier = EnergyClassifier::new(0.02, 0);
        assert_eq!(
            classifier.classify(&silent_frame(160)),
            Classification::Silence
        );
    }

    #[test]
    fn voice_above_threshold() {
        let mut classifier = EnergyClassifier::new(0.02, 0);
        assert_eq!(
            classifier.classify(&loud_frame(16_000, 160)),
            Classification::Voice
        );
    }

    #[test]
    fn hangover_extends_voice() {
        let mut classifier = EnergyClassifier::new(0.02, 3);

        assert_eq!(
            classifier.classify(&loud_frame(16_000, 160)),
            Classification::Voice
        );

        // Next 3 silent frames still report Voice (hangover)
        for _ in 0..3 {
            assert_eq!(
                classifier.classify(&silent_frame(160)),
                Classification::Voice
            );
        }

        // 4th silent frame: hangover exhausted → Silence
        assert_eq!(
            classifier.classify(&silent_frame(160)),
            Classification::Silence
        );
    }

    #[test]
    fn reset_clears_hangover() {
        let mut classifier = EnergyClassifier::new(0.02, 5);
        classifier.classify(&loud_frame(16_000, 160));
        classifier.reset();
        assert_eq!(
            classifier.classify(&silent_frame(160)),
            Classification::Silence
        );
    }

    #[test]
    fn empty_frame_is_silence() {
        let mut classifier = EnergyClassifier::default();
        assert_eq!(
            classifier.classify(&Frame::new(vec![], 16_000)),
            Classification::Silence
        );
    }

    #[test]
    fn rms_of_half_scale_square_wave() {
        // A square wave at ±half scale has RMS = 0.5
        let half = i16::MAX / 2;
        let samples: Vec<i16> = (0..256)
            .map(|i| if i % 2 == 0 { half } else { -half })
            .collect();
        let rms = EnergyClassifier::rms(&samples);
        assert_relative_eq!(rms, 0.5, epsilon = 1e-3);
    }
}
