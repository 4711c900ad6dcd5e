//! Fixed-duration PCM frames cut from the resampled capture stream.
//!
//! The classifier and segmenter both operate on `Frame`s: one frame covers a
//! single sampling interval (default 10 ms at 16 kHz mono ⇒ 160 samples of
//! 16-bit signed PCM). Frames are immutable once assembled.

/// Shape of the frames produced by the capture path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFormat {
    /// Sample rate in Hz (e.g. 16000).
    pub sample_rate: u32,
    /// Channel count. The capture path downmixes, so this is always 1 today.
    pub channels: u16,
    /// Frame duration in milliseconds.
    pub frame_ms: u32,
}

impl FrameFormat {
    pub fn new(sample_rate: u32, channels: u16, frame_ms: u32) -> Self {
        Self {
            sample_rate,
            channels,
            frame_ms,
        }
    }

    /// Samples contained in one frame (per channel).
    pub fn samples_per_frame(&self) -> usize {
        (self.sample_rate as usize * self.frame_ms as usize) / 1000
    }

    /// Frames produced per second of audio.
    pub fn frames_per_second(&self) -> u32 {
        1000 / self.frame_ms
    }
}

impl Default for FrameFormat {
    fn default() -> Self {
        Self::new(16_000, 1, 10)
    }
}

/// One captured sampling interval of mono 16-bit PCM.
#[derive(Debug, Clone)]
pub struct Frame {
    samples: Vec<i16>,
    sample_rate: u32,
}

impl Frame {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// PCM samples in capture order.
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Consume the frame, yielding its samples.
    pub fn into_samples(self) -> Vec<i16> {
        self.samples
    }
}

/// Cuts an incoming f32 sample stream into fixed-size i16 frames.
///
/// Samples accumulate internally until a full frame is available; any
/// remainder is kept for the next call. Quantisation clamps to [-1.0, 1.0]
/// before scaling, matching WAV 16-bit conventions.
pub struct FrameAssembler {
    format: FrameFormat,
    pending: Vec<f32>,
}

impl FrameAssembler {
    pub fn new(format: FrameFormat) -> Self {
        Self {
            format,
            pending: Vec::with_capacity(format.samples_per_frame() * 2),
        }
    }

    pub fn format(&self) -> FrameFormat {
        self.format
    }

    /// Feed resampled mono samples; returns every complete frame now available.
    pub fn push(&mut self, samples: &[f32]) -> Vec<Frame> {
        self.pending.extend_from_slice(samples);

        let per_frame = self.format.samples_per_frame();
        let mut frames = Vec::new();

        while self.pending.len() >= per_frame {
            let pcm: Vec<i16> = self.pending[..per_frame]
                .iter()
                .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                .collect();
            frames.push(Frame::new(pcm, self.format.sample_rate));
            self.pending.drain(..per_frame);
        }

        frames
    }

    /// Discard any partially accumulated frame.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_format_is_10ms_at_16khz() {
        let fmt = FrameFormat::default();
        assert_eq!(fmt.samples_per_frame(), 160);
        assert_eq!(fmt.frames_per_second(), 100);
    }

    #[test]
    fn assembler_emits_nothing_for_partial_frame() {
        let mut asm = FrameAssembler::new(FrameFormat::default());
        assert!(asm.push(&vec![0.0; 100]).is_empty());
    }

    #[test]
    fn assembler_carries_remainder_across_calls() {
        let mut asm = FrameAssembler::new(FrameFormat::default());
        assert!(asm.push(&vec![0.0; 100]).is_empty());
        let frames = asm.push(&vec![0.0; 100]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), 160);
        // 40 samples left pending
        assert_eq!(asm.push(&vec![0.0; 120]).len(), 1);
    }

    #[test]
    fn assembler_emits_multiple_frames_from_one_push() {
        let mut asm = FrameAssembler::new(FrameFormat::default());
        let frames = asm.push(&vec![0.5; 480]);
        assert_eq!(frames.len(), 3);
    }

    #[test]
    fn quantisation_clamps_out_of_range_input() {
        let mut asm = FrameAssembler::new(FrameFormat::default());
        let mut samples = vec![2.0f32; 160];
        samples[0] = -2.0;
        let frames = asm.push(&samples);
        assert_eq!(frames[0].samples()[0], -i16::MAX);
        assert_eq!(frames[0].samples()[1], i16::MAX);
    }
}
