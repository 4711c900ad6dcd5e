//! Blocking listen loop.
//!
//! ## Stages (per iteration)
//!
//! ```text
//! 1. Drain ring buffer → raw f32 at the capture rate
//! 2. Resample to the 16 kHz target
//! 3. Cut fixed 10 ms i16 frames
//! 4. Per frame: gate check → classify → SpeechSegmenter
//! 5. Sealed utterances go onto the handoff channel
//! ```
//!
//! The loop runs in `spawn_blocking`; the only blocking it does itself is a
//! short sleep when the ring is empty. Everything slow (transcription, the
//! response model, playback) happens on the dispatch side of the channel.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crossbeam_channel::Sender;
use tracing::{debug, info};

use crate::{
    audio::{
        frame::FrameAssembler,
        resample::RateConverter,
        CaptureFault,
    },
    buffering::{AudioConsumer, Consumer},
    classify::FrameClassifier,
    diagnostics::EngineDiagnostics,
    engine::EngineConfig,
    error::{ParleyError, Result},
    segment::{SegmentSink, SpeechSegmenter, Utterance},
    turn::TurnGate,
};

/// Chunk size drained from the ring buffer per iteration.
/// 20 ms at 48 kHz = 960 samples; a reasonable stride for most capture rates.
const DRAIN_CHUNK: usize = 960;

/// Sleep when the ring is empty (avoids busy-wait burning a core).
const SLEEP_EMPTY_MS: u64 = 5;

/// All context the listen loop needs, passed as one struct so the closure
/// stays tidy.
pub struct ListenContext {
    pub config: EngineConfig,
    pub classifier: Box<dyn FrameClassifier>,
    pub consumer: AudioConsumer,
    pub running: Arc<AtomicBool>,
    pub gate: Arc<TurnGate>,
    pub handoff_tx: Sender<Utterance>,
    pub fault: CaptureFault,
    pub capture_sample_rate: u32,
    pub diagnostics: Arc<EngineDiagnostics>,
}

/// Forwards sealed utterances onto the handoff channel.
struct QueueSink {
    tx: Sender<Utterance>,
    diagnostics: Arc<EngineDiagnostics>,
}

impl SegmentSink for QueueSink {
    fn on_speech_start(&mut self) {
        debug!("speech started");
    }

    fn on_speech_end(&mut self, utterance: Utterance) {
        self.diagnostics
            .utterances_sealed
            .fetch_add(1, Ordering::Relaxed);
        debug!(
            samples = utterance.sample_count(),
            frames = utterance.frame_count(),
            "utterance handed off"
        );
        // Unbounded channel: the push can't block the capture path. A closed
        // channel means the dispatcher is gone and the loop is winding down.
        let _ = self.tx.send(utterance);
    }
}

/// Run the listen loop until `ctx.running` becomes false or the device
/// faults.
///
/// # Errors
/// Returns `ParleyError::AudioStream` when a capture fault is observed; the
/// caller decides whether to restart or shut down.
pub fn run(mut ctx: ListenContext) -> Result<()> {
    info!("listen loop started");

    let format = ctx.config.frame_format();
    let mut resampler =
        RateConverter::new(ctx.capture_sample_rate, format.sample_rate, DRAIN_CHUNK)?;
    let mut assembler = FrameAssembler::new(format);
    let mut segmenter = SpeechSegmenter::new(&ctx.config.segmenter_config(), format);
    info!(
        silence_frame_threshold = segmenter.silence_frame_threshold(),
        max_buffered_frames = ctx.config.max_buffered_frames,
        "segmenter configured"
    );

    let mut sink = QueueSink {
        tx: ctx.handoff_tx.clone(),
        diagnostics: Arc::clone(&ctx.diagnostics),
    };

    let mut raw = vec![0f32; DRAIN_CHUNK];

    loop {
        if !ctx.running.load(Ordering::Relaxed) {
            break;
        }

        // A device fault is fatal to this context.
        if let Some(message) = ctx.fault.take() {
            return Err(ParleyError::AudioStream(message));
        }

        let n = ctx.consumer.pop_slice(&mut raw);
        if n == 0 {
            std::thread::sleep(std::time::Duration::from_millis(SLEEP_EMPTY_MS));
            continue;
        }

        let resampled = resampler.process(&raw[..n]);
        if resampled.is_empty() {
            // Partial chunk — waiting for more data to fill rubato's block
            continue;
        }

        for frame in assembler.push(&resampled) {
            ctx.diagnostics.frames_in.fetch_add(1, Ordering::Relaxed);

            if !ctx.gate.is_listening() {
                // Muted: frames are discarded, not buffered for later. A
                // half-open utterance can no longer be contiguous, so it is
                // abandoned.
                ctx.diagnostics
                    .frames_discarded_muted
                    .fetch_add(1, Ordering::Relaxed);
                if segmenter.is_speaking() {
                    segmenter.reset();
                    ctx.classifier.reset();
                }
                continue;
            }

            let classification = ctx.classifier.classify(&frame);
            if classification.is_voice() {
                ctx.diagnostics
                    .frames_voiced
                    .fetch_add(1, Ordering::Relaxed);
            }
            segmenter.process(frame, classification, &mut sink);
        }
    }

    let snap = ctx.diagnostics.snapshot();
    info!(
        frames_in = snap.frames_in,
        frames_voiced = snap.frames_voiced,
        frames_discarded_muted = snap.frames_discarded_muted,
        utterances_sealed = snap.utterances_sealed,
        "listen loop stopped"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::thread;
    use std::time::Duration;

    use crate::buffering::{create_audio_ring, Producer};
    use crate::classify::EnergyClassifier;

    fn base_config() -> EngineConfig {
        EngineConfig::default()
    }

    fn context(
        config: EngineConfig,
        consumer: AudioConsumer,
        gate: Arc<TurnGate>,
        running: Arc<AtomicBool>,
        handoff_tx: Sender<Utterance>,
        fault: CaptureFault,
    ) -> ListenContext {
        ListenContext {
            classifier: Box::new(EnergyClassifier::new(config.classifier_threshold, 0)),
            config,
            consumer,
            running,
            gate,
            handoff_tx,
            fault,
            capture_sample_rate: 16_000,
            diagnostics: Arc::new(EngineDiagnostics::default()),
        }
    }

    #[test]
    fn speech_then_silence_hands_off_one_utterance() {
        let (mut producer, consumer) = create_audio_ring();
        // 80 frames of loud speech, then enough silence to cross the
        // 50-frame threshold.
        producer.push_slice(&vec![0.5f32; 80 * 160]);
        producer.push_slice(&vec![0.0f32; 60 * 160]);

        let gate = Arc::new(TurnGate::new());
        gate.resume();
        let running = Arc::new(AtomicBool::new(true));
        let (tx, rx) = crossbeam_channel::unbounded();

        let ctx = context(
            base_config(),
            consumer,
            Arc::clone(&gate),
            Arc::clone(&running),
            tx,
            CaptureFault::new(),
        );
        let handle = thread::spawn(move || run(ctx));

        let utterance = rx
            .recv_timeout(Duration::from_secs(2))
            .expect("expected a sealed utterance");
        running.store(false, Ordering::SeqCst);
        handle.join().expect("listen thread panicked").unwrap();

        assert_eq!(utterance.frame_count(), 80);
        assert_eq!(utterance.sample_count(), 80 * 160);
    }

    #[test]
    fn muted_gate_discards_frames_without_handoff() {
        let (mut producer, consumer) = create_audio_ring();
        producer.push_slice(&vec![0.5f32; 80 * 160]);
        producer.push_slice(&vec![0.0f32; 60 * 160]);

        let gate = Arc::new(TurnGate::new()); // stays muted
        let running = Arc::new(AtomicBool::new(true));
        let (tx, rx) = crossbeam_channel::unbounded();

        let ctx = context(
            base_config(),
            consumer,
            Arc::clone(&gate),
            Arc::clone(&running),
            tx,
            CaptureFault::new(),
        );
        let diagnostics = Arc::clone(&ctx.diagnostics);
        let handle = thread::spawn(move || run(ctx));

        assert!(
            rx.recv_timeout(Duration::from_millis(300)).is_err(),
            "muted pipeline must not hand off utterances"
        );
        running.store(false, Ordering::SeqCst);
        handle.join().expect("listen thread panicked").unwrap();

        let snap = diagnostics.snapshot();
        assert_eq!(snap.frames_discarded_muted, snap.frames_in);
        assert_eq!(snap.utterances_sealed, 0);
    }

    #[test]
    fn capture_fault_terminates_the_loop_with_error() {
        let (_producer, consumer) = create_audio_ring();
        let gate = Arc::new(TurnGate::new());
        gate.resume();
        let running = Arc::new(AtomicBool::new(true));
        let (tx, _rx) = crossbeam_channel::unbounded();
        let fault = CaptureFault::new();

        let ctx = context(
            base_config(),
            consumer,
            gate,
            running,
            tx,
            fault.clone(),
        );
        let handle = thread::spawn(move || run(ctx));

        fault.record("device unplugged".into());
        let result = handle.join().expect("listen thread panicked");
        let err = result.expect_err("fault must surface as an error");
        assert!(err.to_string().contains("device unplugged"));
    }

    #[test]
    fn all_silence_input_never_hands_off() {
        let (mut producer, consumer) = create_audio_ring();
        producer.push_slice(&vec![0.0f32; 500 * 160]);

        let gate = Arc::new(TurnGate::new());
        gate.resume();
        let running = Arc::new(AtomicBool::new(true));
        let (tx, rx) = crossbeam_channel::unbounded();

        let ctx = context(
            base_config(),
            consumer,
            gate,
            Arc::clone(&running),
            tx,
            CaptureFault::new(),
        );
        let handle = thread::spawn(move || run(ctx));

        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
        running.store(false, Ordering::SeqCst);
        handle.join().expect("listen thread panicked").unwrap();
    }
}
