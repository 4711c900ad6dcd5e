//! `ParleyEngine` — top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! ParleyEngine::new()
//!     └─► start()        → audio open, listen + dispatch loops spawned,
//!         │                ready cue played, status = Listening
//!         └─► stop()     → running=false, stream dropped, status = Stopped
//! ```
//!
//! `start()`/`stop()` are guarded: calling them in the wrong state returns an
//! error rather than panicking.
//!
//! ## Threading
//!
//! `cpal::Stream` is `!Send` on Windows/macOS (COM / CoreAudio thread
//! affinity). `AudioCapture` is therefore created *inside* the
//! `spawn_blocking` closure so it never crosses a thread boundary. A sync
//! oneshot channel propagates any open-device error back to the `start()`
//! caller. The dispatch loop gets its own `spawn_blocking` thread so that
//! external calls can never stall the capture path.

pub mod pipeline;

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::{
    audio::{frame::FrameFormat, AudioCapture, CaptureFault},
    buffering::create_audio_ring,
    classify::{EnergyClassifier, FrameClassifier},
    convo::Session,
    diagnostics::{DiagnosticsSnapshot, EngineDiagnostics},
    dispatch::{self, DispatchConfig, DispatchContext},
    error::{ParleyError, Result},
    events::{ConversationEvent, EngineStatus, EngineStatusEvent},
    providers::{Playback, ResponseModel, SpeechSynthesizer, Transcriber},
    segment::SegmenterConfig,
    turn::{ListeningState, TurnGate},
};

/// Broadcast channel capacity: events buffered for slow consumers.
const BROADCAST_CAP: usize = 256;

/// Fixed system preamble folded into the first user message.
pub const DEFAULT_PREAMBLE: &str = "You are Parley, a helpful voice assistant. \
Respond briefly and clearly — three sentences at most, in plain spoken prose \
with no markup. Focus on one task at a time and avoid unnecessary detail. \
Do not invent changeable facts such as weather, prices, or the current time. \
If the user provides context, use it directly without repeating it back.";

/// Configuration for `ParleyEngine`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Sample rate the segmenter and providers operate at (Hz). Audio
    /// captured at other rates is resampled. Default: 16000.
    pub target_sample_rate: u32,
    /// Frame duration in milliseconds. Default: 10.
    pub frame_ms: u32,
    /// Seconds of continuous silence that end an utterance. Default: 0.5.
    pub sensitivity_secs: f32,
    /// Bound on buffered voiced frames per utterance. Default: 2000 (≈20 s).
    pub max_buffered_frames: usize,
    /// Bound on the diagnostic classification history. Default: 50.
    pub history_frames: usize,
    /// RMS threshold for the default energy classifier. Default: 0.02.
    pub classifier_threshold: f32,
    /// Hangover frames for the default energy classifier. Default: 0.
    pub classifier_hangover_frames: u32,
    /// Utterances with fewer samples never start a turn.
    /// Default: 12000 (0.75 s at 16 kHz).
    pub min_turn_samples: usize,
    /// Language hint forwarded to the transcriber. Default: "en".
    pub language: String,
    /// System preamble folded into the first user message.
    pub preamble: String,
    /// Audio file played once when the engine first starts listening.
    pub ready_cue: Option<std::path::PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16_000,
            frame_ms: 10,
            sensitivity_secs: 0.5,
            max_buffered_frames: 2000,
            history_frames: 50,
            classifier_threshold: 0.02,
            classifier_hangover_frames: 0,
            min_turn_samples: 12_000,
            language: "en".into(),
            preamble: DEFAULT_PREAMBLE.into(),
            ready_cue: None,
        }
    }
}

impl EngineConfig {
    pub fn frame_format(&self) -> FrameFormat {
        FrameFormat::new(self.target_sample_rate, 1, self.frame_ms)
    }

    pub(crate) fn segmenter_config(&self) -> SegmenterConfig {
        SegmenterConfig {
            sensitivity_secs: self.sensitivity_secs,
            max_buffered_frames: self.max_buffered_frames,
            history_frames: self.history_frames,
        }
    }
}

/// The external capabilities a running engine talks to.
#[derive(Clone)]
pub struct ProviderSet {
    pub transcriber: Arc<dyn Transcriber>,
    pub model: Arc<dyn ResponseModel>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub playback: Arc<dyn Playback>,
}

/// The top-level engine handle.
///
/// `ParleyEngine` is `Send + Sync` — all fields use interior mutability.
/// Wrap in `Arc<ParleyEngine>` to share with event-forwarding tasks.
pub struct ParleyEngine {
    config: EngineConfig,
    providers: ProviderSet,
    /// `true` while capture + both loops are active.
    running: Arc<AtomicBool>,
    /// The ListeningState cell shared with both loops.
    gate: Arc<TurnGate>,
    /// Canonical status (written via Mutex, read from callers).
    status: Arc<Mutex<EngineStatus>>,
    convo_tx: broadcast::Sender<ConversationEvent>,
    status_tx: broadcast::Sender<EngineStatusEvent>,
    /// Monotonically increasing conversation event sequence.
    seq: Arc<AtomicU64>,
    diagnostics: Arc<EngineDiagnostics>,
}

impl ParleyEngine {
    /// Create a new engine. Does not start capturing — call `start()`.
    pub fn new(config: EngineConfig, providers: ProviderSet) -> Self {
        let (convo_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);

        Self {
            config,
            providers,
            running: Arc::new(AtomicBool::new(false)),
            gate: Arc::new(TurnGate::new()),
            status: Arc::new(Mutex::new(EngineStatus::Idle)),
            convo_tx,
            status_tx,
            seq: Arc::new(AtomicU64::new(0)),
            diagnostics: Arc::new(EngineDiagnostics::default()),
        }
    }

    /// Start audio capture, the listen loop, and the dispatch loop.
    ///
    /// Blocks until the audio device is confirmed open (or fails), then
    /// returns. Both loops continue in background blocking threads.
    ///
    /// # Errors
    /// - `ParleyError::AlreadyRunning` if already started.
    /// - `ParleyError::NoDefaultInputDevice` / `ParleyError::AudioStream` on
    ///   device errors.
    pub fn start(&self) -> Result<()> {
        self.start_with_device(None)
    }

    /// Start the engine using a preferred input device name.
    pub fn start_with_device(&self, preferred_input_device: Option<String>) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(ParleyError::AlreadyRunning);
        }

        self.diagnostics.reset();
        self.running.store(true, Ordering::SeqCst);

        let (producer, consumer) = create_audio_ring();
        let (handoff_tx, handoff_rx) = crossbeam_channel::unbounded();
        let fault = CaptureFault::new();

        let classifier: Box<dyn FrameClassifier> = Box::new(EnergyClassifier::new(
            self.config.classifier_threshold,
            self.config.classifier_hangover_frames,
        ));

        // ── Listen context ───────────────────────────────────────────────
        let listen_running = Arc::clone(&self.running);
        let listen_status = Arc::clone(&self.status);
        let listen_status_tx = self.status_tx.clone();
        let listen_ctx_parts = (
            self.config.clone(),
            Arc::clone(&self.gate),
            handoff_tx,
            fault.clone(),
            Arc::clone(&self.diagnostics),
        );

        // Sync oneshot: listen thread signals device open success/failure.
        // Carries the actual capture sample rate on success.
        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<u32>>();

        tokio::task::spawn_blocking(move || {
            let (config, gate, handoff_tx, fault, diagnostics) = listen_ctx_parts;

            // Open the device on THIS thread — cpal::Stream is !Send.
            let capture = match AudioCapture::open_with_preference(
                producer,
                Arc::clone(&listen_running),
                fault.clone(),
                preferred_input_device.as_deref(),
            ) {
                Ok(c) => {
                    let _ = open_tx.send(Ok(c.sample_rate));
                    c
                }
                Err(e) => {
                    let _ = open_tx.send(Err(e));
                    listen_running.store(false, Ordering::SeqCst);
                    return;
                }
            };

            let capture_sample_rate = capture.sample_rate;

            let result = pipeline::run(pipeline::ListenContext {
                config,
                classifier,
                consumer,
                running: Arc::clone(&listen_running),
                gate,
                handoff_tx,
                fault,
                capture_sample_rate,
                diagnostics,
            });

            if let Err(e) = result {
                tracing::error!(error = %e, "listen loop terminated abnormally");
                *listen_status.lock() = EngineStatus::Error;
                let _ = listen_status_tx.send(EngineStatusEvent {
                    status: EngineStatus::Error,
                    detail: Some(e.to_string()),
                });
                listen_running.store(false, Ordering::SeqCst);
            }

            // Stream drops here, releasing the audio device on this thread.
            drop(capture);
        });

        // ── Dispatch context ─────────────────────────────────────────────
        let dispatch_ctx = DispatchContext {
            config: DispatchConfig {
                min_turn_samples: self.config.min_turn_samples,
                language: self.config.language.clone(),
            },
            queue_rx: handoff_rx,
            gate: Arc::clone(&self.gate),
            running: Arc::clone(&self.running),
            session: Session::new(self.config.preamble.clone()),
            transcriber: Arc::clone(&self.providers.transcriber),
            model: Arc::clone(&self.providers.model),
            synthesizer: Arc::clone(&self.providers.synthesizer),
            playback: Arc::clone(&self.providers.playback),
            convo_tx: self.convo_tx.clone(),
            status_tx: self.status_tx.clone(),
            status: Arc::clone(&self.status),
            seq: Arc::clone(&self.seq),
            diagnostics: Arc::clone(&self.diagnostics),
        };

        tokio::task::spawn_blocking(move || dispatch::run(dispatch_ctx));

        // Block start() until device open is confirmed.
        match open_rx.recv() {
            Ok(Ok(rate)) => {
                if self.gate.resume() {
                    self.play_ready_cue();
                }
                self.set_status(EngineStatus::Listening, None);
                info!(capture_sample_rate = rate, "engine started — listening");
                Ok(())
            }
            Ok(Err(e)) => {
                self.running.store(false, Ordering::SeqCst);
                self.set_status(EngineStatus::Error, Some(e.to_string()));
                Err(e)
            }
            Err(_) => {
                // Channel closed before a message was sent — the listen task
                // died before opening the device.
                self.running.store(false, Ordering::SeqCst);
                self.set_status(EngineStatus::Error, Some("pipeline failed to start".into()));
                Err(ParleyError::Other(anyhow::anyhow!(
                    "listen task died unexpectedly"
                )))
            }
        }
    }

    /// Stop capture and both loops.
    ///
    /// # Errors
    /// - `ParleyError::NotRunning` if not currently running.
    pub fn stop(&self) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(ParleyError::NotRunning);
        }

        self.running.store(false, Ordering::SeqCst);
        self.set_status(EngineStatus::Stopped, None);
        info!("engine stop requested");
        Ok(())
    }

    /// Current engine status (snapshot).
    pub fn status(&self) -> EngineStatus {
        *self.status.lock()
    }

    /// Current mute/listen state of the capture path.
    pub fn listening_state(&self) -> ListeningState {
        self.gate.state()
    }

    /// Subscribe to conversation events (user transcripts, assistant
    /// replies).
    pub fn subscribe_conversation(&self) -> broadcast::Receiver<ConversationEvent> {
        self.convo_tx.subscribe()
    }

    /// Subscribe to engine status change events.
    pub fn subscribe_status(&self) -> broadcast::Receiver<EngineStatusEvent> {
        self.status_tx.subscribe()
    }

    /// Snapshot of pipeline counters for observability.
    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    // ── Internal helpers ─────────────────────────────────────────────────

    fn play_ready_cue(&self) {
        let Some(cue) = self.config.ready_cue.as_deref() else {
            return;
        };
        if let Err(e) = self.providers.playback.play(cue) {
            warn!(error = %e, cue = %cue.display(), "ready cue playback failed");
        }
    }

    fn set_status(&self, new_status: EngineStatus, detail: Option<String>) {
        *self.status.lock() = new_status;
        let _ = self.status_tx.send(EngineStatusEvent {
            status: new_status,
            detail,
        });
    }
}
