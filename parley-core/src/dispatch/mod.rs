//! The dispatch loop: one full conversational turn per sealed utterance.
//!
//! ## Turn sequence
//!
//! ```text
//! 1. Blocking pop from the handoff queue
//! 2. Under min_turn_samples → discard (no mute, no history)
//! 3. Mute via TurnGuard; drain stale queue backlog
//! 4. Transcribe — empty text skips the turn
//! 5. Append user message, render session, call the response model
//! 6. Append assistant message, synthesize, block on playback
//! 7. Guard drop → unmute, on every path out of 4–6
//! ```
//!
//! This loop runs in `spawn_blocking` and is the only place external calls
//! happen. However long they take, the capture side keeps draining the ring,
//! and the guard restores Listening on every exit path.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, error, info, info_span, warn};

use crate::{
    convo::{Role, Session, ASSISTANT_CUE},
    diagnostics::EngineDiagnostics,
    error::Result,
    events::{ConversationEvent, EngineStatus, EngineStatusEvent},
    providers::{Playback, ResponseModel, SpeechSynthesizer, Transcriber},
    segment::Utterance,
    turn::{TurnGate, TurnGuard},
};

/// How often the blocking pop re-checks the running flag.
const QUEUE_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Utterances with fewer samples are discarded without starting a turn.
    /// Default: 12000 (0.75 s at 16 kHz) — filters coughs and clicks.
    pub min_turn_samples: usize,
    /// Language hint forwarded to the transcriber.
    pub language: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            min_turn_samples: 12_000,
            language: "en".into(),
        }
    }
}

/// All context the dispatch loop needs, passed as one struct so the closure
/// stays tidy.
pub struct DispatchContext {
    pub config: DispatchConfig,
    pub queue_rx: Receiver<Utterance>,
    pub gate: Arc<TurnGate>,
    pub running: Arc<AtomicBool>,
    /// Conversation history — owned here, mutated nowhere else.
    pub session: Session,
    pub transcriber: Arc<dyn Transcriber>,
    pub model: Arc<dyn ResponseModel>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub playback: Arc<dyn Playback>,
    pub convo_tx: broadcast::Sender<ConversationEvent>,
    pub status_tx: broadcast::Sender<EngineStatusEvent>,
    pub status: Arc<Mutex<EngineStatus>>,
    pub seq: Arc<AtomicU64>,
    pub diagnostics: Arc<EngineDiagnostics>,
}

/// Run the dispatch loop until `ctx.running` becomes false.
pub fn run(mut ctx: DispatchContext) {
    info!("dispatcher started");

    loop {
        if !ctx.running.load(Ordering::Relaxed) {
            break;
        }

        let utterance = match ctx.queue_rx.recv_timeout(QUEUE_POLL) {
            Ok(u) => u,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        handle_utterance(&mut ctx, utterance);
    }

    let snap = ctx.diagnostics.snapshot();
    info!(
        turns_completed = snap.turns_completed,
        turns_failed = snap.turns_failed,
        empty_transcriptions = snap.empty_transcriptions,
        utterances_skipped_short = snap.utterances_skipped_short,
        "dispatcher stopped"
    );
}

/// What a muted turn amounted to.
enum TurnOutcome {
    Completed,
    EmptyTranscription,
}

fn handle_utterance(ctx: &mut DispatchContext, utterance: Utterance) {
    // Spurious micro-triggers never start a turn: no mute, no transcription,
    // no history mutation.
    if utterance.sample_count() < ctx.config.min_turn_samples {
        debug!(
            samples = utterance.sample_count(),
            min = ctx.config.min_turn_samples,
            "discarding short utterance"
        );
        ctx.diagnostics
            .utterances_skipped_short
            .fetch_add(1, Ordering::Relaxed);
        return;
    }

    let span = info_span!("turn", samples = utterance.sample_count());
    let _enter = span.enter();

    let gate = Arc::clone(&ctx.gate);
    let turn = TurnGuard::acquire(&gate);
    set_status(ctx, EngineStatus::Processing);

    // Anything queued before the mute is stale — never replayed.
    let drained = ctx.queue_rx.try_iter().count();
    if drained > 0 {
        debug!(drained, "discarded stale utterances queued before mute");
        ctx.diagnostics
            .stale_drained
            .fetch_add(drained, Ordering::Relaxed);
    }

    match run_turn(ctx, &utterance) {
        Ok(TurnOutcome::Completed) => {
            ctx.diagnostics
                .turns_completed
                .fetch_add(1, Ordering::Relaxed);
        }
        Ok(TurnOutcome::EmptyTranscription) => {
            ctx.diagnostics
                .empty_transcriptions
                .fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            ctx.diagnostics.turns_failed.fetch_add(1, Ordering::Relaxed);
            error!(error = %e, "turn aborted");
        }
    }

    // Unmute before announcing Listening, on success and failure alike.
    drop(turn);
    set_status(ctx, EngineStatus::Listening);
}

fn run_turn(ctx: &mut DispatchContext, utterance: &Utterance) -> Result<TurnOutcome> {
    let text = ctx.transcriber.transcribe(
        utterance.samples(),
        utterance.sample_rate(),
        &ctx.config.language,
    )?;
    let text = text.trim();

    if text.is_empty() {
        info!("transcription empty — skipping turn");
        return Ok(TurnOutcome::EmptyTranscription);
    }

    ctx.session.push_user(text);
    emit_conversation(ctx, Role::User, text);

    let prompt = format!("{}{}", ctx.session.render_prompt(), ASSISTANT_CUE);
    let reply = ctx.model.generate(&prompt)?;

    ctx.session.push_assistant(&reply);
    emit_conversation(ctx, Role::Assistant, &reply);

    // The reply is already part of the conversation; a synthesis or playback
    // fault downgrades to an unspoken reply rather than a failed turn.
    if let Err(e) = speak(ctx, &reply) {
        warn!(error = %e, "reply kept in history but not spoken");
    }

    Ok(TurnOutcome::Completed)
}

fn speak(ctx: &DispatchContext, text: &str) -> Result<()> {
    let audio = ctx.synthesizer.synthesize(text)?;
    ctx.playback.play(&audio)
}

fn emit_conversation(ctx: &DispatchContext, role: Role, text: &str) {
    let seq = ctx.seq.fetch_add(1, Ordering::Relaxed);
    let _ = ctx.convo_tx.send(ConversationEvent {
        seq,
        role,
        text: text.to_string(),
    });
}

fn set_status(ctx: &DispatchContext, status: EngineStatus) {
    *ctx.status.lock() = status;
    let _ = ctx.status_tx.send(EngineStatusEvent {
        status,
        detail: None,
    });
}
