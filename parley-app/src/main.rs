//! Parley console assistant entry point.
//!
//! Wires the engine to its hosted capabilities (Groq-style transcription,
//! Gemini responses, piper TTS, ffplay output) and renders the conversation
//! to the terminal until interrupted.

mod settings;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use parley_core::providers::gemini::GeminiConfig;
use parley_core::providers::piper::{FfplayConfig, PiperConfig};
use parley_core::providers::transcription::HttpTranscriberConfig;
use parley_core::{
    EngineConfig, EngineStatus, FfplayPlayback, GeminiModel, HttpTranscriber, ParleyEngine,
    PiperSynthesizer, ProviderSet, Role,
};
use settings::{default_settings_path, load_settings, AppSettings};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const CYAN: &str = "\x1b[36m";
const WHITE: &str = "\x1b[37m";
const RESET: &str = "\x1b[0m";

fn engine_config(settings: &AppSettings) -> EngineConfig {
    EngineConfig {
        sensitivity_secs: settings.sensitivity_secs,
        min_turn_samples: settings.min_turn_samples,
        classifier_threshold: settings.classifier_threshold,
        language: settings.language.clone(),
        ready_cue: settings.ready_cue.clone(),
        ..EngineConfig::default()
    }
}

fn build_providers(settings: &AppSettings) -> anyhow::Result<ProviderSet> {
    let timeout = settings.turn_timeout();

    let response_key = settings
        .resolve_response_api_key()
        .context("no response-model API key — set PARLEY_API_KEY or GEMINI_API_KEY")?;
    let transcription_key = settings
        .resolve_transcription_api_key()
        .context("no transcription API key — set PARLEY_TRANSCRIPTION_API_KEY or GROQ_API_KEY")?;

    let transcriber = HttpTranscriber::new(HttpTranscriberConfig {
        api_url: settings.transcription_api_url.clone(),
        api_key: transcription_key,
        model: settings.transcription_model.clone(),
        timeout,
    })?;

    let model = GeminiModel::new(GeminiConfig {
        model: settings.response_model.clone(),
        timeout,
        ..GeminiConfig::new(response_key)
    })?;

    let synthesizer = PiperSynthesizer::new(PiperConfig {
        timeout,
        ..PiperConfig::new(
            settings.piper_binary.clone(),
            settings.piper_voice.clone(),
            settings.audio_dir.clone(),
        )
    })?;

    let playback = FfplayPlayback::new(FfplayConfig {
        timeout: Duration::from_secs(settings.turn_timeout_secs * 2),
        ..FfplayConfig::default()
    });

    Ok(ProviderSet {
        transcriber: Arc::new(transcriber),
        model: Arc::new(model),
        synthesizer: Arc::new(synthesizer),
        playback: Arc::new(playback),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("parley_core=info,parley_app=info")),
        )
        .init();

    println!("\n{CYAN}Welcome to Parley{RESET}\n");

    let settings_path = default_settings_path();
    let settings = load_settings(&settings_path);
    if !settings_path.exists() {
        // Leave a template behind so the defaults are easy to edit.
        if let Err(e) = settings::save_settings(&settings_path, &AppSettings::default()) {
            warn!(error = %e, "could not write default settings file");
        }
    }
    info!(path = %settings_path.display(), "settings loaded");

    let providers = build_providers(&settings)?;
    let engine = Arc::new(ParleyEngine::new(engine_config(&settings), providers));

    let mut convo_rx = engine.subscribe_conversation();
    let mut status_rx = engine.subscribe_status();

    engine
        .start_with_device(settings.preferred_input_device.clone())
        .context("failed to start capture")?;
    println!("{CYAN}Listening...{RESET}");

    // Render the conversation as it happens.
    tokio::spawn(async move {
        while let Ok(event) = convo_rx.recv().await {
            match event.role {
                Role::User => println!("{WHITE}You: {}{RESET}", event.text),
                Role::Assistant => println!("{CYAN}Parley: {}{RESET}", event.text),
            }
        }
    });

    // Surface fatal engine states.
    tokio::spawn(async move {
        while let Ok(event) = status_rx.recv().await {
            if event.status == EngineStatus::Error {
                eprintln!(
                    "engine error: {}",
                    event.detail.unwrap_or_else(|| "unknown".into())
                );
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("interrupt received — shutting down");
    engine.stop().ok();
    println!("\n{CYAN}Goodbye.{RESET}");
    Ok(())
}
