//! Subprocess TTS and playback: piper for synthesis, ffplay for output.
//!
//! Both children run under a deadline. A wedged subprocess is killed and
//! reported as an error instead of stalling the dispatch context.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::{debug, info, warn};

use super::{Playback, SpeechSynthesizer};
use crate::error::{ParleyError, Result};

/// Poll interval while waiting on a child process.
const WAIT_POLL: Duration = Duration::from_millis(25);

/// Wait for `child` to exit within `deadline`; kill it on overrun.
fn wait_with_deadline(mut child: Child, deadline: Duration, what: &str) -> Result<()> {
    let started = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) if status.success() => return Ok(()),
            Ok(Some(status)) => {
                return Err(ParleyError::Playback(format!(
                    "{what} exited with {status}"
                )))
            }
            Ok(None) => {
                if started.elapsed() >= deadline {
                    warn!(what, "subprocess deadline exceeded — killing");
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ParleyError::Playback(format!(
                        "{what} exceeded {}s deadline",
                        deadline.as_secs()
                    )));
                }
                std::thread::sleep(WAIT_POLL);
            }
            Err(e) => return Err(ParleyError::Playback(format!("{what} wait failed: {e}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PiperConfig {
    /// Path to the piper executable.
    pub binary: PathBuf,
    /// Path to the voice model (.onnx).
    pub voice: PathBuf,
    /// Directory for synthesized output.
    pub out_dir: PathBuf,
    /// Upper bound on one synthesis run.
    pub timeout: Duration,
}

impl PiperConfig {
    pub fn new(binary: PathBuf, voice: PathBuf, out_dir: PathBuf) -> Self {
        Self {
            binary,
            voice,
            out_dir,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Piper TTS: reply text on stdin, WAV file out.
pub struct PiperSynthesizer {
    config: PiperConfig,
}

impl PiperSynthesizer {
    pub fn new(config: PiperConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.out_dir)
            .with_context(|| format!("failed to create {}", config.out_dir.display()))?;
        Ok(Self { config })
    }
}

impl SpeechSynthesizer for PiperSynthesizer {
    fn synthesize(&self, text: &str) -> Result<PathBuf> {
        let output_file = self.config.out_dir.join("reply.wav");
        debug!(chars = text.len(), out = %output_file.display(), "synthesizing reply");

        let mut child = Command::new(&self.config.binary)
            .arg("--model")
            .arg(&self.config.voice)
            .arg("--output_file")
            .arg(&output_file)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ParleyError::Synthesis(format!("failed to spawn piper: {e}")))?;

        {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| ParleyError::Synthesis("piper stdin unavailable".into()))?;
            stdin
                .write_all(text.as_bytes())
                .map_err(|e| ParleyError::Synthesis(format!("failed to write to piper: {e}")))?;
            // stdin drops here so piper sees EOF and starts synthesis
        }

        wait_with_deadline(child, self.config.timeout, "piper")
            .map_err(|e| ParleyError::Synthesis(e.to_string()))?;

        info!(out = %output_file.display(), "synthesis complete");
        Ok(output_file)
    }
}

#[derive(Debug, Clone)]
pub struct FfplayConfig {
    /// Playback executable; `ffplay` resolved from PATH by default.
    pub binary: PathBuf,
    /// Upper bound on one playback run.
    pub timeout: Duration,
}

impl Default for FfplayConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("ffplay"),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Blocking audio playback through ffplay.
pub struct FfplayPlayback {
    config: FfplayConfig,
}

impl FfplayPlayback {
    pub fn new(config: FfplayConfig) -> Self {
        Self { config }
    }
}

impl Playback for FfplayPlayback {
    fn play(&self, audio: &Path) -> Result<()> {
        debug!(file = %audio.display(), "playing audio");

        let child = Command::new(&self.config.binary)
            .args(["-nodisp", "-autoexit", "-loglevel", "quiet"])
            .arg(audio)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ParleyError::Playback(format!("failed to spawn ffplay: {e}")))?;

        wait_with_deadline(child, self.config.timeout, "ffplay")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn deadline_kills_wedged_child() {
        let child = Command::new("sleep")
            .arg("30")
            .spawn()
            .expect("spawn sleep");
        let err = wait_with_deadline(child, Duration::from_millis(100), "sleep")
            .expect_err("expected deadline error");
        assert!(err.to_string().contains("deadline"));
    }

    #[cfg(unix)]
    #[test]
    fn successful_child_passes() {
        let child = Command::new("true").spawn().expect("spawn true");
        wait_with_deadline(child, Duration::from_secs(5), "true").expect("true exits cleanly");
    }

    #[cfg(unix)]
    #[test]
    fn failing_child_reports_exit_status() {
        let child = Command::new("false").spawn().expect("spawn false");
        let err = wait_with_deadline(child, Duration::from_secs(5), "false")
            .expect_err("expected status error");
        assert!(err.to_string().contains("exited"));
    }
}
