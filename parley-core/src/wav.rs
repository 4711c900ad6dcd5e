//! WAV scratch files for the transcription handoff.
//!
//! The HTTP transcription provider uploads a file, so sealed utterances are
//! written to a temporary mono 16-bit WAV first. The file is an
//! implementation detail of that provider boundary — nothing else in the
//! engine touches disk.

use std::path::Path;

use anyhow::Context;
use hound::{SampleFormat, WavSpec, WavWriter};
use tempfile::NamedTempFile;

use crate::error::Result;

/// Write mono 16-bit PCM to `path`.
pub fn write_wav_i16(path: &Path, samples: &[i16], sample_rate: u32) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("failed to create WAV at {}", path.display()))?;
    for sample in samples {
        writer
            .write_sample(*sample)
            .context("failed to write WAV sample")?;
    }
    writer.finalize().context("failed to finalize WAV")?;
    Ok(())
}

/// Write samples to a fresh temporary WAV; the file is removed when the
/// returned handle drops.
pub fn write_temp_wav(samples: &[i16], sample_rate: u32) -> Result<NamedTempFile> {
    let file = tempfile::Builder::new()
        .prefix("parley-utterance-")
        .suffix(".wav")
        .tempfile()
        .context("failed to create temporary WAV file")?;
    write_wav_i16(file.path(), samples, sample_rate)?;
    Ok(file)
}
