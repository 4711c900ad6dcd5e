//! Audio capture via cpal backend.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It **must not**:
//! - Allocate heap memory (beyond a one-time scratch resize)
//! - Block on a mutex or condvar
//! - Perform I/O
//!
//! The callback therefore only downmixes to mono f32 and writes into an SPSC
//! ring buffer producer whose `push_slice` is lock-free.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). `AudioCapture` must be created and dropped on the same thread; the
//! engine does both inside one `spawn_blocking` closure.

pub mod frame;
pub mod resample;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, StreamTrait},
    SampleFormat, SampleRate, Stream, StreamConfig,
};

use crate::{
    buffering::{AudioProducer, Producer},
    error::{ParleyError, Result},
};
use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{error, info, warn};

/// Records a fatal device fault raised by the cpal error callback.
///
/// The error callback runs on the audio thread and cannot return an error to
/// anyone; it stores the message here instead. The listen loop polls
/// [`CaptureFault::take`] each iteration and terminates when a fault appears —
/// capture is not retried internally, the surrounding process decides whether
/// to restart.
#[derive(Clone, Default)]
pub struct CaptureFault(Arc<Mutex<Option<String>>>);

impl CaptureFault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, message: String) {
        let mut slot = self.0.lock();
        if slot.is_none() {
            *slot = Some(message);
        }
    }

    /// Take the recorded fault, if any. Subsequent calls return `None`.
    pub fn take(&self) -> Option<String> {
        self.0.lock().take()
    }
}

/// Handle to an active audio capture stream.
///
/// **Not `Send`** — `cpal::Stream` is bound to its creation thread on
/// Windows/macOS. Create and drop this type on the same OS thread.
pub struct AudioCapture {
    /// Kept alive so the stream is not dropped prematurely.
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    /// Shared flag — set to `false` to signal the callback to no-op.
    running: Arc<AtomicBool>,
    /// Actual capture sample rate reported by the device (Hz).
    pub sample_rate: u32,
}

/// Downmix an interleaved input buffer to mono f32 and push it into the ring.
///
/// `scale` converts one raw sample to f32 in [-1.0, 1.0].
#[cfg(feature = "audio-cpal")]
fn downmix_into_ring<T: Copy>(
    data: &[T],
    channels: usize,
    scale: impl Fn(T) -> f32,
    mix_buf: &mut Vec<f32>,
    producer: &mut AudioProducer,
) {
    let frames = data.len() / channels;
    mix_buf.resize(frames, 0.0);

    for (f, out) in mix_buf.iter_mut().enumerate() {
        let base = f * channels;
        let mut sum = 0f32;
        for c in 0..channels {
            sum += scale(data[base + c]);
        }
        *out = sum / channels as f32;
    }

    let written = producer.push_slice(mix_buf);
    if written < mix_buf.len() {
        warn!(
            dropped = mix_buf.len() - written,
            "ring buffer full: dropped captured frames"
        );
    }
}

impl AudioCapture {
    /// Open an input device by preferred name, otherwise fall back to the
    /// default input device and then the first available device.
    ///
    /// Captured samples are downmixed to mono f32 and pushed into `producer`.
    /// Device faults are recorded in `fault` for the listen loop to observe.
    #[cfg(feature = "audio-cpal")]
    pub fn open_with_preference(
        mut producer: AudioProducer,
        running: Arc<AtomicBool>,
        fault: CaptureFault,
        preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        use cpal::traits::HostTrait;

        let host = cpal::default_host();
        let mut selected_device = None;

        if let Some(preferred_name) = preferred_device_name {
            match host.input_devices() {
                Ok(mut devices) => {
                    selected_device = devices.find(|device| {
                        device
                            .name()
                            .map(|name| name == preferred_name)
                            .unwrap_or(false)
                    });

                    if selected_device.is_none() {
                        warn!(
                            "preferred input device '{}' not found, falling back",
                            preferred_name
                        );
                    }
                }
                Err(e) => {
                    warn!("failed to list input devices while resolving preference: {e}");
                }
            }
        }

        let device = if let Some(device) = selected_device {
            device
        } else if let Some(default) = host.default_input_device() {
            default
        } else {
            let mut devices = host
                .input_devices()
                .map_err(|e| ParleyError::AudioDevice(e.to_string()))?;
            let fallback = devices.next().ok_or(ParleyError::NoDefaultInputDevice)?;
            warn!("no default input device, falling back to first available input");
            fallback
        };

        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening input device"
        );

        let supported = device
            .default_input_config()
            .map_err(|e| ParleyError::AudioDevice(e.to_string()))?;

        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();

        info!(sample_rate, channels, "audio config selected");

        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let ch = channels as usize;
        let error_callback = |fault: CaptureFault| {
            move |err: cpal::StreamError| {
                error!("audio stream error: {err}");
                fault.record(err.to_string());
            }
        };

        let stream = match supported.sample_format() {
            SampleFormat::F32 => {
                let flag = Arc::clone(&running);
                let mut mix_buf: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[f32], _info| {
                        if !flag.load(Ordering::Relaxed) {
                            return;
                        }
                        downmix_into_ring(data, ch, |s| s, &mut mix_buf, &mut producer);
                    },
                    error_callback(fault.clone()),
                    None,
                )
            }

            SampleFormat::I16 => {
                let flag = Arc::clone(&running);
                let mut mix_buf: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[i16], _info| {
                        if !flag.load(Ordering::Relaxed) {
                            return;
                        }
                        downmix_into_ring(
                            data,
                            ch,
                            |s| s as f32 / 32768.0,
                            &mut mix_buf,
                            &mut producer,
                        );
                    },
                    error_callback(fault.clone()),
                    None,
                )
            }

            SampleFormat::U8 => {
                let flag = Arc::clone(&running);
                let mut mix_buf: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[u8], _info| {
                        if !flag.load(Ordering::Relaxed) {
                            return;
                        }
                        downmix_into_ring(
                            data,
                            ch,
                            |s| (s as f32 - 128.0) / 128.0,
                            &mut mix_buf,
                            &mut producer,
                        );
                    },
                    error_callback(fault.clone()),
                    None,
                )
            }

            fmt => {
                return Err(ParleyError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| ParleyError::AudioStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| ParleyError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            running,
            sample_rate,
        })
    }

    /// Open the system default microphone.
    ///
    /// Must be called from the thread that will also drop this value.
    /// In practice this means calling it inside `tokio::task::spawn_blocking`.
    ///
    /// # Errors
    /// Returns `ParleyError::NoDefaultInputDevice` when no microphone is
    /// available, or `ParleyError::AudioStream` if cpal fails to build the
    /// stream.
    #[cfg(feature = "audio-cpal")]
    pub fn open_default(
        producer: AudioProducer,
        running: Arc<AtomicBool>,
        fault: CaptureFault,
    ) -> Result<Self> {
        Self::open_with_preference(producer, running, fault, None)
    }

    /// Stop: signal the callback to no-op on its next invocation.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl AudioCapture {
    pub fn open_with_preference(
        _producer: AudioProducer,
        _running: Arc<AtomicBool>,
        _fault: CaptureFault,
        _preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        Err(ParleyError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }

    pub fn open_default(
        producer: AudioProducer,
        running: Arc<AtomicBool>,
        fault: CaptureFault,
    ) -> Result<Self> {
        Self::open_with_preference(producer, running, fault, None)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::CaptureFault;

    #[test]
    fn fault_records_first_message_only() {
        let fault = CaptureFault::new();
        fault.record("device unplugged".into());
        fault.record("late follower".into());
        assert_eq!(fault.take().as_deref(), Some("device unplugged"));
        assert!(fault.take().is_none());
    }
}
