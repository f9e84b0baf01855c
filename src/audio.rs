//! Audio capture
//!
//! Captures PCM16 mono audio at the Realtime API's 24 kHz rate and hands it
//! to the session worker in fixed-size chunks. A loopback device such as
//! "BlackHole 16ch" lets the overlay listen to meeting audio instead of the
//! microphone; when the preferred device is absent the default input is used.

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::mpsc::Sender;
use tracing::{debug, info, warn};

use crate::config::AudioConfig;

/// cpal streams hold raw platform handles and are not Send by default.
/// The stream is only ever dropped from the owning thread; the wrapper just
/// lets the handle live inside a struct that crosses thread boundaries.
#[allow(dead_code)]
pub struct SendStream(pub cpal::Stream);
unsafe impl Send for SendStream {}

/// A running capture stream; capture stops when this is dropped
pub struct AudioCapture {
    _stream: SendStream,
    /// Name of the device actually opened
    pub device_name: String,
}

/// Accumulates samples into fixed-size chunks
struct Chunker {
    buf: Vec<i16>,
    frames: usize,
}

impl Chunker {
    fn new(frames: usize) -> Self {
        Self {
            buf: Vec::with_capacity(frames),
            frames: frames.max(1),
        }
    }

    fn push<F: FnMut(Vec<i16>)>(&mut self, samples: &[i16], mut emit: F) {
        for &sample in samples {
            self.buf.push(sample);
            if self.buf.len() >= self.frames {
                emit(std::mem::replace(
                    &mut self.buf,
                    Vec::with_capacity(self.frames),
                ));
            }
        }
    }
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// List the names of all available input devices
pub fn list_input_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .context("Failed to enumerate input devices")?;
    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

/// Pick the preferred device by case-insensitive substring, else the default
fn pick_device(preferred: Option<&str>) -> Result<(cpal::Device, String)> {
    let host = cpal::default_host();

    if let Some(wanted) = preferred {
        let wanted_lower = wanted.to_lowercase();
        if let Ok(devices) = host.input_devices() {
            for device in devices {
                if let Ok(name) = device.name() {
                    if name.to_lowercase().contains(&wanted_lower) {
                        info!("Using preferred input device: {}", name);
                        return Ok((device, name));
                    }
                }
            }
        }
        warn!("Preferred input device '{}' not found, using default", wanted);
    }

    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No input device available"))?;
    let name = device.name().unwrap_or_else(|_| "default".to_string());
    info!("Using default input device: {}", name);
    Ok((device, name))
}

/// Open the capture stream and start sending chunks
///
/// Chunks are dropped (not queued without bound) when the session worker
/// lags; live audio must never backpressure the UI.
pub fn start_capture(config: &AudioConfig, chunks_tx: Sender<Vec<i16>>) -> Result<AudioCapture> {
    let (device, device_name) = pick_device(config.preferred_device.as_deref())?;

    let stream_config = cpal::StreamConfig {
        channels: 1,
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let sample_format = device
        .default_input_config()
        .context("Failed to query device input format")?
        .sample_format();

    let mut chunker = Chunker::new(config.chunk_frames);
    let err_fn = |e| warn!("Audio stream error: {}", e);

    let stream = match sample_format {
        cpal::SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                chunker.push(data, |chunk| {
                    if chunks_tx.try_send(chunk).is_err() {
                        debug!("Audio chunk dropped; session worker not keeping up");
                    }
                });
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let converted: Vec<i16> = data.iter().copied().map(f32_to_i16).collect();
                chunker.push(&converted, |chunk| {
                    if chunks_tx.try_send(chunk).is_err() {
                        debug!("Audio chunk dropped; session worker not keeping up");
                    }
                });
            },
            err_fn,
            None,
        ),
        other => {
            return Err(anyhow!("Unsupported input sample format: {:?}", other));
        }
    }
    .with_context(|| {
        format!(
            "Failed to open {} Hz mono input stream on '{}'",
            config.sample_rate, device_name
        )
    })?;

    stream.play().context("Failed to start audio stream")?;
    info!(
        "Audio capture started on '{}' ({} Hz, {}-sample chunks)",
        device_name, config.sample_rate, config.chunk_frames
    );

    Ok(AudioCapture {
        _stream: SendStream(stream),
        device_name,
    })
}
