//! # Audio Capture
//!
//! The `AudioSource` trait is the seam between the recording worker and the
//! capture hardware; the production implementation uses CPAL to read the
//! default input device at 16 kHz mono.

use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};

/// A source of mono 16 kHz i16 samples.
pub trait AudioSource: Send {
    /// Begin capturing. Starting an already started source is a no-op.
    fn start(&mut self) -> Result<()>;

    /// Stop capturing.
    fn stop(&mut self) -> Result<()>;

    /// Drain all samples captured since the previous call.
    fn read_samples(&mut self) -> Result<Vec<i16>>;
}

/// Capture sample rate required by the transcription engine.
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// Wrapper for `cpal::Stream` to make it Send.
///
/// SAFETY: the stream is only touched through the mutex in
/// `CpalAudioSource`, and all calls happen on the recording worker thread,
/// so it never crosses thread boundaries concurrently.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Microphone capture through CPAL.
///
/// Asks for i16/16kHz/mono first (PipeWire/PulseAudio convert transparently)
/// and falls back to f32 with in-callback conversion for devices that only
/// expose float formats.
pub struct CpalAudioSource {
    device: cpal::Device,
    stream: Option<SendableStream>,
    buffer: Arc<Mutex<Vec<i16>>>,
}

impl CpalAudioSource {
    /// Open the default input device.
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| anyhow!("No audio input device available"))?;

        Ok(Self {
            device,
            stream: None,
            buffer: Arc::new(Mutex::new(Vec::new())),
        })
    }

    fn build_stream(&self) -> Result<cpal::Stream> {
        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(CAPTURE_SAMPLE_RATE),
            buffer_size: cpal::BufferSize::Default,
        };

        let err_callback = |err| {
            tracing::error!("Audio stream error: {}", err);
        };

        let buffer = Arc::clone(&self.buffer);
        if let Ok(stream) = self.device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                if let Ok(mut buf) = buffer.lock() {
                    buf.extend_from_slice(data);
                }
            },
            err_callback,
            None,
        ) {
            return Ok(stream);
        }

        let buffer = Arc::clone(&self.buffer);
        self.device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend(
                            data.iter()
                                .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16),
                        );
                    }
                },
                err_callback,
                None,
            )
            .map_err(|e| anyhow!("Failed to build input stream: {}", e))
    }
}

impl AudioSource for CpalAudioSource {
    fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let stream = self.build_stream()?;
        stream
            .play()
            .map_err(|e| anyhow!("Failed to start audio stream: {}", e))?;
        self.stream = Some(SendableStream(stream));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            stream
                .0
                .pause()
                .map_err(|e| anyhow!("Failed to stop audio stream: {}", e))?;
        }
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<i16>> {
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| anyhow!("Audio buffer lock poisoned"))?;
        Ok(std::mem::take(&mut *buffer))
    }
}
