//! # Whisper Engine
//!
//! `SpeechToText` implementation over [`WhisperModel`]. Keeps one loaded
//! model per size (loaded lazily on first use), decodes WAV files with
//! hound, and transcribes audio in fixed 30-second windows. When timestamps
//! are requested the window offsets become coarse per-segment timestamps.

use crate::transcription::model::{ModelSize, WhisperModel};
use crate::transcription::{SpeechToText, TranscribeOptions, Transcript, TranscriptSegment};
use anyhow::{anyhow, Result};
use candle_core::Device;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Sample rate expected by Whisper.
pub const SAMPLE_RATE: usize = 16_000;

/// Seconds of audio per transcription window.
const WINDOW_SECS: usize = 30;

/// Speech-to-text engine with a per-size model cache.
pub struct WhisperEngine {
    device: Device,
    models: Mutex<HashMap<ModelSize, Arc<Mutex<WhisperModel>>>>,
}

impl WhisperEngine {
    pub fn new(device: Device) -> Self {
        Self {
            device,
            models: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch the cached model for `size`, loading it on first use.
    fn model_for(&self, size: ModelSize) -> Result<Arc<Mutex<WhisperModel>>> {
        let mut models = self
            .models
            .lock()
            .map_err(|_| anyhow!("Model cache lock poisoned"))?;

        if let Some(model) = models.get(&size) {
            return Ok(Arc::clone(model));
        }

        let model = Arc::new(Mutex::new(WhisperModel::load(size, self.device.clone())?));
        models.insert(size, Arc::clone(&model));
        Ok(model)
    }
}

impl SpeechToText for WhisperEngine {
    fn transcribe_file(&self, path: &Path, options: &TranscribeOptions) -> Result<Transcript> {
        let samples = read_audio_file(path)?;
        self.transcribe_pcm(&samples, options)
    }

    fn transcribe_pcm(&self, samples: &[f32], options: &TranscribeOptions) -> Result<Transcript> {
        let model = self.model_for(options.model)?;
        let mut model = model
            .lock()
            .map_err(|_| anyhow!("Whisper model lock poisoned"))?;

        let window_len = WINDOW_SECS * SAMPLE_RATE;
        let mut segments = Vec::new();
        let mut texts = Vec::new();

        for (index, window) in samples.chunks(window_len).enumerate() {
            let text = model.transcribe_window(window, options.language.as_deref())?;
            if text.is_empty() {
                continue;
            }

            let start = (index * WINDOW_SECS) as f64;
            let end = start + window.len() as f64 / SAMPLE_RATE as f64;
            segments.push(TranscriptSegment {
                start,
                end,
                text: text.clone(),
            });
            texts.push(text);
        }

        Ok(Transcript {
            text: texts.join(" "),
            segments: options.include_timestamps.then_some(segments),
        })
    }
}

/// Decode an audio file into mono 16 kHz f32 samples.
///
/// Only WAV is decoded here; compressed codecs surface an engine error that
/// the relay maps to a 500.
fn read_audio_file(path: &Path) -> Result<Vec<f32>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    if extension != "wav" {
        return Err(anyhow!(
            "Cannot decode '{}' audio; only WAV input is supported by this engine",
            extension
        ));
    }

    let mut reader = hound::WavReader::open(path)
        .map_err(|e| anyhow!("Failed to open {}: {}", path.display(), e))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / i16::MAX as f32))
            .collect::<std::result::Result<_, _>>()?,
        (hound::SampleFormat::Int, bits) => {
            let scale = (1i64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()?
        }
        (hound::SampleFormat::Float, _) => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
    };

    let mono = mix_to_mono(&samples, spec.channels as usize);
    Ok(resample_linear(&mono, spec.sample_rate as usize, SAMPLE_RATE))
}

/// Average interleaved channels down to mono.
pub fn mix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Linear interpolation resampler.
pub fn resample_linear(samples: &[f32], from_rate: usize, to_rate: usize) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = (samples.len() as f64 / ratio).round() as usize;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let pos = i as f64 * ratio;
        let idx = pos as usize;
        let frac = (pos - idx as f64) as f32;
        let a = samples[idx.min(samples.len() - 1)];
        let b = samples[(idx + 1).min(samples.len() - 1)];
        out.push(a + (b - a) * frac);
    }

    out
}
