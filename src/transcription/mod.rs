//! # Transcription
//!
//! Speech-to-text behind the `SpeechToText` seam. The HTTP relay and the
//! recording worker both talk to the engine through this trait, which also
//! lets tests substitute a stub engine.

pub mod engine;
pub mod model;

pub use engine::WhisperEngine;
pub use model::ModelSize;

use serde::Serialize;
use std::path::Path;

/// Options accompanying one transcription request.
#[derive(Debug, Clone)]
pub struct TranscribeOptions {
    pub model: ModelSize,
    /// ISO 639-1 language hint; `None` means auto-detect.
    pub language: Option<String>,
    pub include_timestamps: bool,
}

/// A timestamped portion of a transcript, in seconds from the start of the
/// audio.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// The result of transcribing one piece of audio.
#[derive(Debug, Clone, Serialize)]
pub struct Transcript {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<TranscriptSegment>>,
}

impl Transcript {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            segments: None,
        }
    }
}

/// Speech-to-text engine seam.
///
/// Both entry points block for the duration of inference; callers are
/// expected to run them on the blocking thread pool.
pub trait SpeechToText: Send + Sync {
    /// Transcribe an audio file on disk.
    fn transcribe_file(&self, path: &Path, options: &TranscribeOptions) -> anyhow::Result<Transcript>;

    /// Transcribe raw mono PCM samples at 16 kHz.
    fn transcribe_pcm(&self, samples: &[f32], options: &TranscribeOptions) -> anyhow::Result<Transcript>;
}
