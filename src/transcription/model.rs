//! # Whisper Model
//!
//! Loading and decoding for Whisper checkpoints via Candle. Checkpoints are
//! fetched from the HuggingFace hub (cached locally) and executed greedily,
//! one 30-second audio window per call.

use anyhow::{anyhow, Result};
use candle_core::{Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::whisper::{self as m, Config};
use tokenizers::Tokenizer;

/// Available Whisper model sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ModelSize {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
}

impl ModelSize {
    /// HuggingFace repository holding this checkpoint.
    pub fn repo_name(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "openai/whisper-tiny",
            ModelSize::Base => "openai/whisper-base",
            ModelSize::Small => "openai/whisper-small",
            ModelSize::Medium => "openai/whisper-medium",
            ModelSize::Large => "openai/whisper-large-v2",
        }
    }
}

impl std::str::FromStr for ModelSize {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "tiny" => Ok(ModelSize::Tiny),
            "base" => Ok(ModelSize::Base),
            "small" => Ok(ModelSize::Small),
            "medium" => Ok(ModelSize::Medium),
            "large" => Ok(ModelSize::Large),
            _ => Err(anyhow!("Unknown model size: {}", s)),
        }
    }
}

impl std::fmt::Display for ModelSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ModelSize::Tiny => "tiny",
            ModelSize::Base => "base",
            ModelSize::Small => "small",
            ModelSize::Medium => "medium",
            ModelSize::Large => "large",
        };
        write!(f, "{}", name)
    }
}

/// Upper bound on generated tokens per 30-second window.
const MAX_DECODE_TOKENS: usize = 224;

/// A loaded Whisper checkpoint ready for transcription.
pub struct WhisperModel {
    model: m::model::Whisper,
    config: Config,
    device: Device,
    tokenizer: Tokenizer,
    mel_filters: Vec<f32>,
    sot_token: u32,
    eot_token: u32,
    transcribe_token: u32,
    no_timestamps_token: u32,
}

impl WhisperModel {
    /// Download (cached) and load the checkpoint for `size`.
    pub fn load(size: ModelSize, device: Device) -> Result<Self> {
        tracing::info!("Loading Whisper {} model", size);
        let start_time = std::time::Instant::now();

        let api = hf_hub::api::sync::Api::new()?;
        let repo = api.model(size.repo_name().to_string());

        let config_file = repo.get("config.json").map_err(|e| {
            anyhow!("Failed to download config.json from {}: {}", size.repo_name(), e)
        })?;
        let tokenizer_file = repo.get("tokenizer.json").map_err(|e| {
            anyhow!(
                "Failed to download tokenizer.json from {}: {}",
                size.repo_name(),
                e
            )
        })?;
        let weights_file = repo.get("model.safetensors").map_err(|e| {
            anyhow!(
                "Failed to download model.safetensors from {}: {}",
                size.repo_name(),
                e
            )
        })?;

        let config: Config = serde_json::from_reader(std::fs::File::open(config_file)?)?;
        let tokenizer = Tokenizer::from_file(tokenizer_file)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;

        let mel_filters = build_mel_filter_bank(config.num_mel_bins);

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_file], m::DTYPE, &device)?
        };
        let model = m::model::Whisper::load(&vb, config.clone())?;

        let sot_token = special_token(&tokenizer, "<|startoftranscript|>")?;
        let eot_token = special_token(&tokenizer, "<|endoftext|>")?;
        let transcribe_token = special_token(&tokenizer, "<|transcribe|>")?;
        let no_timestamps_token = special_token(&tokenizer, "<|notimestamps|>")?;

        tracing::info!(
            "Whisper {} model loaded in {:.2}s",
            size,
            start_time.elapsed().as_secs_f64()
        );

        Ok(Self {
            model,
            config,
            device,
            tokenizer,
            mel_filters,
            sot_token,
            eot_token,
            transcribe_token,
            no_timestamps_token,
        })
    }

    /// Transcribe one window of mono 16 kHz PCM (at most 30 seconds).
    ///
    /// With no language hint the model picks the language itself from the
    /// first decoded token.
    pub fn transcribe_window(&mut self, samples: &[f32], language: Option<&str>) -> Result<String> {
        if samples.is_empty() {
            return Ok(String::new());
        }

        let mel = m::audio::pcm_to_mel(&self.config, samples, &self.mel_filters);
        let mel_len = mel.len();
        let n_mels = self.config.num_mel_bins;
        let mel = Tensor::from_vec(mel, (1, n_mels, mel_len / n_mels), &self.device)?;

        let features = self.model.encoder.forward(&mel, true)?;

        let mut tokens: Vec<u32> = vec![self.sot_token];
        if let Some(lang) = language {
            if let Some(id) = self.tokenizer.token_to_id(&format!("<|{}|>", lang)) {
                tokens.push(id);
            } else {
                tracing::warn!("No Whisper language token for '{}', auto-detecting", lang);
            }
        }
        tokens.push(self.transcribe_token);
        tokens.push(self.no_timestamps_token);
        let prompt_len = tokens.len();

        for _ in 0..MAX_DECODE_TOKENS {
            let input = Tensor::new(tokens.as_slice(), &self.device)?.unsqueeze(0)?;
            // Full recompute per step: the KV cache is flushed each call,
            // trading speed for a decode loop with no cache bookkeeping.
            let hidden = self.model.decoder.forward(&input, &features, true)?;
            let logits = self.model.decoder.final_linear(&hidden)?;
            let (_, seq_len, _) = logits.dims3()?;
            let last = logits.i((0, seq_len - 1))?;

            let next = greedy_token(&last)?;
            if next == self.eot_token {
                break;
            }
            tokens.push(next);
        }

        let text = self
            .tokenizer
            .decode(&tokens[prompt_len..], true)
            .map_err(|e| anyhow!("Tokenizer decode error: {}", e))?;
        Ok(text.trim().to_string())
    }
}

fn special_token(tokenizer: &Tokenizer, token: &str) -> Result<u32> {
    tokenizer
        .token_to_id(token)
        .ok_or_else(|| anyhow!("Tokenizer has no token {}", token))
}

fn greedy_token(logits: &Tensor) -> Result<u32> {
    let values = logits.to_vec1::<f32>()?;
    values
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(idx, _)| idx as u32)
        .ok_or_else(|| anyhow!("Empty logits"))
}

/// Triangular mel filter bank for the spectrogram frontend.
///
/// `n_fft` is fixed at 400 (the Whisper STFT size at 16 kHz), giving 201
/// frequency bins per filter.
fn build_mel_filter_bank(n_mels: usize) -> Vec<f32> {
    const N_BINS: usize = 201;
    let mut filters = vec![0.0f32; n_mels * N_BINS];

    for mel in 0..n_mels {
        let center = (mel + 1) * N_BINS / (n_mels + 1);
        let width = (N_BINS / (n_mels + 1)).max(1);

        for bin in 0..N_BINS {
            if bin >= center.saturating_sub(width) && bin <= center + width {
                let distance = (bin as i64 - center as i64).unsigned_abs() as f32;
                filters[mel * N_BINS + bin] = (1.0 - distance / width as f32).max(0.0);
            }
        }
    }

    filters
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_size_parsing() {
        assert_eq!("tiny".parse::<ModelSize>().unwrap(), ModelSize::Tiny);
        assert_eq!("MEDIUM".parse::<ModelSize>().unwrap(), ModelSize::Medium);
        assert!("invalid".parse::<ModelSize>().is_err());
    }

    #[test]
    fn test_model_size_round_trip() {
        for size in [
            ModelSize::Tiny,
            ModelSize::Base,
            ModelSize::Small,
            ModelSize::Medium,
            ModelSize::Large,
        ] {
            assert_eq!(size.to_string().parse::<ModelSize>().unwrap(), size);
        }
    }

    #[test]
    fn test_mel_filter_bank_shape() {
        let filters = build_mel_filter_bank(80);
        assert_eq!(filters.len(), 80 * 201);
        // Every filter carries some energy.
        for mel in 0..80 {
            let sum: f32 = filters[mel * 201..(mel + 1) * 201].iter().sum();
            assert!(sum > 0.0, "filter {} is empty", mel);
        }
    }
}
