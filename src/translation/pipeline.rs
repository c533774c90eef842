//! # Translation Pipelines
//!
//! The `TranslationPipeline` trait is the seam between request orchestration
//! and model inference. The production implementation wraps a Marian
//! encoder-decoder checkpoint (the Helsinki-NLP `opus-mt-*` family) loaded
//! through the HuggingFace hub and executed with Candle.

use crate::translation::registry::LanguagePair;
use anyhow::{anyhow, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::marian;
use std::sync::Mutex;
use tokenizers::Tokenizer;

/// A loaded model that can translate one text segment at a time.
///
/// Implementations must be shareable across request handlers; the Marian
/// implementation serializes access internally because decoding mutates the
/// KV cache.
pub trait TranslationPipeline: Send + Sync {
    fn translate(&self, text: &str) -> Result<String>;
}

/// Marian machine-translation pipeline backed by Candle.
pub struct MarianTranslator {
    pair: LanguagePair,
    model: Mutex<marian::MTModel>,
    tokenizer: Tokenizer,
    device: Device,
    max_positions: usize,
    decoder_start_token: u32,
    eos_token: u32,
    forced_eos_token: u32,
}

impl MarianTranslator {
    /// Download and load the `Helsinki-NLP/opus-mt-{src}-{tgt}` checkpoint
    /// for the given pair. Files are cached by the hub client, so repeated
    /// startups only hit the network once.
    pub fn load(pair: LanguagePair, device: Device) -> Result<Self> {
        let repo_name = format!("Helsinki-NLP/opus-mt-{}-{}", pair.source, pair.target);
        tracing::info!("Loading translation model {}", repo_name);
        let start_time = std::time::Instant::now();

        let api = hf_hub::api::sync::Api::new()?;
        let repo = api.model(repo_name.clone());

        let config_file = repo
            .get("config.json")
            .map_err(|e| anyhow!("Failed to download config.json from {}: {}", repo_name, e))?;
        let tokenizer_file = repo
            .get("tokenizer.json")
            .map_err(|e| anyhow!("Failed to download tokenizer.json from {}: {}", repo_name, e))?;
        let weights_file = repo.get("model.safetensors").map_err(|e| {
            anyhow!(
                "Failed to download model.safetensors from {}: {}",
                repo_name,
                e
            )
        })?;

        let config: marian::Config =
            serde_json::from_reader(std::fs::File::open(config_file)?)?;
        let tokenizer = Tokenizer::from_file(tokenizer_file)
            .map_err(|e| anyhow!("Failed to load tokenizer for {}: {}", repo_name, e))?;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_file], DType::F32, &device)?
        };
        let model = marian::MTModel::new(&config, vb)?;

        tracing::info!(
            "Translation model {} loaded in {:.2}s",
            repo_name,
            start_time.elapsed().as_secs_f64()
        );

        Ok(Self {
            pair,
            model: Mutex::new(model),
            tokenizer,
            device,
            max_positions: config.max_position_embeddings,
            decoder_start_token: config.decoder_start_token_id as u32,
            eos_token: config.eos_token_id as u32,
            forced_eos_token: config.forced_eos_token_id as u32,
        })
    }

    pub fn pair(&self) -> &LanguagePair {
        &self.pair
    }

    fn greedy_token(logits: &Tensor) -> Result<u32> {
        let values = logits.to_vec1::<f32>()?;
        let next = values
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(idx, _)| idx as u32)
            .ok_or_else(|| anyhow!("Empty logits"))?;
        Ok(next)
    }
}

impl TranslationPipeline for MarianTranslator {
    fn translate(&self, text: &str) -> Result<String> {
        let mut model = self
            .model
            .lock()
            .map_err(|_| anyhow!("Translation model lock poisoned"))?;
        model.reset_kv_cache();

        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow!("Tokenizer error: {}", e))?;
        let mut tokens = encoding.get_ids().to_vec();

        // Truncate to the positional window, keeping room for the EOS token.
        if tokens.len() + 1 > self.max_positions {
            tokens.truncate(self.max_positions - 1);
        }
        tokens.push(self.eos_token);

        let input = Tensor::new(tokens.as_slice(), &self.device)?.unsqueeze(0)?;
        let encoder_xs = model.encoder().forward(&input, 0)?;

        let mut token_ids = vec![self.decoder_start_token];
        for index in 0..self.max_positions {
            // After the first step only the newest token is fed; earlier
            // positions are served from the KV cache.
            let context_size = if index >= 1 { 1 } else { token_ids.len() };
            let start_pos = token_ids.len().saturating_sub(context_size);
            let input_ids =
                Tensor::new(&token_ids[start_pos..], &self.device)?.unsqueeze(0)?;

            let logits = model.decode(&input_ids, &encoder_xs, start_pos)?;
            let logits = logits.squeeze(0)?;
            let last = logits.get(logits.dim(0)? - 1)?;

            let next = Self::greedy_token(&last)?;
            if next == self.eos_token || next == self.forced_eos_token {
                break;
            }
            token_ids.push(next);
        }

        let translation = self
            .tokenizer
            .decode(&token_ids[1..], true)
            .map_err(|e| anyhow!("Tokenizer decode error: {}", e))?;
        Ok(translation.trim().to_string())
    }
}
