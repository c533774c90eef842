//! # Translator Registry
//!
//! Maps language pairs to loaded translation pipelines. The registry is
//! populated once during startup from the configured pair list and shared
//! immutably afterwards, so concurrent request handlers can read it without
//! any locking.

use crate::translation::pipeline::TranslationPipeline;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// A source/target language pair, e.g. `en-es`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LanguagePair {
    pub source: String,
    pub target: String,
}

impl LanguagePair {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

impl FromStr for LanguagePair {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('-') {
            Some((source, target)) if !source.is_empty() && !target.is_empty() => {
                Ok(Self::new(source, target))
            }
            _ => Err(anyhow!("Invalid language pair: {}", s)),
        }
    }
}

impl fmt::Display for LanguagePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.source, self.target)
    }
}

/// Immutable map from language pair to loaded pipeline.
pub struct TranslatorRegistry {
    pipelines: HashMap<LanguagePair, Box<dyn TranslationPipeline>>,
}

impl TranslatorRegistry {
    pub fn new() -> Self {
        Self {
            pipelines: HashMap::new(),
        }
    }

    /// Register a pipeline for a pair. Only called during startup, before
    /// the registry is shared.
    pub fn insert(&mut self, pair: LanguagePair, pipeline: Box<dyn TranslationPipeline>) {
        self.pipelines.insert(pair, pipeline);
    }

    pub fn get(&self, pair: &LanguagePair) -> Option<&dyn TranslationPipeline> {
        self.pipelines.get(pair).map(|p| p.as_ref())
    }

    pub fn contains(&self, pair: &LanguagePair) -> bool {
        self.pipelines.contains_key(pair)
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

impl Default for TranslatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
