//! # Translation
//!
//! Text translation through pre-trained Marian sequence-to-sequence models.
//!
//! The module splits into three pieces:
//! - `pipeline`: the inference seam (`TranslationPipeline`) and its
//!   Candle-backed Marian implementation
//! - `registry`: the immutable language-pair → pipeline map built at startup
//! - `dispatcher`: request orchestration (segment chunking, ordering,
//!   fail-fast error policy)

pub mod dispatcher;
pub mod pipeline;
pub mod registry;

pub use dispatcher::TranslationDispatcher;
pub use pipeline::{MarianTranslator, TranslationPipeline};
pub use registry::{LanguagePair, TranslatorRegistry};
