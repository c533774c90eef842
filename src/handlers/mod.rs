//! # HTTP Handlers
//!
//! One module per endpoint group: text translation, file transcription,
//! recording-session control, the log feed, and the static frontend pages.

pub mod logs;
pub mod pages;
pub mod record;
pub mod transcribe;
pub mod translate;
