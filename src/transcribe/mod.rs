//! Speech-to-text transcription module
//!
//! Provides transcription via local whisper.cpp inference (whisper-rs crate).
//! The engine is treated as a pure function from an audio snapshot to a
//! [`Hypothesis`]; each call is independent, so the scheduler is free to call
//! it repeatedly on a growing buffer.

pub mod scheduler;
pub mod whisper;

use crate::config::WhisperConfig;
use crate::error::TranscribeError;
use std::sync::Arc;

/// One transcription result for an audio snapshot.
///
/// A partial hypothesis may be revised by the next one; a final hypothesis
/// ends the stream of results for its recording session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hypothesis {
    pub text: String,
    pub is_final: bool,
}

impl Hypothesis {
    pub fn partial(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }

    pub fn final_(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }
}

/// Trait for speech-to-text implementations
///
/// Input: f32 samples, mono, 16kHz. `want_final` requests best quality at the
/// cost of latency; implementations may decode more carefully for it.
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, samples: &[f32], want_final: bool) -> Result<Hypothesis, TranscribeError>;
}

/// Factory function to create the configured transcriber
pub fn create_transcriber(config: &WhisperConfig) -> Result<Arc<dyn Transcriber>, TranscribeError> {
    tracing::info!("Loading transcription model: {}", config.model);
    Ok(Arc::new(whisper::WhisperTranscriber::new(config)?))
}
