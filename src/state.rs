//! Recording session state
//!
//! Exactly one session may be active at a time. A session owns the audio it
//! accumulates; it is created on StartRecording and destroyed after the final
//! transcription flush.

use crate::audio::SessionBuffer;
use crate::hotkey::RecordMode;
use std::time::{Duration, Instant};

/// One recording session
#[derive(Clone)]
pub struct Session {
    /// How the session was started (decides which hotkey stops it)
    pub mode: RecordMode,
    /// When recording started
    pub started_at: Instant,
    /// Audio accumulated so far
    pub buffer: SessionBuffer,
}

impl Session {
    pub fn new(mode: RecordMode) -> Self {
        Self {
            mode,
            started_at: Instant::now(),
            buffer: SessionBuffer::new(),
        }
    }

    pub fn duration(&self) -> Duration {
        self.started_at.elapsed()
    }
}

impl std::fmt::Display for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match self.mode {
            RecordMode::HoldToTalk => "hold-to-talk",
            RecordMode::Toggle => "toggle",
        };
        write!(
            f,
            "recording ({}, {:.1}s, {:.1}s of audio)",
            mode,
            self.duration().as_secs_f32(),
            self.buffer.duration_secs()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_empty() {
        let session = Session::new(RecordMode::HoldToTalk);
        assert!(session.buffer.is_empty());
        assert_eq!(session.mode, RecordMode::HoldToTalk);
    }

    #[test]
    fn test_session_display() {
        let session = Session::new(RecordMode::Toggle);
        let display = format!("{}", session);
        assert!(display.contains("toggle"));
        assert!(display.starts_with("recording"));
    }
}
