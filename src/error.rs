//! Error types for talki
//!
//! Uses thiserror for ergonomic error definitions with clear messages
//! that guide users toward fixing common issues.

use thiserror::Error;

/// Top-level error type for the talki application
#[derive(Error, Debug)]
pub enum TalkiError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Hotkey error: {0}")]
    Hotkey(#[from] HotkeyError),

    #[error("Audio capture error: {0}")]
    Audio(#[from] AudioError),

    #[error("Transcription error: {0}")]
    Transcribe(#[from] TranscribeError),

    #[error("Injection error: {0}")]
    Inject(#[from] InjectError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to keyboard interception
#[derive(Error, Debug)]
pub enum HotkeyError {
    #[error("Permission denied opening '{0}'. Is the user in the 'input' group?\n  Run: sudo usermod -aG input $USER\n  Then log out and back in.")]
    PermissionDenied(String),

    #[error("Input device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Unknown key name: '{0}'. Use evtest or wev to find valid key names.")]
    UnknownKey(String),

    #[error("Push-to-talk and toggle keys must be different (both set to '{0}')")]
    DuplicateKey(String),

    #[error("No keyboard device found in /dev/input/")]
    NoKeyboard,

    #[error("evdev error: {0}")]
    Evdev(String),

    #[error("Keyboard interception is not supported on this platform: {0}")]
    NotSupported(String),
}

/// Errors related to audio capture
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Audio connection failed: {0}")]
    Connection(String),

    #[error("Audio device not found: '{0}'. List devices with: pactl list sources short")]
    DeviceNotFound(String),

    #[error("Audio stream error: {0}")]
    StreamError(String),
}

/// Errors related to speech-to-text transcription
#[derive(Error, Debug)]
pub enum TranscribeError {
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Whisper initialization failed: {0}")]
    InitFailed(String),

    #[error("Transcription failed: {0}")]
    InferenceFailed(String),

    #[error("Audio format error: {0}")]
    AudioFormat(String),
}

/// Errors related to text injection
#[derive(Error, Debug)]
pub enum InjectError {
    #[error("No keystroke mapping for character {0:?} (non-US layout?)")]
    UnmappableCharacter(char),

    #[error("Keystroke synthesis failed: {0}")]
    Synthesis(String),

    #[error("wl-copy not found in PATH. Install wl-clipboard via your package manager.")]
    WlCopyNotFound,

    #[error("Clipboard write failed: {0}")]
    ClipboardWrite(String),

    #[error("Clipboard restore failed: {0}")]
    ClipboardRestoreFailed(String),

    #[error("Text injection is not supported on this platform: {0}")]
    NotSupported(String),
}

/// Result type alias using TalkiError
pub type Result<T> = std::result::Result<T, TalkiError>;

#[cfg(target_os = "linux")]
impl From<evdev::Error> for HotkeyError {
    fn from(e: evdev::Error) -> Self {
        HotkeyError::Evdev(e.to_string())
    }
}

#[cfg(target_os = "linux")]
impl From<evdev::Error> for InjectError {
    fn from(e: evdev::Error) -> Self {
        InjectError::Synthesis(e.to_string())
    }
}
