//! Talki: hold-to-talk dictation with live text injection
//!
//! This library provides the core functionality for:
//! - Intercepting the push-to-talk/toggle hotkeys at the kernel level (evdev
//!   grab) while passing every other key through untouched (uinput re-emission)
//! - Capturing audio via cpal (supports PipeWire, PulseAudio, ALSA)
//! - Re-transcribing the growing recording on a timer using whisper.cpp
//! - Reconciling each new transcript with what has already been typed and
//!   injecting only the difference (backspaces + new text)
//!
//! # Architecture
//!
//! ```text
//!          ┌──────────────┐   key edges    ┌──────────────┐
//!          │  KeySource   │ ─────────────▶ │HotkeyMachine │
//!          │ (evdev grab) │  (suppressed)  │ Idle⇄Record  │
//!          └──────────────┘                └──────────────┘
//!                 │ passthrough                    │ start/stop
//!                 ▼                                ▼
//!          [uinput virtual kbd]          ┌─────────────────────┐
//!                                        │       Daemon        │
//!                                        │ (session controller)│
//!                                        └─────────────────────┘
//!                                          │                │
//!                          audio samples   ▼                ▼  every tick
//!          ┌──────────────┐         ┌─────────────┐   ┌────────────┐
//!          │ AudioCapture │ ──────▶ │SessionBuffer│──▶│ Scheduler  │
//!          │    (cpal)    │         │ (snapshot)  │   │ (whisper)  │
//!          └──────────────┘         └─────────────┘   └────────────┘
//!                                                           │ hypotheses
//!                                                           ▼
//!                                                    ┌─────────────┐
//!                                                    │StabilityDiff│
//!                                                    │ (LCP edits) │
//!                                                    └─────────────┘
//!                                                           │ edits (ordered)
//!                                                           ▼
//!                                                    ┌─────────────┐
//!                                                    │  Injector   │
//!                                                    │ keys/paste  │
//!                                                    └─────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod daemon;
pub mod error;
pub mod hotkey;
pub mod inject;
pub mod state;
pub mod transcribe;

pub use config::Config;
pub use daemon::Daemon;
pub use error::{Result, TalkiError};
