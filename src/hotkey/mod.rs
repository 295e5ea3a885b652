//! Hotkey interception module
//!
//! On Linux, grabs keyboard devices via evdev so the configured hotkeys never
//! reach other applications, and re-emits every other key through a uinput
//! virtual keyboard. This works on all Wayland compositors because it
//! operates at the Linux input subsystem level.
//!
//! Linux: Requires the user to be in the 'input' group.

#[cfg(target_os = "linux")]
pub mod evdev_source;

use crate::config::HotkeyConfig;
use crate::error::HotkeyError;
use std::time::Instant;
use tokio::sync::mpsc;

/// Platform-neutral key identifier (Linux input event code numbering)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyCode(pub u16);

/// A single press or release edge on a suppressed hotkey
#[derive(Debug, Clone, Copy)]
pub struct KeyEdge {
    pub key: KeyCode,
    pub pressed: bool,
    pub at: Instant,
}

/// How the active recording session was started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordMode {
    /// Record while the push-to-talk key is held
    HoldToTalk,
    /// Record between two presses of the toggle key
    Toggle,
}

/// Session-level command emitted by the hotkey state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    StartRecording(RecordMode),
    StopRecording,
}

/// Trait for platform keyboard interception backends
///
/// `start` acquires exclusive access to the keyboard devices and begins
/// delivering edges for the suppressed hotkeys. `close` releases every grab;
/// it must be called on every exit path, because a device left grabbed takes
/// the user's keyboard with it.
#[async_trait::async_trait]
pub trait KeySource: Send {
    /// Start intercepting; returns a channel of hotkey edges
    async fn start(&mut self) -> Result<mpsc::Receiver<KeyEdge>, HotkeyError>;

    /// Stop intercepting and release all device grabs. Returns once the
    /// grabs are actually released, so it is safe to exit afterwards.
    async fn close(&mut self) -> Result<(), HotkeyError>;
}

/// Resolve the configured key names to key codes
#[cfg(target_os = "linux")]
pub fn resolve_keys(config: &HotkeyConfig) -> Result<(KeyCode, KeyCode), HotkeyError> {
    let ptt = evdev_source::parse_key_name(&config.push_to_talk)?;
    let toggle = evdev_source::parse_key_name(&config.toggle)?;
    if ptt == toggle {
        return Err(HotkeyError::DuplicateKey(config.push_to_talk.clone()));
    }
    Ok((ptt, toggle))
}

#[cfg(not(target_os = "linux"))]
pub fn resolve_keys(_config: &HotkeyConfig) -> Result<(KeyCode, KeyCode), HotkeyError> {
    Err(HotkeyError::NotSupported(
        "only the Linux evdev backend is implemented".to_string(),
    ))
}

/// Factory function to create the platform keyboard interception backend
#[cfg(target_os = "linux")]
pub fn create_source(config: &HotkeyConfig) -> Result<Box<dyn KeySource>, HotkeyError> {
    Ok(Box::new(evdev_source::EvdevSource::new(config)?))
}

#[cfg(not(target_os = "linux"))]
pub fn create_source(_config: &HotkeyConfig) -> Result<Box<dyn KeySource>, HotkeyError> {
    Err(HotkeyError::NotSupported(
        "only the Linux evdev backend is implemented".to_string(),
    ))
}

/// State machine turning raw hotkey edges into session commands.
///
/// At most one recording session is ever active: while recording in one mode,
/// edges on the other mode's key are ignored, as are toggle releases and (in
/// toggle mode) push-to-talk releases.
#[derive(Debug)]
pub struct HotkeyMachine {
    push_to_talk: KeyCode,
    toggle: KeyCode,
    state: MachineState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MachineState {
    Idle,
    Recording(RecordMode),
}

impl HotkeyMachine {
    pub fn new(push_to_talk: KeyCode, toggle: KeyCode) -> Self {
        Self {
            push_to_talk,
            toggle,
            state: MachineState::Idle,
        }
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, MachineState::Recording(_))
    }

    /// Feed one edge through the machine
    pub fn on_edge(&mut self, edge: &KeyEdge) -> Option<SessionCommand> {
        match self.state {
            MachineState::Idle => {
                if edge.key == self.push_to_talk && edge.pressed {
                    self.state = MachineState::Recording(RecordMode::HoldToTalk);
                    return Some(SessionCommand::StartRecording(RecordMode::HoldToTalk));
                }
                if edge.key == self.toggle && edge.pressed {
                    self.state = MachineState::Recording(RecordMode::Toggle);
                    return Some(SessionCommand::StartRecording(RecordMode::Toggle));
                }
                None
            }
            MachineState::Recording(RecordMode::HoldToTalk) => {
                if edge.key == self.push_to_talk && !edge.pressed {
                    self.state = MachineState::Idle;
                    return Some(SessionCommand::StopRecording);
                }
                None
            }
            MachineState::Recording(RecordMode::Toggle) => {
                if edge.key == self.toggle && edge.pressed {
                    self.state = MachineState::Idle;
                    return Some(SessionCommand::StopRecording);
                }
                None
            }
        }
    }

    /// Force the machine back to idle (process shutdown while recording)
    pub fn force_stop(&mut self) -> Option<SessionCommand> {
        if self.is_recording() {
            self.state = MachineState::Idle;
            Some(SessionCommand::StopRecording)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PTT: KeyCode = KeyCode(67); // KEY_F9
    const TOGGLE: KeyCode = KeyCode(68); // KEY_F10
    const OTHER: KeyCode = KeyCode(30); // KEY_A

    fn edge(key: KeyCode, pressed: bool) -> KeyEdge {
        KeyEdge {
            key,
            pressed,
            at: Instant::now(),
        }
    }

    #[test]
    fn test_push_to_talk_cycle() {
        let mut m = HotkeyMachine::new(PTT, TOGGLE);
        assert_eq!(
            m.on_edge(&edge(PTT, true)),
            Some(SessionCommand::StartRecording(RecordMode::HoldToTalk))
        );
        assert!(m.is_recording());
        assert_eq!(
            m.on_edge(&edge(PTT, false)),
            Some(SessionCommand::StopRecording)
        );
        assert!(!m.is_recording());
    }

    #[test]
    fn test_toggle_cycle() {
        let mut m = HotkeyMachine::new(PTT, TOGGLE);
        assert_eq!(
            m.on_edge(&edge(TOGGLE, true)),
            Some(SessionCommand::StartRecording(RecordMode::Toggle))
        );
        // Releasing the toggle key does not stop the session
        assert_eq!(m.on_edge(&edge(TOGGLE, false)), None);
        assert!(m.is_recording());
        assert_eq!(
            m.on_edge(&edge(TOGGLE, true)),
            Some(SessionCommand::StopRecording)
        );
        assert!(!m.is_recording());
    }

    #[test]
    fn test_no_nested_sessions() {
        let mut m = HotkeyMachine::new(PTT, TOGGLE);
        assert!(m.on_edge(&edge(PTT, true)).is_some());
        // Toggle edges are ignored while a hold-to-talk session is active
        assert_eq!(m.on_edge(&edge(TOGGLE, true)), None);
        assert_eq!(m.on_edge(&edge(TOGGLE, false)), None);
        assert!(m.is_recording());
        assert_eq!(
            m.on_edge(&edge(PTT, false)),
            Some(SessionCommand::StopRecording)
        );
    }

    #[test]
    fn test_ptt_ignored_during_toggle_session() {
        let mut m = HotkeyMachine::new(PTT, TOGGLE);
        assert!(m.on_edge(&edge(TOGGLE, true)).is_some());
        assert_eq!(m.on_edge(&edge(PTT, true)), None);
        assert_eq!(m.on_edge(&edge(PTT, false)), None);
        assert!(m.is_recording());
        assert_eq!(
            m.on_edge(&edge(TOGGLE, true)),
            Some(SessionCommand::StopRecording)
        );
    }

    #[test]
    fn test_unrelated_keys_ignored() {
        let mut m = HotkeyMachine::new(PTT, TOGGLE);
        assert_eq!(m.on_edge(&edge(OTHER, true)), None);
        assert_eq!(m.on_edge(&edge(OTHER, false)), None);
        assert!(!m.is_recording());
    }

    #[test]
    fn test_every_start_stops_exactly_once() {
        // Arbitrary edge soup: each StartRecording is matched by exactly one
        // StopRecording and sessions never overlap.
        let mut m = HotkeyMachine::new(PTT, TOGGLE);
        let script = [
            (PTT, true),
            (OTHER, true),
            (TOGGLE, true),
            (PTT, false),
            (PTT, true),
            (TOGGLE, true),
            (PTT, false),
            (TOGGLE, true),
            (TOGGLE, false),
            (TOGGLE, true),
        ];

        let mut active = false;
        let mut starts = 0;
        let mut stops = 0;
        for (key, pressed) in script {
            match m.on_edge(&edge(key, pressed)) {
                Some(SessionCommand::StartRecording(_)) => {
                    assert!(!active, "session started while another was active");
                    active = true;
                    starts += 1;
                }
                Some(SessionCommand::StopRecording) => {
                    assert!(active, "stop without a matching start");
                    active = false;
                    stops += 1;
                }
                None => {}
            }
        }
        assert_eq!(starts, 3);
        assert_eq!(stops, 3);
        assert!(!active);
    }

    #[test]
    fn test_force_stop() {
        let mut m = HotkeyMachine::new(PTT, TOGGLE);
        assert_eq!(m.force_stop(), None);
        m.on_edge(&edge(TOGGLE, true));
        assert_eq!(m.force_stop(), Some(SessionCommand::StopRecording));
        assert!(!m.is_recording());
    }
}
