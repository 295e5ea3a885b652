//! evdev-based keyboard interception
//!
//! Grabs every keyboard device (EVIOCGRAB) so the kernel delivers its events
//! to us alone, then re-emits everything except the configured hotkeys through
//! a uinput virtual keyboard. To the rest of the system the keyboard behaves
//! normally, minus the suppressed keys. This works on all Wayland compositors
//! because it bypasses the display server entirely.
//!
//! A grabbed device that is never released leaves the user without a working
//! keyboard, so the grabs live in a guard that ungrabs on every exit path of
//! the polling loop, and `close()` does not return until that has happened.
//!
//! The user must be in the 'input' group to access /dev/input/* devices.

use super::{KeyCode, KeyEdge, KeySource};
use crate::config::HotkeyConfig;
use crate::error::HotkeyError;
use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, Device, EventType, InputEvent, InputEventKind, Key};
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};

/// evdev-based keyboard interception backend
pub struct EvdevSource {
    push_to_talk: Key,
    toggle: Key,
    device_paths: Vec<PathBuf>,
    /// Stop request; carries an ack sender so close() can wait for the
    /// grabs to actually be released
    stop_signal: Option<oneshot::Sender<oneshot::Sender<()>>>,
}

impl EvdevSource {
    pub fn new(config: &HotkeyConfig) -> Result<Self, HotkeyError> {
        let push_to_talk = parse_key(&config.push_to_talk)?;
        let toggle = parse_key(&config.toggle)?;
        if push_to_talk == toggle {
            return Err(HotkeyError::DuplicateKey(config.push_to_talk.clone()));
        }

        let device_paths = find_keyboard_devices()?;
        if device_paths.is_empty() {
            return Err(HotkeyError::NoKeyboard);
        }

        tracing::debug!(
            "Found {} keyboard device(s): {:?}",
            device_paths.len(),
            device_paths
        );

        Ok(Self {
            push_to_talk,
            toggle,
            device_paths,
            stop_signal: None,
        })
    }
}

#[async_trait::async_trait]
impl KeySource for EvdevSource {
    async fn start(&mut self) -> Result<mpsc::Receiver<KeyEdge>, HotkeyError> {
        let (tx, rx) = mpsc::channel(32);
        let (stop_tx, stop_rx) = oneshot::channel();
        self.stop_signal = Some(stop_tx);

        let push_to_talk = self.push_to_talk;
        let toggle = self.toggle;
        let device_paths = self.device_paths.clone();

        // Opening and grabbing happens on the blocking thread, but report
        // setup failures synchronously so startup errors reach the user.
        let (ready_tx, ready_rx) = oneshot::channel();
        tokio::task::spawn_blocking(move || {
            intercept_loop(device_paths, push_to_talk, toggle, tx, stop_rx, ready_tx);
        });

        match ready_rx.await {
            Ok(Ok(())) => Ok(rx),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(HotkeyError::DeviceUnavailable(
                "interception thread exited during setup".to_string(),
            )),
        }
    }

    async fn close(&mut self) -> Result<(), HotkeyError> {
        if let Some(stop) = self.stop_signal.take() {
            let (ack_tx, ack_rx) = oneshot::channel();
            if stop.send(ack_tx).is_ok() {
                // Wait for the loop to release its grabs before we return.
                match tokio::time::timeout(std::time::Duration::from_secs(2), ack_rx).await {
                    Ok(_) => tracing::debug!("Keyboard interception stopped"),
                    Err(_) => tracing::warn!("Timed out waiting for grab release"),
                }
            }
        }
        Ok(())
    }
}

impl Drop for EvdevSource {
    fn drop(&mut self) {
        // Last-resort stop for paths that never called close(); the loop's
        // guard still performs the actual ungrab.
        if let Some(stop) = self.stop_signal.take() {
            let (ack_tx, _ack_rx) = oneshot::channel();
            let _ = stop.send(ack_tx);
        }
    }
}

/// A set of grabbed keyboard devices. Ungrabs everything when dropped, which
/// covers every exit path of the polling loop, panics included.
struct GrabbedKeyboards {
    devices: Vec<(Device, bool)>,
}

impl GrabbedKeyboards {
    fn open(paths: &[PathBuf]) -> Result<Self, HotkeyError> {
        let mut devices = Vec::new();

        for path in paths {
            let mut device = match Device::open(path) {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!("Failed to open {:?}: {}", path, e);
                    continue;
                }
            };

            // Non-blocking so fetch_events returns immediately when idle
            let fd = device.as_raw_fd();
            unsafe {
                let flags = libc::fcntl(fd, libc::F_GETFL);
                if flags != -1 {
                    libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
                }
            }

            let grabbed = match device.grab() {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!("Could not grab {:?}: {}", path, e);
                    false
                }
            };

            devices.push((device, grabbed));
        }

        if devices.is_empty() {
            return Err(HotkeyError::NoKeyboard);
        }
        if !devices.iter().any(|(_, grabbed)| *grabbed) {
            tracing::warn!(
                "Could not grab any keyboard device; hotkeys will not be suppressed"
            );
        }

        Ok(Self { devices })
    }

    /// Union of key capabilities across all devices, for the virtual keyboard
    fn supported_keys(&self) -> AttributeSet<Key> {
        let mut keys = AttributeSet::<Key>::new();
        for (device, _) in &self.devices {
            if let Some(supported) = device.supported_keys() {
                for key in supported.iter() {
                    keys.insert(key);
                }
            }
        }
        keys
    }
}

impl Drop for GrabbedKeyboards {
    fn drop(&mut self) {
        for (device, grabbed) in &mut self.devices {
            if *grabbed {
                if let Err(e) = device.ungrab() {
                    tracing::error!("Failed to ungrab device: {}", e);
                }
            }
        }
        tracing::debug!("Keyboard grabs released");
    }
}

/// Main interception loop running in a blocking task
fn intercept_loop(
    device_paths: Vec<PathBuf>,
    push_to_talk: Key,
    toggle: Key,
    tx: mpsc::Sender<KeyEdge>,
    mut stop_rx: oneshot::Receiver<oneshot::Sender<()>>,
    ready_tx: oneshot::Sender<Result<(), HotkeyError>>,
) {
    let mut keyboards = match GrabbedKeyboards::open(&device_paths) {
        Ok(k) => k,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    let mut passthrough = match build_passthrough(&keyboards) {
        Ok(v) => v,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    let _ = ready_tx.send(Ok(()));

    tracing::info!(
        "Intercepting {:?} (push-to-talk) and {:?} (toggle)",
        push_to_talk,
        toggle
    );

    // Held-state per hotkey so repeats and duplicate edges collapse to
    // one pressed/released pair
    let mut ptt_down = false;
    let mut toggle_down = false;

    // Reused between iterations to avoid reallocating per batch
    let mut forward: Vec<InputEvent> = Vec::new();

    loop {
        match stop_rx.try_recv() {
            Ok(ack) => {
                drop(keyboards); // ungrab before acking
                let _ = ack.send(());
                return;
            }
            Err(oneshot::error::TryRecvError::Closed) => {
                tracing::debug!("Interception source dropped, stopping");
                return;
            }
            Err(oneshot::error::TryRecvError::Empty) => {}
        }

        for (device, grabbed) in &mut keyboards.devices {
            let events = match device.fetch_events() {
                Ok(events) => events,
                Err(_) => continue, // EAGAIN when idle
            };

            forward.clear();
            for event in events {
                if let InputEventKind::Key(key) = event.kind() {
                    if key == push_to_talk || key == toggle {
                        // Consumed: never forwarded. Repeats (value 2) and
                        // duplicate edges are swallowed too.
                        let held = if key == push_to_talk {
                            &mut ptt_down
                        } else {
                            &mut toggle_down
                        };
                        let edge = match event.value() {
                            1 if !*held => {
                                *held = true;
                                Some(true)
                            }
                            0 if *held => {
                                *held = false;
                                Some(false)
                            }
                            _ => None,
                        };
                        if let Some(pressed) = edge {
                            let edge = KeyEdge {
                                key: KeyCode(key.code()),
                                pressed,
                                at: Instant::now(),
                            };
                            if tx.blocking_send(edge).is_err() {
                                return; // channel closed; guard ungrabs
                            }
                        }
                        continue;
                    }
                }

                // Everything else is re-emitted in original order. Only
                // grabbed devices need re-emission; ungrabbed ones still
                // deliver to the OS themselves. SYN events are skipped
                // because emit() writes its own SYN_REPORT per batch.
                if *grabbed && event.event_type() != EventType::SYNCHRONIZATION {
                    forward.push(event);
                }
            }

            if !forward.is_empty() {
                if let Err(e) = passthrough.emit(&forward) {
                    tracing::warn!("Passthrough emit failed: {}", e);
                }
            }
        }

        // Small sleep to avoid busy-waiting
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
}

/// Build the uinput virtual keyboard used to re-emit non-hotkey events
fn build_passthrough(keyboards: &GrabbedKeyboards) -> Result<VirtualDevice, HotkeyError> {
    let keys = keyboards.supported_keys();
    let device = VirtualDeviceBuilder::new()
        .map_err(|e| HotkeyError::DeviceUnavailable(format!("uinput: {}", e)))?
        .name("talki-passthrough")
        .with_keys(&keys)
        .map_err(|e| HotkeyError::DeviceUnavailable(format!("uinput: {}", e)))?
        .build()
        .map_err(|e| HotkeyError::DeviceUnavailable(format!("uinput: {}", e)))?;
    Ok(device)
}

/// Find all keyboard input devices
fn find_keyboard_devices() -> Result<Vec<PathBuf>, HotkeyError> {
    let mut keyboards = Vec::new();

    let input_dir = std::fs::read_dir("/dev/input")
        .map_err(|e| HotkeyError::DeviceUnavailable(format!("/dev/input: {}", e)))?;

    for entry in input_dir {
        let entry = entry.map_err(|e| HotkeyError::DeviceUnavailable(e.to_string()))?;
        let path = entry.path();

        let is_event_device = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with("event"))
            .unwrap_or(false);
        if !is_event_device {
            continue;
        }

        match Device::open(&path) {
            Ok(device) => {
                // A keyboard should have at least the letter rows and Enter
                let has_keys = device
                    .supported_keys()
                    .map(|keys| {
                        keys.contains(Key::KEY_A)
                            && keys.contains(Key::KEY_Z)
                            && keys.contains(Key::KEY_ENTER)
                    })
                    .unwrap_or(false);

                if has_keys {
                    tracing::debug!(
                        "Found keyboard: {:?} ({:?})",
                        path,
                        device.name().unwrap_or("unknown")
                    );
                    keyboards.push(path);
                }
            }
            Err(e) => {
                if e.kind() == std::io::ErrorKind::PermissionDenied {
                    return Err(HotkeyError::PermissionDenied(path.display().to_string()));
                }
                // Device busy etc. - just skip
                tracing::trace!("Skipping {:?}: {}", path, e);
            }
        }
    }

    Ok(keyboards)
}

/// Parse a key name string to a platform-neutral key code
pub fn parse_key_name(name: &str) -> Result<KeyCode, HotkeyError> {
    parse_key(name).map(|key| KeyCode(key.code()))
}

/// Parse a key name string to an evdev Key
fn parse_key(name: &str) -> Result<Key, HotkeyError> {
    // Normalize: uppercase and replace - or space with _
    let normalized: String = name
        .chars()
        .map(|c| match c {
            '-' | ' ' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect();

    let key_name = if normalized.starts_with("KEY_") {
        normalized
    } else {
        format!("KEY_{}", normalized)
    };

    let key = match key_name.as_str() {
        // Function keys (the defaults; F13-F24 are often unused too)
        "KEY_F1" => Key::KEY_F1,
        "KEY_F2" => Key::KEY_F2,
        "KEY_F3" => Key::KEY_F3,
        "KEY_F4" => Key::KEY_F4,
        "KEY_F5" => Key::KEY_F5,
        "KEY_F6" => Key::KEY_F6,
        "KEY_F7" => Key::KEY_F7,
        "KEY_F8" => Key::KEY_F8,
        "KEY_F9" => Key::KEY_F9,
        "KEY_F10" => Key::KEY_F10,
        "KEY_F11" => Key::KEY_F11,
        "KEY_F12" => Key::KEY_F12,
        "KEY_F13" => Key::KEY_F13,
        "KEY_F14" => Key::KEY_F14,
        "KEY_F15" => Key::KEY_F15,
        "KEY_F16" => Key::KEY_F16,
        "KEY_F17" => Key::KEY_F17,
        "KEY_F18" => Key::KEY_F18,
        "KEY_F19" => Key::KEY_F19,
        "KEY_F20" => Key::KEY_F20,
        "KEY_F21" => Key::KEY_F21,
        "KEY_F22" => Key::KEY_F22,
        "KEY_F23" => Key::KEY_F23,
        "KEY_F24" => Key::KEY_F24,

        // Lock keys (good hotkey candidates)
        "KEY_SCROLLLOCK" => Key::KEY_SCROLLLOCK,
        "KEY_PAUSE" => Key::KEY_PAUSE,
        "KEY_CAPSLOCK" | "KEY_CAPS_LOCK" => Key::KEY_CAPSLOCK,
        "KEY_NUMLOCK" => Key::KEY_NUMLOCK,
        "KEY_INSERT" => Key::KEY_INSERT,

        // Modifier keys
        "KEY_LEFTALT" | "KEY_LALT" | "KEY_ALT" => Key::KEY_LEFTALT,
        "KEY_RIGHTALT" | "KEY_RALT" => Key::KEY_RIGHTALT,
        "KEY_LEFTCTRL" | "KEY_LCTRL" | "KEY_CTRL" => Key::KEY_LEFTCTRL,
        "KEY_RIGHTCTRL" | "KEY_RCTRL" => Key::KEY_RIGHTCTRL,
        "KEY_LEFTSHIFT" | "KEY_LSHIFT" | "KEY_SHIFT" => Key::KEY_LEFTSHIFT,
        "KEY_RIGHTSHIFT" | "KEY_RSHIFT" => Key::KEY_RIGHTSHIFT,
        "KEY_LEFTMETA" | "KEY_LMETA" | "KEY_SUPER" => Key::KEY_LEFTMETA,
        "KEY_RIGHTMETA" | "KEY_RMETA" => Key::KEY_RIGHTMETA,

        // Navigation keys
        "KEY_HOME" => Key::KEY_HOME,
        "KEY_END" => Key::KEY_END,
        "KEY_PAGEUP" => Key::KEY_PAGEUP,
        "KEY_PAGEDOWN" => Key::KEY_PAGEDOWN,
        "KEY_DELETE" => Key::KEY_DELETE,

        // Common keys
        "KEY_SPACE" => Key::KEY_SPACE,
        "KEY_ENTER" | "KEY_RETURN" => Key::KEY_ENTER,
        "KEY_TAB" => Key::KEY_TAB,
        "KEY_BACKSPACE" => Key::KEY_BACKSPACE,
        "KEY_ESC" | "KEY_ESCAPE" => Key::KEY_ESC,
        "KEY_GRAVE" | "KEY_BACKTICK" => Key::KEY_GRAVE,

        _ => {
            return Err(HotkeyError::UnknownKey(format!(
                "{}. Try: F9, F10, SCROLLLOCK, PAUSE, F13-F24, or run 'evtest' to find key names",
                name
            )));
        }
    };

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_name() {
        assert_eq!(parse_key("F9").unwrap(), Key::KEY_F9);
        assert_eq!(parse_key("f10").unwrap(), Key::KEY_F10);
        assert_eq!(parse_key("ScrollLock").unwrap(), Key::KEY_SCROLLLOCK);
        assert_eq!(parse_key("KEY_SCROLLLOCK").unwrap(), Key::KEY_SCROLLLOCK);
        assert_eq!(parse_key("caps lock").unwrap(), Key::KEY_CAPSLOCK);
        assert_eq!(parse_key("LALT").unwrap(), Key::KEY_LEFTALT);
    }

    #[test]
    fn test_parse_key_name_error() {
        assert!(parse_key("INVALID_KEY_NAME").is_err());
    }

    #[test]
    fn test_duplicate_hotkeys_rejected() {
        let config = HotkeyConfig {
            push_to_talk: "F9".to_string(),
            toggle: "f9".to_string(),
        };
        assert!(matches!(
            super::super::resolve_keys(&config),
            Err(HotkeyError::DuplicateKey(_))
        ));
    }
}
