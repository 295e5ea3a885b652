//! Clipboard-based text injection
//!
//! Pastes appended text via wl-copy + a synthesized Ctrl+V, which sidesteps
//! keyboard layout issues and handles arbitrary Unicode. Deletions still need
//! backspace synthesis - pasting can only add text - so this backend keeps a
//! small uinput device for backspaces and the paste chord.
//!
//! The previous clipboard contents are saved with wl-paste before the paste
//! and restored afterwards, best-effort: a failed restore is logged and the
//! session carries on.
//!
//! Requires wl-clipboard (wl-copy / wl-paste).

use super::{Edit, Injector};
use crate::error::InjectError;
use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, EventType, InputEvent, Key};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Settle time after setting the clipboard, before pasting. Wayland
/// compositors need a beat to pick up the new selection.
const CLIPBOARD_SETTLE: Duration = Duration::from_millis(100);

/// Settle time after the paste chord, before restoring the clipboard, so the
/// focused application has requested the data by then.
const PASTE_SETTLE: Duration = Duration::from_millis(150);

/// Clipboard-based injection backend
pub struct ClipboardInjector {
    device: VirtualDevice,
    restore_clipboard: bool,
}

impl ClipboardInjector {
    pub fn new(restore_clipboard: bool) -> Result<Self, InjectError> {
        let mut keys = AttributeSet::<Key>::new();
        keys.insert(Key::KEY_BACKSPACE);
        keys.insert(Key::KEY_LEFTCTRL);
        keys.insert(Key::KEY_V);

        let device = VirtualDeviceBuilder::new()
            .map_err(|e| InjectError::Synthesis(format!("uinput: {}", e)))?
            .name("talki-paste")
            .with_keys(&keys)
            .map_err(|e| InjectError::Synthesis(format!("uinput: {}", e)))?
            .build()
            .map_err(|e| InjectError::Synthesis(format!("uinput: {}", e)))?;

        Ok(Self {
            device,
            restore_clipboard,
        })
    }

    fn emit_backspaces(&mut self, count: usize) -> Result<(), InjectError> {
        for _ in 0..count {
            let events = [
                key_event(Key::KEY_BACKSPACE, 1),
                key_event(Key::KEY_BACKSPACE, 0),
            ];
            self.device
                .emit(&events)
                .map_err(|e| InjectError::Synthesis(e.to_string()))?;
        }
        Ok(())
    }

    fn emit_paste_chord(&mut self) -> Result<(), InjectError> {
        let events = [
            key_event(Key::KEY_LEFTCTRL, 1),
            key_event(Key::KEY_V, 1),
            key_event(Key::KEY_V, 0),
            key_event(Key::KEY_LEFTCTRL, 0),
        ];
        self.device
            .emit(&events)
            .map_err(|e| InjectError::Synthesis(e.to_string()))?;
        Ok(())
    }

    /// Read the current clipboard contents, if any
    async fn read_clipboard() -> Option<String> {
        let output = Command::new("wl-paste")
            .arg("--no-newline")
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .await
            .ok()?;

        if output.status.success() {
            String::from_utf8(output.stdout).ok()
        } else {
            // Empty clipboard exits non-zero; nothing to restore
            None
        }
    }

    /// Copy text to the clipboard using wl-copy
    async fn write_clipboard(text: &str) -> Result<(), InjectError> {
        let mut child = Command::new("wl-copy")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    InjectError::WlCopyNotFound
                } else {
                    InjectError::ClipboardWrite(e.to_string())
                }
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .await
                .map_err(|e| InjectError::ClipboardWrite(e.to_string()))?;
            drop(stdin);
        }

        let status = child
            .wait()
            .await
            .map_err(|e| InjectError::ClipboardWrite(e.to_string()))?;

        if !status.success() {
            return Err(InjectError::ClipboardWrite(
                "wl-copy exited with error".to_string(),
            ));
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl Injector for ClipboardInjector {
    async fn apply(&mut self, edit: &Edit) -> Result<(), InjectError> {
        if edit.is_noop() {
            return Ok(());
        }

        self.emit_backspaces(edit.delete)?;

        if edit.append.is_empty() {
            return Ok(());
        }

        let saved = if self.restore_clipboard {
            Self::read_clipboard().await
        } else {
            None
        };

        Self::write_clipboard(&edit.append).await?;
        tokio::time::sleep(CLIPBOARD_SETTLE).await;

        self.emit_paste_chord()?;
        tokio::time::sleep(PASTE_SETTLE).await;

        if let Some(previous) = saved {
            if let Err(e) = Self::write_clipboard(&previous).await {
                tracing::warn!(
                    "{}",
                    InjectError::ClipboardRestoreFailed(e.to_string())
                );
            }
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "clipboard (wl-copy + Ctrl+V)"
    }
}

fn key_event(key: Key, value: i32) -> InputEvent {
    InputEvent::new(EventType::KEY, key.code(), value)
}
