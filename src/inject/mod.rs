//! Text injection module
//!
//! Applies transcript edits to whatever application has input focus, via one
//! of two backends:
//! - keystroke: synthesizes backspaces and one keystroke per character
//!   through uinput (US layout)
//! - clipboard: synthesizes backspaces, then pastes the appended text with
//!   clipboard + Ctrl+V, restoring the previous clipboard afterwards
//!
//! Edits for a session are applied strictly in arrival order: a single
//! consumer task pulls them off a queue one at a time, so ordering comes from
//! the queue discipline rather than a lock.

pub mod diff;

#[cfg(target_os = "linux")]
pub mod clipboard;
#[cfg(target_os = "linux")]
pub mod keystroke;

use crate::config::{InjectConfig, InjectMode};
use crate::error::InjectError;
pub use diff::{Edit, StabilityDiff};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Trait for text injection backends
#[async_trait::async_trait]
pub trait Injector: Send {
    /// Apply one edit to the focused application.
    ///
    /// Empty edits must be a complete no-op. Characters that cannot be
    /// synthesized are skipped, not fatal; the rest of the edit still lands.
    async fn apply(&mut self, edit: &Edit) -> Result<(), InjectError>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Factory function to create the configured injection backend
#[cfg(target_os = "linux")]
pub fn create_injector(config: &InjectConfig) -> Result<Box<dyn Injector>, InjectError> {
    match config.mode {
        InjectMode::Direct => Ok(Box::new(keystroke::KeystrokeInjector::new()?)),
        InjectMode::Clipboard => Ok(Box::new(clipboard::ClipboardInjector::new(
            config.restore_clipboard,
        )?)),
    }
}

#[cfg(not(target_os = "linux"))]
pub fn create_injector(_config: &InjectConfig) -> Result<Box<dyn Injector>, InjectError> {
    Err(InjectError::NotSupported(
        "only the Linux uinput backend is implemented".to_string(),
    ))
}

/// Spawn the single-consumer task that applies queued edits in order.
///
/// Exactly one edit is in flight at a time; the next one waits. Closing the
/// returned sender drains the queue and ends the task.
pub fn spawn_edit_writer(
    mut injector: Box<dyn Injector>,
) -> (mpsc::Sender<Edit>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<Edit>(32);

    let handle = tokio::spawn(async move {
        while let Some(edit) = rx.recv().await {
            if edit.is_noop() {
                continue;
            }
            tracing::debug!(
                "Applying edit via {}: delete {}, append {:?}",
                injector.name(),
                edit.delete,
                edit.append
            );
            if let Err(e) = injector.apply(&edit).await {
                // The session continues; the next hypothesis re-reconciles
                tracing::error!("Edit failed: {}", e);
            }
        }
        tracing::debug!("Edit writer stopped");
    });

    (tx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Injector that records edits into a shared string
    struct RecordingInjector {
        text: Arc<Mutex<String>>,
        applied: Arc<Mutex<Vec<Edit>>>,
    }

    #[async_trait::async_trait]
    impl Injector for RecordingInjector {
        async fn apply(&mut self, edit: &Edit) -> Result<(), InjectError> {
            let mut text = self.text.lock().unwrap();
            let keep = text.chars().count() - edit.delete;
            let byte_keep = text
                .char_indices()
                .nth(keep)
                .map(|(i, _)| i)
                .unwrap_or(text.len());
            text.truncate(byte_keep);
            text.push_str(&edit.append);
            self.applied.lock().unwrap().push(edit.clone());
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    #[tokio::test]
    async fn test_edit_writer_applies_in_order_and_skips_noops() {
        let text = Arc::new(Mutex::new(String::new()));
        let applied = Arc::new(Mutex::new(Vec::new()));
        let injector = Box::new(RecordingInjector {
            text: text.clone(),
            applied: applied.clone(),
        });

        let (tx, handle) = spawn_edit_writer(injector);

        let edits = [
            Edit { delete: 0, append: "hello".to_string() },
            Edit::none(),
            Edit { delete: 1, append: "y".to_string() },
            Edit { delete: 0, append: " there".to_string() },
        ];
        for edit in &edits {
            tx.send(edit.clone()).await.unwrap();
        }
        drop(tx);
        handle.await.unwrap();

        assert_eq!(*text.lock().unwrap(), "helly there");
        // The no-op never reached the backend
        assert_eq!(applied.lock().unwrap().len(), 3);
    }
}
