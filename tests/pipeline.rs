//! End-to-end pipeline test: scripted recognizer results flow through the
//! scheduler and stability diff into a mock injector, and the mock's text
//! must converge to the recognizer's final transcript.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use talki::audio::SessionBuffer;
use talki::error::{InjectError, TranscribeError};
use talki::inject::{spawn_edit_writer, Edit, Injector, StabilityDiff};
use talki::transcribe::{scheduler::TranscribeScheduler, Hypothesis, Transcriber};
use tokio::sync::mpsc;

/// Recognizer that replays a fixed script of partial hypotheses, then a
/// final one.
struct ScriptedTranscriber {
    partials: Vec<&'static str>,
    final_text: &'static str,
    calls: AtomicUsize,
}

impl Transcriber for ScriptedTranscriber {
    fn transcribe(&self, _samples: &[f32], want_final: bool) -> Result<Hypothesis, TranscribeError> {
        if want_final {
            return Ok(Hypothesis::final_(self.final_text));
        }
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let text = self.partials[n.min(self.partials.len() - 1)];
        Ok(Hypothesis::partial(text))
    }
}

/// Injector that applies edits to an in-memory string, standing in for the
/// focused application's input field.
struct FieldInjector {
    field: Arc<Mutex<String>>,
    edits_applied: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl Injector for FieldInjector {
    async fn apply(&mut self, edit: &Edit) -> Result<(), InjectError> {
        let mut field = self.field.lock().unwrap();
        let keep = field.chars().count() - edit.delete;
        let byte_keep = field
            .char_indices()
            .nth(keep)
            .map(|(i, _)| i)
            .unwrap_or(field.len());
        field.truncate(byte_keep);
        field.push_str(&edit.append);
        self.edits_applied.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "field"
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scheduled_hypotheses_converge_on_final_transcript() {
    let transcriber = Arc::new(ScriptedTranscriber {
        partials: vec!["he", "hello", "hello there"],
        final_text: "hello there, friend.",
        calls: AtomicUsize::new(0),
    });

    let buffer = SessionBuffer::new();
    buffer.append(&vec![0.0; 16000]); // 1s of audio, above the minimum

    let field = Arc::new(Mutex::new(String::new()));
    let edits_applied = Arc::new(AtomicUsize::new(0));
    let (edit_tx, writer) = spawn_edit_writer(Box::new(FieldInjector {
        field: field.clone(),
        edits_applied: edits_applied.clone(),
    }));

    let (hyp_tx, mut hyp_rx) = mpsc::channel(8);
    let scheduler = TranscribeScheduler::spawn(
        transcriber,
        buffer,
        Duration::from_millis(300),
        hyp_tx,
    );

    // Consume hypotheses the way the daemon does: diff, then queue the edit
    let mut diff = StabilityDiff::new();
    let consume = async {
        while let Some(hyp) = hyp_rx.recv().await {
            let edit = diff.reconcile(&hyp);
            if !edit.is_noop() {
                edit_tx.send(edit).await.unwrap();
            }
        }
    };

    // Let three partial passes land, then stop the session
    let stop = async {
        tokio::time::sleep(Duration::from_millis(1100)).await;
        scheduler.finish().await;
    };
    tokio::join!(consume, stop);

    assert!(diff.is_sealed(), "final hypothesis must seal the session");

    drop(edit_tx);
    writer.await.unwrap();

    // The mock field ends up showing exactly the final transcript
    assert_eq!(*field.lock().unwrap(), "hello there, friend.");
    assert!(edits_applied.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn repeated_hypotheses_cost_no_injector_calls() {
    let field = Arc::new(Mutex::new(String::new()));
    let edits_applied = Arc::new(AtomicUsize::new(0));
    let (edit_tx, writer) = spawn_edit_writer(Box::new(FieldInjector {
        field: field.clone(),
        edits_applied: edits_applied.clone(),
    }));

    let mut diff = StabilityDiff::new();
    for _ in 0..5 {
        let edit = diff.reconcile(&Hypothesis::partial("steady text"));
        if !edit.is_noop() {
            edit_tx.send(edit).await.unwrap();
        }
    }

    drop(edit_tx);
    writer.await.unwrap();

    assert_eq!(*field.lock().unwrap(), "steady text");
    // Four repeats after the first reconcile were all no-ops
    assert_eq!(edits_applied.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn correction_rewrites_only_the_unstable_tail() {
    let field = Arc::new(Mutex::new(String::new()));
    let edits_applied = Arc::new(AtomicUsize::new(0));
    let (edit_tx, writer) = spawn_edit_writer(Box::new(FieldInjector {
        field: field.clone(),
        edits_applied: edits_applied.clone(),
    }));

    let mut diff = StabilityDiff::new();
    for text in ["I want", "I went to", "I went to the store"] {
        let edit = diff.reconcile(&Hypothesis::partial(text));
        if !edit.is_noop() {
            edit_tx.send(edit).await.unwrap();
        }
    }

    drop(edit_tx);
    writer.await.unwrap();

    assert_eq!(*field.lock().unwrap(), "I went to the store");
}
