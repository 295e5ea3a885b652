//! Daemon module - main event loop orchestration
//!
//! Owns the session lifecycle: turns hotkey commands into recording sessions,
//! wires each session's audio buffer to the transcription scheduler, runs
//! every hypothesis through the stability diff, and serializes the resulting
//! edits through the single injector queue.
//!
//! Shutdown discipline: whatever path ends the loop (SIGINT, SIGTERM, error),
//! any active session is flushed first and the keyboard grabs are released
//! synchronously before run() returns. The process must never exit with a
//! device still grabbed.

use crate::audio::{self, AudioCapture};
use crate::config::Config;
use crate::error::Result;
use crate::hotkey::{self, HotkeyMachine, RecordMode, SessionCommand};
use crate::inject::{self, Edit, StabilityDiff};
use crate::state::Session;
use crate::transcribe::{self, scheduler::TranscribeScheduler, Hypothesis, Transcriber};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;

/// Everything owned by one active recording session
struct ActiveSession {
    session: Session,
    capture: Box<dyn AudioCapture>,
    scheduler: TranscribeScheduler,
    diff: StabilityDiff,
}

/// Main daemon that orchestrates all components
pub struct Daemon {
    config: Config,
}

impl Daemon {
    /// Create a new daemon with the given configuration
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the daemon main loop
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!("Starting talki daemon");

        // Keyboard discovery happens here, before the injector's uinput
        // devices exist, so they can never be mistaken for real keyboards
        // and grabbed.
        let (ptt_code, toggle_code) = hotkey::resolve_keys(&self.config.hotkey)?;
        let mut machine = HotkeyMachine::new(ptt_code, toggle_code);
        let mut source = hotkey::create_source(&self.config.hotkey)?;

        let transcriber = transcribe::create_transcriber(&self.config.whisper)?;

        let injector = inject::create_injector(&self.config.inject)?;
        tracing::info!("Injection backend: {}", injector.name());
        let (edit_tx, edit_writer) = inject::spawn_edit_writer(injector);

        let mut sigterm = signal(SignalKind::terminate()).map_err(|e| {
            crate::error::TalkiError::Config(format!("Failed to set up SIGTERM handler: {}", e))
        })?;

        let mut edges = source.start().await?;

        let mut active: Option<ActiveSession> = None;
        let mut hyp_rx: Option<mpsc::Receiver<Hypothesis>> = None;

        let max_duration = Duration::from_secs(self.config.audio.max_duration_secs as u64);
        let interval = self.config.transcribe_interval();

        tracing::info!(
            "Ready. Hold [{}] to speak, or press [{}] to toggle recording.",
            self.config.hotkey.push_to_talk,
            self.config.hotkey.toggle
        );

        // Main event loop
        loop {
            tokio::select! {
                // Hotkey edges drive the session state machine
                edge = edges.recv() => {
                    let Some(edge) = edge else {
                        tracing::error!("Keyboard interception stopped unexpectedly");
                        break;
                    };
                    match machine.on_edge(&edge) {
                        Some(SessionCommand::StartRecording(mode)) => {
                            match self.start_session(mode, transcriber.clone(), interval).await {
                                Ok((session, rx)) => {
                                    active = Some(session);
                                    hyp_rx = Some(rx);
                                }
                                Err(e) => {
                                    tracing::error!("Failed to start recording: {}", e);
                                    let _ = machine.force_stop();
                                }
                            }
                        }
                        Some(SessionCommand::StopRecording) => {
                            stop_session(&mut active, &mut hyp_rx, &edit_tx).await;
                        }
                        None => {}
                    }
                }

                // Hypotheses from the scheduler become edits, in arrival order
                maybe_hyp = async {
                    match hyp_rx.as_mut() {
                        Some(rx) => rx.recv().await,
                        None => std::future::pending().await,
                    }
                } => {
                    match maybe_hyp {
                        Some(hyp) => {
                            if let Some(ref mut session) = active {
                                reconcile_and_send(&mut session.diff, &hyp, &edit_tx).await;
                            }
                        }
                        // Scheduler ended on its own; stop polling its channel
                        None => hyp_rx = None,
                    }
                }

                // Safety stop for runaway sessions
                _ = tokio::time::sleep(Duration::from_millis(100)), if active.is_some() => {
                    let over_limit = active
                        .as_ref()
                        .map(|s| s.session.duration() > max_duration)
                        .unwrap_or(false);
                    if over_limit {
                        tracing::warn!(
                            "Recording timeout ({:.0}s limit), stopping",
                            max_duration.as_secs_f32()
                        );
                        let _ = machine.force_stop();
                        stop_session(&mut active, &mut hyp_rx, &edit_tx).await;
                    }
                }

                // Handle graceful shutdown (SIGINT from Ctrl+C)
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received SIGINT, shutting down...");
                    break;
                }

                // Handle graceful shutdown (SIGTERM from systemctl stop)
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, shutting down...");
                    break;
                }
            }
        }

        // A session interrupted by shutdown still gets its final flush
        if machine.force_stop().is_some() {
            stop_session(&mut active, &mut hyp_rx, &edit_tx).await;
        }

        // Release the keyboard before anything else can go wrong; close()
        // returns only once the grabs are gone
        source.close().await?;

        drop(edit_tx);
        let _ = edit_writer.await;

        tracing::info!("Daemon stopped");

        Ok(())
    }

    /// Create a session: fresh buffer, audio capture, transcription timer
    async fn start_session(
        &self,
        mode: RecordMode,
        transcriber: Arc<dyn Transcriber>,
        interval: Duration,
    ) -> Result<(ActiveSession, mpsc::Receiver<Hypothesis>)> {
        let session = Session::new(mode);

        let mut capture = audio::create_capture(&self.config.audio)?;
        capture.start(session.buffer.clone()).await?;

        let (hyp_tx, hyp_rx) = mpsc::channel(8);
        let scheduler = TranscribeScheduler::spawn(
            transcriber,
            session.buffer.clone(),
            interval,
            hyp_tx,
        );

        tracing::info!("Recording started ({:?})", mode);

        Ok((
            ActiveSession {
                session,
                capture,
                scheduler,
                diff: StabilityDiff::new(),
            },
            hyp_rx,
        ))
    }
}

/// Run a hypothesis through the diff and queue the resulting edit
async fn reconcile_and_send(
    diff: &mut StabilityDiff,
    hypothesis: &Hypothesis,
    edit_tx: &mpsc::Sender<Edit>,
) {
    let edit = diff.reconcile(hypothesis);
    if edit.is_noop() {
        return;
    }
    if edit_tx.send(edit).await.is_err() {
        tracing::error!("Edit writer is gone; dropping edit");
    }
}

/// Tear down the active session: stop capture, cancel the timer, let the
/// final flush finish, and apply whatever hypotheses are still pending.
async fn stop_session(
    active: &mut Option<ActiveSession>,
    hyp_rx: &mut Option<mpsc::Receiver<Hypothesis>>,
    edit_tx: &mpsc::Sender<Edit>,
) {
    let Some(mut session) = active.take() else {
        return;
    };
    let rx = hyp_rx.take();

    tracing::info!("Recording stopped ({})", session.session);

    if let Err(e) = session.capture.stop().await {
        tracing::warn!("Audio capture stop failed: {}", e);
    }

    // The timer stops now; an in-flight pass completes, then the final pass
    // runs. Pending hypotheses fit in the channel, so awaiting here is safe.
    session.scheduler.finish().await;

    if let Some(mut rx) = rx {
        while let Some(hyp) = rx.recv().await {
            reconcile_and_send(&mut session.diff, &hyp, edit_tx).await;
        }
    }

    if !session.diff.injected_text().is_empty() {
        tracing::info!("Session text: {:?}", session.diff.injected_text());
    }
}
