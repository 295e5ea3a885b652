//! Incremental transcription scheduler
//!
//! While a recording session is active, re-transcribes the entire accumulated
//! audio on a fixed interval. Whole-buffer re-transcription (rather than
//! transcribing only the new tail) is what lets the model revise earlier words
//! as more context arrives.
//!
//! At most one inference call runs at a time: a tick that fires while the
//! previous call is still running is skipped outright - no queueing, no
//! cancellation - which bounds inference load and keeps hypothesis delivery
//! in submission order. Stopping the session cancels the timer, waits for any
//! in-flight call, then runs one last pass with `want_final` set.

use super::{Hypothesis, Transcriber};
use crate::audio::SessionBuffer;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Snapshots shorter than this are not worth submitting; they produce
/// hallucinated fragments from accidental key taps.
const MIN_SNAPSHOT_SECS: f32 = 0.3;

/// Handle to a running scheduler task
pub struct TranscribeScheduler {
    stop_tx: Option<oneshot::Sender<()>>,
    done_rx: Option<oneshot::Receiver<()>>,
}

impl TranscribeScheduler {
    /// Start the repeating transcription timer for one session.
    ///
    /// Hypotheses are delivered on `hyp_tx` in submission order. The channel
    /// closes after the final hypothesis.
    pub fn spawn(
        transcriber: Arc<dyn Transcriber>,
        buffer: SessionBuffer,
        interval: Duration,
        hyp_tx: mpsc::Sender<Hypothesis>,
    ) -> Self {
        let (stop_tx, stop_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();

        tokio::spawn(scheduler_loop(
            transcriber,
            buffer,
            interval,
            hyp_tx,
            stop_rx,
            done_tx,
        ));

        Self {
            stop_tx: Some(stop_tx),
            done_rx: Some(done_rx),
        }
    }

    /// Stop the timer, let any in-flight inference finish, run the final
    /// pass, and return once its hypothesis has been delivered.
    pub async fn finish(mut self) {
        if let Some(stop) = self.stop_tx.take() {
            let _ = stop.send(());
        }
        if let Some(done) = self.done_rx.take() {
            let _ = done.await;
        }
    }
}

async fn scheduler_loop(
    transcriber: Arc<dyn Transcriber>,
    buffer: SessionBuffer,
    interval: Duration,
    hyp_tx: mpsc::Sender<Hypothesis>,
    mut stop_rx: oneshot::Receiver<()>,
    done_tx: oneshot::Sender<()>,
) {
    // First submission happens one interval after the session starts
    let mut ticker =
        tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut in_flight: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            _ = &mut stop_rx => break,
            _ = ticker.tick() => {
                if in_flight.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
                    tracing::trace!("Inference still running, skipping this tick");
                    continue;
                }
                in_flight = None;

                if buffer.duration_secs() < MIN_SNAPSHOT_SECS {
                    continue;
                }

                let snapshot = buffer.snapshot();
                let transcriber = transcriber.clone();
                let tx = hyp_tx.clone();
                in_flight = Some(tokio::task::spawn_blocking(move || {
                    match transcriber.transcribe(&snapshot, false) {
                        Ok(hyp) => {
                            let _ = tx.blocking_send(hyp);
                        }
                        Err(e) => {
                            // Recovered locally: this tick produces no edit,
                            // the next tick retries on a longer snapshot
                            tracing::warn!("Inference failed, retrying next tick: {}", e);
                        }
                    }
                }));
            }
        }
    }

    // An in-flight partial still gets delivered; waiting for it also keeps
    // the final hypothesis last in the channel.
    if let Some(handle) = in_flight.take() {
        let _ = handle.await;
    }

    if buffer.duration_secs() >= MIN_SNAPSHOT_SECS {
        let snapshot = buffer.snapshot();
        let final_transcriber = transcriber.clone();
        match tokio::task::spawn_blocking(move || final_transcriber.transcribe(&snapshot, true))
            .await
        {
            Ok(Ok(hyp)) => {
                let _ = hyp_tx.send(hyp).await;
            }
            Ok(Err(e)) => tracing::warn!("Final transcription pass failed: {}", e),
            Err(e) => tracing::warn!("Final transcription task panicked: {}", e),
        }
    } else {
        tracing::debug!(
            "Recording too short ({:.2}s), skipping final pass",
            buffer.duration_secs()
        );
    }

    let _ = done_tx.send(());
}
