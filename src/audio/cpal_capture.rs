//! cpal-based audio capture
//!
//! Uses the cpal crate for cross-platform audio input. Works with PipeWire,
//! PulseAudio, and ALSA backends.
//!
//! Note: cpal::Stream is not Send, so the stream lives on a dedicated thread
//! and we communicate via channels. The capture callback downmixes to mono,
//! resamples to the target rate, and appends into the session buffer.

use super::{resample, AudioCapture, SessionBuffer};
use crate::config::AudioConfig;
use crate::error::AudioError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::thread;
use tokio::sync::oneshot;

/// Commands sent to the audio capture thread
enum CaptureCommand {
    Stop(oneshot::Sender<()>),
}

/// cpal-based audio capture implementation
pub struct CpalCapture {
    config: AudioConfig,
    cmd_tx: Option<std::sync::mpsc::Sender<CaptureCommand>>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl CpalCapture {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            config: config.clone(),
            cmd_tx: None,
            thread_handle: None,
        }
    }
}

/// Find an audio input device by name.
///
/// Tries an exact match first, then a case-insensitive substring match, so
/// users can give either a full cpal device name or a short PipeWire name.
fn find_audio_device(host: &cpal::Host, device_name: &str) -> Result<cpal::Device, AudioError> {
    let devices: Vec<cpal::Device> = host
        .input_devices()
        .map_err(|e| AudioError::Connection(e.to_string()))?
        .collect();

    let search_lower = device_name.to_lowercase();

    for device in devices {
        if let Ok(name) = device.name() {
            if name == device_name || name.to_lowercase().contains(&search_lower) {
                tracing::debug!("Found audio device: {}", name);
                return Ok(device);
            }
        }
    }

    Err(AudioError::DeviceNotFound(device_name.to_string()))
}

#[async_trait::async_trait]
impl AudioCapture for CpalCapture {
    async fn start(&mut self, sink: SessionBuffer) -> Result<(), AudioError> {
        let host = cpal::default_host();

        let device = if self.config.device == "default" {
            host.default_input_device()
                .ok_or_else(|| AudioError::DeviceNotFound("default".to_string()))?
        } else {
            find_audio_device(&host, &self.config.device)?
        };

        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
        tracing::info!("Using audio device: {}", device_name);

        let supported_config = device
            .default_input_config()
            .map_err(|e| AudioError::Connection(e.to_string()))?;

        let source_sample_rate = supported_config.sample_rate().0;
        let source_channels = supported_config.channels() as usize;
        let target_sample_rate = self.config.sample_rate;
        let sample_format = supported_config.sample_format();

        tracing::debug!(
            "Device config: {} Hz, {} channel(s), format: {:?}",
            source_sample_rate,
            source_channels,
            sample_format
        );

        let (cmd_tx, cmd_rx) = std::sync::mpsc::channel::<CaptureCommand>();
        // Surface stream build errors from the capture thread synchronously
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), AudioError>>();

        let thread_handle = thread::spawn(move || {
            let stream_config = cpal::StreamConfig {
                channels: supported_config.channels(),
                sample_rate: supported_config.sample_rate(),
                buffer_size: cpal::BufferSize::Default,
            };

            let err_fn = |err| tracing::error!("Audio stream error: {}", err);

            let stream_result = match sample_format {
                cpal::SampleFormat::F32 => build_stream::<f32>(
                    &device,
                    &stream_config,
                    sink,
                    source_sample_rate,
                    target_sample_rate,
                    source_channels,
                    err_fn,
                ),
                cpal::SampleFormat::I16 => build_stream::<i16>(
                    &device,
                    &stream_config,
                    sink,
                    source_sample_rate,
                    target_sample_rate,
                    source_channels,
                    err_fn,
                ),
                cpal::SampleFormat::U16 => build_stream::<u16>(
                    &device,
                    &stream_config,
                    sink,
                    source_sample_rate,
                    target_sample_rate,
                    source_channels,
                    err_fn,
                ),
                format => Err(AudioError::StreamError(format!(
                    "Unsupported sample format: {:?}",
                    format
                ))),
            };

            let stream = match stream_result {
                Ok(s) => s,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                return;
            }

            let _ = ready_tx.send(Ok(()));
            tracing::debug!("Audio capture thread started");

            // Hold the stream until told to stop
            if let Ok(CaptureCommand::Stop(ack_tx)) = cmd_rx.recv() {
                drop(stream);
                let _ = ack_tx.send(());
            }

            tracing::debug!("Audio capture thread stopped");
        });

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread_handle.join();
                return Err(e);
            }
            Err(_) => {
                return Err(AudioError::StreamError(
                    "capture thread exited during setup".to_string(),
                ))
            }
        }

        self.cmd_tx = Some(cmd_tx);
        self.thread_handle = Some(thread_handle);

        Ok(())
    }

    async fn stop(&mut self) -> Result<(), AudioError> {
        if let Some(cmd_tx) = self.cmd_tx.take() {
            let (ack_tx, ack_rx) = oneshot::channel();
            if cmd_tx.send(CaptureCommand::Stop(ack_tx)).is_ok() {
                let _ = tokio::time::timeout(std::time::Duration::from_secs(2), ack_rx).await;
            }
        }

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }

        Ok(())
    }
}

/// Build an input stream for a specific sample type
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sink: SessionBuffer,
    source_rate: u32,
    target_rate: u32,
    source_channels: usize,
    err_fn: impl Fn(cpal::StreamError) + Send + 'static,
) -> Result<cpal::Stream, AudioError>
where
    T: cpal::Sample + cpal::SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                // Convert to f32 and mix to mono
                let mono_f32: Vec<f32> = data
                    .chunks(source_channels)
                    .map(|frame| {
                        let sum: f32 = frame
                            .iter()
                            .map(|&s| <f32 as cpal::FromSample<T>>::from_sample_(s))
                            .sum();
                        sum / source_channels as f32
                    })
                    .collect();

                let resampled = if source_rate != target_rate {
                    resample(&mono_f32, source_rate, target_rate)
                } else {
                    mono_f32
                };

                sink.append(&resampled);
            },
            err_fn,
            None,
        )
        .map_err(|e| AudioError::StreamError(e.to_string()))?;

    Ok(stream)
}
